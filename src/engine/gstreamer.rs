// Rust RTSP Relay
//
// Copyright (C) 2020-2021 Sebastian Dröge <sebastian@centricular.com>
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// <https://mozilla.org/MPL/2.0/>.
//
// SPDX-License-Identifier: MPL-2.0

//! Engine on top of the GStreamer RTSP server.

use std::sync::Arc;

use futures::executor::block_on;

use glib::translate::{FromGlibPtrNone, ToGlibPtr};
use gst::prelude::*;
use gst_rtsp_server::prelude::*;

use log::{debug, error, trace, warn};

use super::{
    BufferProbe, Caps, EndpointFactory, FlowError, Media, MountPoints, Pad, ProbeReturn,
    PushSource, TransportMode,
};
use crate::client;
use crate::error::Error;
use crate::server::Relay;

/// Mount table of an `RTSPServer`.
pub struct GstMountPoints {
    mounts: gst_rtsp_server::RTSPMountPoints,
}

impl GstMountPoints {
    pub fn new(mounts: gst_rtsp_server::RTSPMountPoints) -> Arc<Self> {
        Arc::new(GstMountPoints { mounts })
    }

    pub fn from_server(server: &gst_rtsp_server::RTSPServer) -> Result<Arc<Self>, Error> {
        server
            .mount_points()
            .map(Self::new)
            .ok_or_else(|| Error::Pipeline(String::from("RTSP server has no mount points")))
    }
}

impl MountPoints for GstMountPoints {
    fn add_factory(&self, path: &str, factory: EndpointFactory) -> Result<(), Error> {
        let EndpointFactory {
            launch,
            transport_mode,
            shared,
            latency,
            configure,
        } = factory;

        let media_factory = gst_rtsp_server::RTSPMediaFactory::new();
        media_factory.set_launch(&launch);
        media_factory.set_shared(shared);
        media_factory.set_transport_mode(match transport_mode {
            TransportMode::Play => gst_rtsp_server::RTSPTransportMode::PLAY,
            TransportMode::Record => gst_rtsp_server::RTSPTransportMode::RECORD,
        });
        if let Some(latency) = latency {
            media_factory.set_latency(latency);
        }

        let path_clone = String::from(path);
        media_factory.connect_media_configure(move |_, media| {
            debug!("Mount {}: Configuring media", path_clone);

            let media = match GstMedia::new(media) {
                Ok(media) => media,
                Err(err) => {
                    error!("Mount {}: {}", path_clone, err);
                    gst::element_error!(
                        media.element(),
                        gst::CoreError::Failed,
                        ["Can't configure media for {}: {}", path_clone, err]
                    );
                    return;
                }
            };

            if let Err(err) = configure.media_configure(&media) {
                gst::element_error!(
                    media.bin,
                    gst::CoreError::Failed,
                    ["Can't configure media for {}: {}", path_clone, err]
                );
            }
        });

        self.mounts.add_factory(path, media_factory);

        Ok(())
    }

    fn remove_factory(&self, path: &str) {
        self.mounts.remove_factory(path);
    }
}

struct GstMedia {
    media: gst_rtsp_server::RTSPMedia,
    bin: gst::Bin,
}

impl GstMedia {
    fn new(media: &gst_rtsp_server::RTSPMedia) -> Result<Self, Error> {
        let bin = media
            .element()
            .downcast::<gst::Bin>()
            .map_err(|_| Error::Pipeline(String::from("Media element is not a bin")))?;

        Ok(GstMedia {
            media: media.clone(),
            bin,
        })
    }

    fn element(&self, element: &str) -> Result<gst::Element, Error> {
        self.bin.by_name(element).ok_or_else(|| Error::MissingElement {
            element: String::from(element),
        })
    }
}

impl Media for GstMedia {
    fn set_reusable(&self, reusable: bool) {
        self.media.set_reusable(reusable);
    }

    fn static_pad(&self, element: &str, pad: &str) -> Result<Arc<dyn Pad>, Error> {
        let pad = self
            .element(element)?
            .static_pad(pad)
            .ok_or_else(|| Error::MissingPad {
                element: String::from(element),
                pad: String::from(pad),
            })?;

        Ok(Arc::new(GstPad(pad)))
    }

    fn push_source(&self, element: &str) -> Result<Arc<dyn PushSource>, Error> {
        let appsrc = self
            .element(element)?
            .downcast::<gst_app::AppSrc>()
            .map_err(|_| Error::WrongElementType {
                element: String::from(element),
                expected: "appsrc",
            })?;

        Ok(Arc::new(AppSrcPushSource(appsrc)))
    }
}

struct GstPad(gst::Pad);

impl Pad for GstPad {
    fn current_caps(&self) -> Option<Caps> {
        self.0.current_caps().map(|caps| Caps::from(caps.to_string()))
    }

    fn add_buffer_probe(&self, probe: BufferProbe) -> Result<(), Error> {
        self.0
            .add_probe(gst::PadProbeType::BUFFER, move |pad, info| {
                let buffer = match info.data {
                    Some(gst::PadProbeData::Buffer(ref buffer)) => buffer,
                    _ => return gst::PadProbeReturn::Ok,
                };

                let map = match buffer.map_readable() {
                    Ok(map) => map,
                    Err(err) => {
                        warn!("Can't map buffer on pad {}: {}", pad.name(), err);
                        return gst::PadProbeReturn::Ok;
                    }
                };

                match probe(&GstPad(pad.clone()), map.as_slice()) {
                    ProbeReturn::Ok => gst::PadProbeReturn::Ok,
                    ProbeReturn::Remove => gst::PadProbeReturn::Remove,
                }
            })
            .map(|_| ())
            .ok_or_else(|| Error::Pipeline(format!("Can't add probe to pad {}", self.0.name())))
    }
}

struct AppSrcPushSource(gst_app::AppSrc);

impl PushSource for AppSrcPushSource {
    fn set_time_format(&self) {
        self.0.set_format(gst::Format::Time);
    }

    fn set_caps(&self, caps: &Caps) {
        match caps.as_str().parse::<gst::Caps>() {
            Ok(caps) => self.0.set_caps(Some(&caps)),
            Err(err) => warn!("Can't parse caps {}: {}", caps, err),
        }
    }

    fn push_buffer(&self, data: Vec<u8>) -> Result<(), FlowError> {
        self.0
            .push_buffer(gst::Buffer::from_slice(data))
            .map(|_| ())
            .map_err(|err| match err {
                gst::FlowError::NotLinked => FlowError::NotLinked,
                gst::FlowError::Flushing => FlowError::Flushing,
                gst::FlowError::Eos => FlowError::Eos,
                err => FlowError::Error(format!("{:?}", err)),
            })
    }
}

/// Forward the client events of `server` to `relay`.
///
/// The signal handlers block until the relay has handled the event, so that the endpoints of a
/// path are mounted before the server looks up the request's URL.
pub fn connect_clients(server: &gst_rtsp_server::RTSPServer, relay: &Relay) {
    let relay = relay.clone();
    server.connect_client_connected(move |_, rtsp_client| {
        let client_id = client::Id::new();
        let info = client::ConnectionInformation::new(peer_addr(rtsp_client));

        if let Err(err) = block_on(relay.client_connected(client_id, info)) {
            warn!("Client {}: Can't register connection: {}", client_id, err);
            return;
        }

        use rtsp_types::Method;

        rtsp_client.connect_options_request(request_handler(&relay, client_id, Method::Options));
        rtsp_client.connect_describe_request(request_handler(&relay, client_id, Method::Describe));
        rtsp_client.connect_announce_request(request_handler(&relay, client_id, Method::Announce));
        rtsp_client.connect_setup_request(request_handler(&relay, client_id, Method::Setup));
        rtsp_client.connect_play_request(request_handler(&relay, client_id, Method::Play));
        rtsp_client.connect_record_request(request_handler(&relay, client_id, Method::Record));
        rtsp_client.connect_get_parameter_request(request_handler(
            &relay,
            client_id,
            Method::GetParameter,
        ));
        rtsp_client.connect_set_parameter_request(request_handler(
            &relay,
            client_id,
            Method::SetParameter,
        ));

        let relay = relay.clone();
        rtsp_client.connect_closed(move |_| {
            if let Err(err) = block_on(relay.client_closed(client_id)) {
                warn!("Client {}: Can't unregister connection: {}", client_id, err);
            }
        });
    });
}

fn request_handler(
    relay: &Relay,
    client_id: client::Id,
    method: rtsp_types::Method,
) -> impl Fn(&gst_rtsp_server::RTSPClient, &gst_rtsp_server::RTSPContext) + Send + Sync + 'static
{
    let relay = relay.clone();
    move |_, ctx| {
        let uri = request_url(ctx);
        trace!("Client {}: {:?} request for {:?}", client_id, method, uri);

        if let Err(err) = block_on(relay.client_request(client_id, method.clone(), uri)) {
            warn!("Client {}: Can't handle request: {}", client_id, err);
        }
    }
}

/// Remote address of the connection of `rtsp_client`.
fn peer_addr(rtsp_client: &gst_rtsp_server::RTSPClient) -> Option<String> {
    unsafe {
        let connection =
            gst_rtsp_server::ffi::gst_rtsp_client_get_connection(rtsp_client.to_glib_none().0);
        if connection.is_null() {
            return None;
        }

        let ip: Option<glib::GString> =
            glib::translate::from_glib_none(gst_rtsp::ffi::gst_rtsp_connection_get_ip(connection));
        ip.map(String::from)
    }
}

/// URL of the request currently handled in `ctx`.
fn request_url(ctx: &gst_rtsp_server::RTSPContext) -> Option<url::Url> {
    let ctx: *const gst_rtsp_server::ffi::GstRTSPContext = ctx.to_glib_none().0;

    // The context only lives for the duration of the signal emission, copy the URL out of it
    let uri = unsafe {
        let uri = (*ctx).uri;
        if uri.is_null() {
            return None;
        }
        gst_rtsp::RTSPUrl::from_glib_none(uri)
    };

    let request_uri = uri.request_uri();
    match url::Url::parse(request_uri.as_str()) {
        Ok(url) => Some(url),
        Err(err) => {
            warn!("Can't parse request URL {}: {}", request_uri, err);
            None
        }
    }
}
