// Rust RTSP Relay
//
// Copyright (C) 2020-2021 Sebastian Dröge <sebastian@centricular.com>
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// <https://mozilla.org/MPL/2.0/>.
//
// SPDX-License-Identifier: MPL-2.0

//! Media pipeline engine interface.
//!
//! The relay itself never builds pipelines or speaks RTSP. It binds endpoint factories into a
//! [`MountPoints`] table and gets called back via [`MediaConfigure`] whenever the engine
//! materializes the pipeline of such an endpoint. From there it looks up named pads and push
//! sources in the [`Media`] and attaches buffer probes.
//!
//! [`memory`] provides an engine that lives completely in memory, `gstreamer` (with the
//! `gstreamer` feature) the implementation on top of the GStreamer RTSP server.

use std::fmt;
use std::sync::Arc;

use crate::error::Error;

#[cfg(feature = "gstreamer")]
pub mod gstreamer;
pub mod memory;

/// Kind of media relayed between ingest and egress.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MediaKind {
    Video,
    Audio,
}

impl MediaKind {
    pub const ALL: [MediaKind; 2] = [MediaKind::Video, MediaKind::Audio];

    /// Name of the depayloader of this kind in the ingest template.
    pub fn depayloader_name(self) -> &'static str {
        match self {
            MediaKind::Video => "depay0",
            MediaKind::Audio => "depay1",
        }
    }

    /// Name of the push source of this kind in the egress template.
    pub fn push_source_name(self) -> &'static str {
        match self {
            MediaKind::Video => "video_src",
            MediaKind::Audio => "audio_src",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Negotiated format of a stream, in the engine's textual caps representation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Caps(Arc<String>);

impl Caps {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl AsRef<str> for Caps {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for Caps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        <String as fmt::Display>::fmt(&self.0, f)
    }
}

impl<'a> From<&'a str> for Caps {
    fn from(s: &'a str) -> Self {
        String::from(s).into()
    }
}

impl From<String> for Caps {
    fn from(s: String) -> Self {
        Caps(Arc::new(s))
    }
}

/// Reason why a push source did not accept a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowError {
    /// Nothing downstream of the push source is linked.
    NotLinked,
    /// The push source is not running.
    Flushing,
    /// The push source already received end-of-stream.
    Eos,
    Error(String),
}

impl fmt::Display for FlowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowError::NotLinked => write!(f, "not linked"),
            FlowError::Flushing => write!(f, "flushing"),
            FlowError::Eos => write!(f, "end of stream"),
            FlowError::Error(reason) => write!(f, "error: {}", reason),
        }
    }
}

impl std::error::Error for FlowError {}

/// Disposition returned by a buffer probe to the engine.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ProbeReturn {
    /// Keep the probe and let the buffer pass unchanged.
    Ok,
    /// Let the buffer pass and remove the probe.
    Remove,
}

/// Buffer probe callback.
///
/// Called from the streaming thread of the pipeline with the pad the probe is attached to and a
/// read-only view of the buffer's payload. The payload stays owned by the engine and must not
/// be retained past the call.
pub type BufferProbe = Box<dyn Fn(&dyn Pad, &[u8]) -> ProbeReturn + Send + Sync + 'static>;

/// Pad of an element inside a materialized pipeline.
pub trait Pad: Send + Sync {
    /// Caps currently negotiated on this pad, if any.
    fn current_caps(&self) -> Option<Caps>;

    /// Attach a probe that is called for every buffer flowing through this pad.
    fn add_buffer_probe(&self, probe: BufferProbe) -> Result<(), Error>;
}

/// Element of the egress pipeline into which buffers can be injected.
pub trait PushSource: Send + Sync {
    /// Operate in time format and timestamp buffers on arrival.
    fn set_time_format(&self);

    /// Apply the format of all following buffers.
    fn set_caps(&self, caps: &Caps);

    /// Inject a buffer. Must not block.
    fn push_buffer(&self, data: Vec<u8>) -> Result<(), FlowError>;
}

/// A materialized endpoint pipeline as passed to [`MediaConfigure`].
pub trait Media {
    /// Share this media between all sessions of the endpoint.
    fn set_reusable(&self, reusable: bool);

    /// Look up the static pad `pad` of the element named `element`.
    fn static_pad(&self, element: &str, pad: &str) -> Result<Arc<dyn Pad>, Error>;

    /// Look up the push source named `element`.
    fn push_source(&self, element: &str) -> Result<Arc<dyn PushSource>, Error>;
}

/// Hook called whenever the engine materializes the pipeline of an endpoint.
pub trait MediaConfigure: Send + Sync + 'static {
    /// An error aborts the configuration of this one media.
    fn media_configure(&self, media: &dyn Media) -> Result<(), Error>;
}

/// Direction of an endpoint.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TransportMode {
    /// Clients pull media out of the endpoint.
    Play,
    /// Clients push media into the endpoint.
    Record,
}

/// Description of an endpoint to be bound into the mount table.
pub struct EndpointFactory {
    /// Declarative pipeline template.
    pub launch: String,
    pub transport_mode: TransportMode,
    /// Whether one media is shared by all sessions.
    pub shared: bool,
    /// Receive latency in milliseconds.
    pub latency: Option<u32>,
    pub configure: Arc<dyn MediaConfigure>,
}

impl fmt::Debug for EndpointFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointFactory")
            .field("launch", &self.launch)
            .field("transport_mode", &self.transport_mode)
            .field("shared", &self.shared)
            .field("latency", &self.latency)
            .finish()
    }
}

/// Endpoint table of the engine's RTSP server.
pub trait MountPoints: Send + Sync + 'static {
    /// Bind `factory` at `path`, replacing any previous binding.
    fn add_factory(&self, path: &str, factory: EndpointFactory) -> Result<(), Error>;

    /// Unbind whatever is bound at `path`.
    fn remove_factory(&self, path: &str);
}
