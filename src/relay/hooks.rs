// Rust RTSP Relay
//
// Copyright (C) 2020-2021 Sebastian Dröge <sebastian@centricular.com>
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// <https://mozilla.org/MPL/2.0/>.
//
// SPDX-License-Identifier: MPL-2.0

use std::sync::atomic::{self, AtomicBool};
use std::sync::Arc;

use log::{debug, error, info};

use super::bridge::BufferBridge;
use super::RelayInstance;
use crate::engine::{Media, MediaConfigure, MediaKind, Pad, PushSource};
use crate::error::Error;

/// Configures every new ingest media of a path.
///
/// Attaches a [`BufferBridge`] to the depayloader of each relayed media kind.
pub struct RecordConfigure {
    instance: Arc<RelayInstance>,
}

impl RecordConfigure {
    pub fn new(instance: Arc<RelayInstance>) -> Self {
        RecordConfigure { instance }
    }
}

impl MediaConfigure for RecordConfigure {
    fn media_configure(&self, media: &dyn Media) -> Result<(), Error> {
        let name = self.instance.name();

        // Look up everything first so that a broken template leaves nothing behind
        let pads = self
            .instance
            .kinds()
            .into_iter()
            .map(|kind| -> Result<(MediaKind, Arc<dyn Pad>), Error> {
                Ok((kind, media.static_pad(kind.depayloader_name(), "src")?))
            })
            .collect::<Result<Vec<_>, Error>>()
            .map_err(|err| {
                error!("Path {}: Can't configure ingest media: {}", name, err);
                err
            })?;

        let cancelled = Arc::new(AtomicBool::new(false));
        for (kind, pad) in pads {
            let bridge = BufferBridge::new(self.instance.clone(), kind)
                .with_cancellation(cancelled.clone());

            if let Err(err) = pad.add_buffer_probe(bridge.into_probe()) {
                error!(
                    "Path {}: Can't attach {} probe to ingest media: {}",
                    name, kind, err
                );
                cancelled.store(true, atomic::Ordering::SeqCst);
                return Err(err);
            }
        }

        info!("Path {}: Configured ingest media", name);

        Ok(())
    }
}

/// Configures the shared egress media of a path.
///
/// The egress media is reusable, so the push sources are only bound for the first media.
pub struct PlayConfigure {
    instance: Arc<RelayInstance>,
}

impl PlayConfigure {
    pub fn new(instance: Arc<RelayInstance>) -> Self {
        PlayConfigure { instance }
    }
}

impl MediaConfigure for PlayConfigure {
    fn media_configure(&self, media: &dyn Media) -> Result<(), Error> {
        let name = self.instance.name();

        media.set_reusable(true);

        if self.instance.is_egress_bound() {
            debug!("Path {}: Egress already bound", name);
            return Ok(());
        }

        let sources = self
            .instance
            .kinds()
            .into_iter()
            .map(|kind| -> Result<(MediaKind, Arc<dyn PushSource>), Error> {
                Ok((kind, media.push_source(kind.push_source_name())?))
            })
            .collect::<Result<Vec<_>, Error>>()
            .map_err(|err| {
                error!("Path {}: Can't configure egress media: {}", name, err);
                err
            })?;

        if self.instance.bind_egress(sources) {
            info!("Path {}: Bound egress media", name);
        } else {
            debug!("Path {}: Egress not bound", name);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::engine::memory::{MemoryMedia, MemoryPad, PushSourceEvent};
    use crate::settings::{self, Settings};

    fn instance() -> Arc<RelayInstance> {
        Arc::new(RelayInstance::new("cam1", &Settings::default()))
    }

    #[test]
    fn record_attaches_one_probe_per_kind() {
        let instance = instance();
        let media = MemoryMedia::from_launch(settings::DEFAULT_RECORD_LAUNCH);

        RecordConfigure::new(instance.clone())
            .media_configure(&media)
            .unwrap();

        assert_eq!(media.pad("depay0").unwrap().probe_count(), 1);
        assert_eq!(media.pad("depay1").unwrap().probe_count(), 1);
    }

    #[test]
    fn record_with_missing_depayloader() {
        let instance = instance();
        let media = MemoryMedia::from_launch("( rtph264depay name=depay0 ! fakesink )");

        let err = RecordConfigure::new(instance)
            .media_configure(&media)
            .unwrap_err();

        assert_eq!(
            err,
            Error::MissingElement {
                element: String::from("depay1")
            }
        );
        assert!(err.is_configuration());
        assert_eq!(media.pad("depay0").unwrap().probe_count(), 0);
    }

    #[test]
    fn record_with_failing_probe_attach() {
        struct RejectingPad;

        impl Pad for RejectingPad {
            fn current_caps(&self) -> Option<crate::engine::Caps> {
                None
            }

            fn add_buffer_probe(&self, _probe: crate::engine::BufferProbe) -> Result<(), Error> {
                Err(Error::Pipeline(String::from("probes not supported")))
            }
        }

        /// Ingest media whose audio depayloader rejects probes.
        struct PartialMedia {
            video: Arc<MemoryPad>,
        }

        impl Media for PartialMedia {
            fn set_reusable(&self, _reusable: bool) {}

            fn static_pad(&self, element: &str, _pad: &str) -> Result<Arc<dyn Pad>, Error> {
                if element == MediaKind::Video.depayloader_name() {
                    Ok(self.video.clone())
                } else {
                    Ok(Arc::new(RejectingPad))
                }
            }

            fn push_source(&self, element: &str) -> Result<Arc<dyn PushSource>, Error> {
                Err(Error::MissingElement {
                    element: String::from(element),
                })
            }
        }

        let instance = instance();
        let media = PartialMedia {
            video: Arc::new(MemoryPad::default()),
        };

        let err = RecordConfigure::new(instance.clone())
            .media_configure(&media)
            .unwrap_err();
        assert_eq!(
            err,
            Error::Pipeline(String::from("probes not supported"))
        );
        assert_eq!(media.video.probe_count(), 1);

        // The probe that did get attached removes itself
        media.video.set_caps("video/x-h264");
        media.video.push(&[1]);
        assert_eq!(media.video.probe_count(), 0);
        assert_eq!(instance.buffer_count(MediaKind::Video), 0);
    }

    #[test]
    fn play_binds_only_once() {
        let instance = instance();
        let hook = PlayConfigure::new(instance.clone());

        let first = MemoryMedia::from_launch(settings::DEFAULT_PLAY_LAUNCH);
        hook.media_configure(&first).unwrap();
        assert!(first.is_reusable());
        assert!(instance.is_egress_bound());

        let second = MemoryMedia::from_launch(settings::DEFAULT_PLAY_LAUNCH);
        hook.media_configure(&second).unwrap();
        assert!(second.is_reusable());

        for kind in MediaKind::ALL.iter() {
            let name = kind.push_source_name();
            assert_eq!(
                first.memory_push_source(name).unwrap().events(),
                vec![PushSourceEvent::TimeFormat]
            );
            assert!(second.memory_push_source(name).unwrap().events().is_empty());
        }
    }

    #[test]
    fn play_with_missing_push_source() {
        let instance = instance();
        let media = MemoryMedia::from_launch(
            "( appsrc name=video_src ! h264parse ! rtph264pay name=pay0 \
             audiotestsrc name=audio_src ! rtpmp4apay name=pay1 )",
        );

        let err = PlayConfigure::new(instance.clone())
            .media_configure(&media)
            .unwrap_err();

        assert_eq!(
            err,
            Error::WrongElementType {
                element: String::from("audio_src"),
                expected: "appsrc"
            }
        );
        assert!(!instance.is_egress_bound());
        assert!(media
            .memory_push_source("video_src")
            .unwrap()
            .events()
            .is_empty());
    }
}
