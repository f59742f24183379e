// Rust RTSP Relay
//
// Copyright (C) 2020-2021 Sebastian Dröge <sebastian@centricular.com>
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// <https://mozilla.org/MPL/2.0/>.
//
// SPDX-License-Identifier: MPL-2.0

//! Forwarding of ingest buffers into the egress push sources.

use std::sync::atomic::{self, AtomicBool};
use std::sync::Arc;
use std::time::Instant;

use log::{debug, info, trace, warn};

use super::RelayInstance;
use crate::engine::{BufferProbe, FlowError, MediaKind, Pad, ProbeReturn};

/// Buffer probe for the depayloader of one media kind of an ingest media.
///
/// Runs on the ingest media's streaming thread. Never blocks on the egress: buffers that the
/// egress does not accept are dropped.
pub struct BufferBridge {
    instance: Arc<RelayInstance>,
    kind: MediaKind,
    cancelled: Option<Arc<AtomicBool>>,
}

impl BufferBridge {
    pub fn new(instance: Arc<RelayInstance>, kind: MediaKind) -> Self {
        BufferBridge {
            instance,
            kind,
            cancelled: None,
        }
    }

    /// Remove the probe on its next buffer once `cancelled` is set.
    pub(crate) fn with_cancellation(mut self, cancelled: Arc<AtomicBool>) -> Self {
        self.cancelled = Some(cancelled);
        self
    }

    pub fn into_probe(self) -> BufferProbe {
        Box::new(move |pad, data| self.handle_buffer(pad, data))
    }

    /// Handle one buffer flowing through the ingest pad.
    pub fn handle_buffer(&self, pad: &dyn Pad, data: &[u8]) -> ProbeReturn {
        if let Some(ref cancelled) = self.cancelled {
            if cancelled.load(atomic::Ordering::SeqCst) {
                return ProbeReturn::Remove;
            }
        }

        let name = self.instance.name();
        let follow_caps_changes = self.instance.follow_caps_changes();

        let sink = {
            let mut state = self.instance.lock();

            if state.released {
                debug!("Path {}: Removing {} probe of released path", name, self.kind);
                return ProbeReturn::Remove;
            }
            state.last_ingest = Some(Instant::now());

            let kind_state = state.kinds.entry(self.kind).or_default();

            if kind_state.ingest_caps.is_none() || follow_caps_changes {
                if let Some(caps) = pad.current_caps() {
                    kind_state.ingest_caps = Some(caps);
                }
            }

            let sink = match kind_state.sink {
                Some(ref sink) => sink.clone(),
                None => {
                    trace!(
                        "Path {}: No egress bound yet, dropping {} buffer",
                        name,
                        self.kind
                    );
                    return ProbeReturn::Ok;
                }
            };

            // Caps go out before the first payload and only change afterwards when following
            // caps changes.
            if kind_state.applied_caps.is_none() || follow_caps_changes {
                match kind_state.ingest_caps {
                    Some(ref caps) if kind_state.applied_caps.as_ref() != Some(caps) => {
                        info!("Path {}: {} caps {}", name, self.kind, caps);
                        sink.set_caps(caps);
                        kind_state.applied_caps = Some(caps.clone());
                    }
                    Some(_) => (),
                    None => {
                        debug!(
                            "Path {}: No {} caps yet, dropping buffer",
                            name, self.kind
                        );
                        return ProbeReturn::Ok;
                    }
                }
            }

            kind_state.buffers += 1;

            sink
        };

        trace!(
            "Path {}: Relaying {} buffer of {} bytes",
            name,
            self.kind,
            data.len()
        );

        match sink.push_buffer(data.to_vec()) {
            Ok(()) => (),
            Err(err @ FlowError::NotLinked) | Err(err @ FlowError::Flushing) => {
                debug!(
                    "Path {}: Dropping {} buffer, egress {}",
                    name, self.kind, err
                );
            }
            Err(err) => {
                warn!(
                    "Path {}: Dropping {} buffer, egress {}",
                    name, self.kind, err
                );
            }
        }

        ProbeReturn::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::engine::memory::{MemoryPad, MemoryPushSource, PushSourceEvent};
    use crate::engine::PushSource;
    use crate::settings::Settings;

    fn instance(settings: &Settings) -> Arc<RelayInstance> {
        Arc::new(RelayInstance::new("cam1", settings))
    }

    fn bind_video(instance: &RelayInstance) -> Arc<MemoryPushSource> {
        let source = Arc::new(MemoryPushSource::default());
        let dyn_source: Arc<dyn PushSource> = source.clone();
        assert!(instance.bind_egress(vec![(MediaKind::Video, dyn_source)]));
        source
    }

    #[test]
    fn caps_before_first_buffer() {
        let instance = instance(&Settings::default());
        let source = bind_video(&instance);
        let bridge = BufferBridge::new(instance.clone(), MediaKind::Video);

        let pad = MemoryPad::default();
        pad.set_caps("application/x-rtp, media=video");

        assert_eq!(bridge.handle_buffer(&pad, &[0, 0, 0, 1, 0x65]), ProbeReturn::Ok);
        assert_eq!(bridge.handle_buffer(&pad, &[0, 0, 0, 1, 0x41]), ProbeReturn::Ok);

        assert_eq!(
            source.events(),
            vec![
                PushSourceEvent::TimeFormat,
                PushSourceEvent::Caps("application/x-rtp, media=video".into()),
                PushSourceEvent::Buffer(vec![0, 0, 0, 1, 0x65]),
                PushSourceEvent::Buffer(vec![0, 0, 0, 1, 0x41]),
            ]
        );
        assert_eq!(instance.buffer_count(MediaKind::Video), 2);
        assert_eq!(instance.buffer_count(MediaKind::Audio), 0);
    }

    #[test]
    fn buffers_without_caps_are_dropped() {
        let instance = instance(&Settings::default());
        let source = bind_video(&instance);
        let bridge = BufferBridge::new(instance.clone(), MediaKind::Video);

        let pad = MemoryPad::default();
        assert_eq!(bridge.handle_buffer(&pad, &[1]), ProbeReturn::Ok);
        assert_eq!(instance.buffer_count(MediaKind::Video), 0);

        pad.set_caps("video/x-h264");
        assert_eq!(bridge.handle_buffer(&pad, &[2]), ProbeReturn::Ok);

        assert_eq!(
            source.events(),
            vec![
                PushSourceEvent::TimeFormat,
                PushSourceEvent::Caps("video/x-h264".into()),
                PushSourceEvent::Buffer(vec![2]),
            ]
        );
        assert_eq!(instance.buffer_count(MediaKind::Video), 1);
    }

    #[test]
    fn caps_are_applied_once() {
        let instance = instance(&Settings::default());
        let source = bind_video(&instance);
        let bridge = BufferBridge::new(instance, MediaKind::Video);

        let pad = MemoryPad::default();
        pad.set_caps("video/x-h264, width=640");
        bridge.handle_buffer(&pad, &[1]);
        pad.set_caps("video/x-h264, width=1280");
        bridge.handle_buffer(&pad, &[2]);

        assert_eq!(source.caps(), Some("video/x-h264, width=640".into()));
        assert_eq!(source.buffers(), vec![vec![1], vec![2]]);
    }

    #[test]
    fn follows_caps_changes_when_enabled() {
        let instance = instance(&Settings::default().follow_caps_changes(true));
        let source = bind_video(&instance);
        let bridge = BufferBridge::new(instance, MediaKind::Video);

        let pad = MemoryPad::default();
        pad.set_caps("video/x-h264, width=640");
        bridge.handle_buffer(&pad, &[1]);
        bridge.handle_buffer(&pad, &[2]);
        pad.set_caps("video/x-h264, width=1280");
        bridge.handle_buffer(&pad, &[3]);

        assert_eq!(
            source.events(),
            vec![
                PushSourceEvent::TimeFormat,
                PushSourceEvent::Caps("video/x-h264, width=640".into()),
                PushSourceEvent::Buffer(vec![1]),
                PushSourceEvent::Buffer(vec![2]),
                PushSourceEvent::Caps("video/x-h264, width=1280".into()),
                PushSourceEvent::Buffer(vec![3]),
            ]
        );
    }

    #[test]
    fn ingest_before_egress() {
        let instance = instance(&Settings::default());
        let bridge = BufferBridge::new(instance.clone(), MediaKind::Video);

        let pad = MemoryPad::default();
        pad.set_caps("video/x-h264");
        bridge.handle_buffer(&pad, &[1]);
        assert_eq!(instance.buffer_count(MediaKind::Video), 0);

        let source = bind_video(&instance);
        assert_eq!(source.caps(), Some("video/x-h264".into()));

        bridge.handle_buffer(&pad, &[2]);
        assert_eq!(
            source.events(),
            vec![
                PushSourceEvent::TimeFormat,
                PushSourceEvent::Caps("video/x-h264".into()),
                PushSourceEvent::Buffer(vec![2]),
            ]
        );
        assert_eq!(instance.buffer_count(MediaKind::Video), 1);
    }

    #[test]
    fn push_failures_are_not_fatal() {
        let instance = instance(&Settings::default());
        let source = bind_video(&instance);
        let bridge = BufferBridge::new(instance.clone(), MediaKind::Video);

        let pad = MemoryPad::default();
        pad.set_caps("video/x-h264");

        source.set_flow_error(Some(FlowError::NotLinked));
        assert_eq!(bridge.handle_buffer(&pad, &[1]), ProbeReturn::Ok);
        source.set_flow_error(Some(FlowError::Error(String::from("broken"))));
        assert_eq!(bridge.handle_buffer(&pad, &[2]), ProbeReturn::Ok);
        source.set_flow_error(None);
        assert_eq!(bridge.handle_buffer(&pad, &[3]), ProbeReturn::Ok);

        assert_eq!(source.buffers(), vec![vec![3]]);
        assert_eq!(instance.buffer_count(MediaKind::Video), 3);
    }

    #[test]
    fn copies_leave_the_ingest_buffer_alone() {
        let instance = instance(&Settings::default());
        let source = bind_video(&instance);
        let bridge = BufferBridge::new(instance, MediaKind::Video);

        let pad = MemoryPad::default();
        pad.set_caps("video/x-h264");

        let ingest = vec![9u8; 1500];
        bridge.handle_buffer(&pad, &ingest);

        assert_eq!(ingest, vec![9u8; 1500]);
        let relayed = source.buffers();
        assert_eq!(relayed, vec![ingest.clone()]);
        assert_ne!(relayed[0].as_ptr(), ingest.as_ptr());
    }

    #[test]
    fn removed_after_release() {
        let instance = instance(&Settings::default());
        let source = bind_video(&instance);
        let bridge = BufferBridge::new(instance.clone(), MediaKind::Video);

        let pad = MemoryPad::default();
        pad.set_caps("video/x-h264");
        assert_eq!(bridge.handle_buffer(&pad, &[1]), ProbeReturn::Ok);

        instance.mark_released();
        assert_eq!(bridge.handle_buffer(&pad, &[2]), ProbeReturn::Remove);
        assert_eq!(source.buffers(), vec![vec![1]]);
    }

    #[test]
    fn cancelled_before_any_buffer() {
        let instance = instance(&Settings::default());
        let cancelled = Arc::new(AtomicBool::new(true));
        let bridge =
            BufferBridge::new(instance, MediaKind::Audio).with_cancellation(cancelled.clone());

        let pad = MemoryPad::default();
        assert_eq!(bridge.handle_buffer(&pad, &[1]), ProbeReturn::Remove);
    }
}
