// Rust RTSP Relay
//
// Copyright (C) 2020-2021 Sebastian Dröge <sebastian@centricular.com>
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// <https://mozilla.org/MPL/2.0/>.
//
// SPDX-License-Identifier: MPL-2.0

//! In-memory pipeline engine.
//!
//! Pipelines are not actually run. Every element that is named in a launch template gets a
//! `src` pad that buffers can be fed into with [`MemoryPad::push`], and every named `appsrc`
//! records what is done to it. Materializing endpoints is driven explicitly with
//! [`MemoryEngine::materialize`].

use std::collections::HashMap;
use std::sync::atomic::{self, AtomicBool};
use std::sync::{Arc, Mutex};

use log::{debug, trace};

use super::{
    BufferProbe, Caps, EndpointFactory, FlowError, Media, MediaConfigure, MountPoints, Pad,
    ProbeReturn, PushSource, TransportMode,
};
use crate::error::Error;

/// Something that happened to a [`MemoryPushSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushSourceEvent {
    TimeFormat,
    Caps(Caps),
    Buffer(Vec<u8>),
}

#[derive(Default)]
pub struct MemoryPushSource {
    events: Mutex<Vec<PushSourceEvent>>,
    flow_error: Mutex<Option<FlowError>>,
}

impl MemoryPushSource {
    /// Everything that happened to this push source so far, in order.
    pub fn events(&self) -> Vec<PushSourceEvent> {
        self.events.lock().unwrap().clone()
    }

    /// All buffers that were accepted.
    pub fn buffers(&self) -> Vec<Vec<u8>> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|ev| match ev {
                PushSourceEvent::Buffer(data) => Some(data.clone()),
                _ => None,
            })
            .collect()
    }

    /// Caps that were applied last.
    pub fn caps(&self) -> Option<Caps> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find_map(|ev| match ev {
                PushSourceEvent::Caps(caps) => Some(caps.clone()),
                _ => None,
            })
    }

    /// Make all following pushes fail with `err`, or succeed again with `None`.
    pub fn set_flow_error(&self, err: Option<FlowError>) {
        *self.flow_error.lock().unwrap() = err;
    }
}

impl PushSource for MemoryPushSource {
    fn set_time_format(&self) {
        self.events.lock().unwrap().push(PushSourceEvent::TimeFormat);
    }

    fn set_caps(&self, caps: &Caps) {
        self.events
            .lock()
            .unwrap()
            .push(PushSourceEvent::Caps(caps.clone()));
    }

    fn push_buffer(&self, data: Vec<u8>) -> Result<(), FlowError> {
        if let Some(ref err) = *self.flow_error.lock().unwrap() {
            return Err(err.clone());
        }

        self.events
            .lock()
            .unwrap()
            .push(PushSourceEvent::Buffer(data));
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryPad {
    caps: Mutex<Option<Caps>>,
    probes: Mutex<Vec<BufferProbe>>,
}

impl MemoryPad {
    /// Negotiate `caps` on this pad.
    pub fn set_caps(&self, caps: impl Into<Caps>) {
        *self.caps.lock().unwrap() = Some(caps.into());
    }

    /// Number of probes currently attached.
    pub fn probe_count(&self) -> usize {
        self.probes.lock().unwrap().len()
    }

    /// Let a buffer flow through this pad, calling all attached probes.
    pub fn push(&self, data: &[u8]) {
        let mut probes = self.probes.lock().unwrap();
        probes.retain(|probe| probe(self, data) == ProbeReturn::Ok);
    }
}

impl Pad for MemoryPad {
    fn current_caps(&self) -> Option<Caps> {
        self.caps.lock().unwrap().clone()
    }

    fn add_buffer_probe(&self, probe: BufferProbe) -> Result<(), Error> {
        self.probes.lock().unwrap().push(probe);
        Ok(())
    }
}

struct MemoryElement {
    factory_name: String,
    src_pad: Arc<MemoryPad>,
    push_source: Option<Arc<MemoryPushSource>>,
}

/// A materialized endpoint pipeline.
pub struct MemoryMedia {
    elements: HashMap<String, MemoryElement>,
    reusable: AtomicBool,
}

impl MemoryMedia {
    /// Create the named elements of a launch template.
    ///
    /// Only `factory name=foo` pairs are picked up; everything else in the template is ignored.
    pub fn from_launch(launch: &str) -> Self {
        let mut elements = HashMap::new();
        let mut factory_name = None;

        for token in launch.split_whitespace() {
            if let Some(name) = token.strip_prefix("name=") {
                let factory_name: String = factory_name.clone().unwrap_or_default();
                let push_source = if factory_name == "appsrc" {
                    Some(Arc::new(MemoryPushSource::default()))
                } else {
                    None
                };

                elements.insert(
                    String::from(name),
                    MemoryElement {
                        factory_name,
                        src_pad: Arc::new(MemoryPad::default()),
                        push_source,
                    },
                );
            } else if !token.contains('=') && token != "!" && token != "(" && token != ")" {
                factory_name = Some(String::from(token));
            }
        }

        MemoryMedia {
            elements,
            reusable: AtomicBool::new(false),
        }
    }

    pub fn is_reusable(&self) -> bool {
        self.reusable.load(atomic::Ordering::SeqCst)
    }

    /// Factory name of the element named `element`.
    pub fn factory_name(&self, element: &str) -> Option<&str> {
        self.elements
            .get(element)
            .map(|element| element.factory_name.as_str())
    }

    /// `src` pad of the element named `element`.
    pub fn pad(&self, element: &str) -> Option<Arc<MemoryPad>> {
        self.elements
            .get(element)
            .map(|element| element.src_pad.clone())
    }

    /// The `appsrc` named `element`.
    pub fn memory_push_source(&self, element: &str) -> Option<Arc<MemoryPushSource>> {
        self.elements
            .get(element)
            .and_then(|element| element.push_source.clone())
    }
}

impl Media for MemoryMedia {
    fn set_reusable(&self, reusable: bool) {
        self.reusable.store(reusable, atomic::Ordering::SeqCst);
    }

    fn static_pad(&self, element: &str, pad: &str) -> Result<Arc<dyn Pad>, Error> {
        let e = self.elements.get(element).ok_or_else(|| Error::MissingElement {
            element: String::from(element),
        })?;

        if pad != "src" {
            return Err(Error::MissingPad {
                element: String::from(element),
                pad: String::from(pad),
            });
        }

        Ok(e.src_pad.clone())
    }

    fn push_source(&self, element: &str) -> Result<Arc<dyn PushSource>, Error> {
        let e = self.elements.get(element).ok_or_else(|| Error::MissingElement {
            element: String::from(element),
        })?;

        match e.push_source {
            Some(ref push_source) => Ok(push_source.clone()),
            None => Err(Error::WrongElementType {
                element: String::from(element),
                expected: "appsrc",
            }),
        }
    }
}

struct Mounted {
    factory: EndpointFactory,
    /// Media currently shared between all sessions, if the factory is shared.
    shared_media: Option<Arc<MemoryMedia>>,
}

/// Mount table of the in-memory engine.
#[derive(Default)]
pub struct MemoryEngine {
    mounts: Mutex<HashMap<String, Mounted>>,
}

impl MemoryEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(MemoryEngine::default())
    }

    /// All currently bound paths, sorted.
    pub fn paths(&self) -> Vec<String> {
        let mut paths = self
            .mounts
            .lock()
            .unwrap()
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        paths.sort();
        paths
    }

    pub fn is_mounted(&self, path: &str) -> bool {
        self.mounts.lock().unwrap().contains_key(path)
    }

    /// Launch template, transport mode, shared flag and latency of the factory at `path`.
    pub fn factory_settings(
        &self,
        path: &str,
    ) -> Option<(String, TransportMode, bool, Option<u32>)> {
        self.mounts.lock().unwrap().get(path).map(|mounted| {
            (
                mounted.factory.launch.clone(),
                mounted.factory.transport_mode,
                mounted.factory.shared,
                mounted.factory.latency,
            )
        })
    }

    /// Materialize the media for a new session at `path`.
    ///
    /// Shared factories hand out their existing media without configuring it again. New medias
    /// are passed to the factory's configure hook and discarded if that fails.
    pub fn materialize(&self, path: &str) -> Result<Arc<MemoryMedia>, Error> {
        let (launch, configure): (String, Arc<dyn MediaConfigure>) = {
            let mounts = self.mounts.lock().unwrap();
            let mounted = mounts.get(path).ok_or_else(|| Error::Mount {
                path: String::from(path),
                reason: String::from("not mounted"),
            })?;

            if let Some(ref media) = mounted.shared_media {
                trace!("Memory engine: Reusing shared media at {}", path);
                return Ok(media.clone());
            }

            (mounted.factory.launch.clone(), mounted.factory.configure.clone())
        };

        let media = Arc::new(MemoryMedia::from_launch(&launch));
        configure.media_configure(&*media)?;

        let mut mounts = self.mounts.lock().unwrap();
        if let Some(mounted) = mounts.get_mut(path) {
            if mounted.factory.shared {
                mounted.shared_media = Some(media.clone());
            }
        }

        debug!("Memory engine: Materialized media at {}", path);

        Ok(media)
    }
}

impl MountPoints for MemoryEngine {
    fn add_factory(&self, path: &str, factory: EndpointFactory) -> Result<(), Error> {
        if !path.starts_with('/') {
            return Err(Error::Mount {
                path: String::from(path),
                reason: String::from("path must start with '/'"),
            });
        }

        debug!("Memory engine: Adding factory at {}", path);
        self.mounts.lock().unwrap().insert(
            String::from(path),
            Mounted {
                factory,
                shared_media: None,
            },
        );

        Ok(())
    }

    fn remove_factory(&self, path: &str) {
        debug!("Memory engine: Removing factory at {}", path);
        self.mounts.lock().unwrap().remove(path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_up_named_elements() {
        let media = MemoryMedia::from_launch(
            "( appsrc name=video_src is-live=1 ! h264parse ! rtph264pay pt=96 name=pay0 )",
        );

        assert_eq!(media.factory_name("video_src"), Some("appsrc"));
        assert_eq!(media.factory_name("pay0"), Some("rtph264pay"));
        assert!(media.push_source("video_src").is_ok());
        assert_eq!(
            media.push_source("pay0").err(),
            Some(Error::WrongElementType {
                element: String::from("pay0"),
                expected: "appsrc",
            })
        );
        assert!(media.static_pad("pay0", "src").is_ok());
        assert!(matches!(
            media.static_pad("pay0", "sink"),
            Err(Error::MissingPad { .. })
        ));
        assert!(matches!(
            media.static_pad("depay0", "src"),
            Err(Error::MissingElement { .. })
        ));
    }

    #[test]
    fn probes_can_remove_themselves() {
        let pad = MemoryPad::default();
        pad.add_buffer_probe(Box::new(|_, _| ProbeReturn::Remove))
            .unwrap();
        pad.add_buffer_probe(Box::new(|_, _| ProbeReturn::Ok)).unwrap();
        assert_eq!(pad.probe_count(), 2);

        pad.push(&[1, 2, 3]);
        assert_eq!(pad.probe_count(), 1);
    }
}
