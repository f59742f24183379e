// Rust RTSP Relay
//
// Copyright (C) 2020-2021 Sebastian Dröge <sebastian@centricular.com>
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// <https://mozilla.org/MPL/2.0/>.
//
// SPDX-License-Identifier: MPL-2.0

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, info, warn};

use super::hooks::{PlayConfigure, RecordConfigure};
use super::RelayInstance;
use crate::engine::{EndpointFactory, MountPoints, TransportMode};
use crate::error::Error;
use crate::settings::Settings;

struct Inner {
    /// Instances by exact stream name.
    instances: HashMap<String, Arc<RelayInstance>>,
    closed: bool,
}

/// Maps stream names to their [`RelayInstance`].
///
/// Creating an instance binds its play and record endpoints into the engine's mount table,
/// dropping the last reference unbinds them again.
pub struct PathRegistry {
    mounts: Arc<dyn MountPoints>,
    settings: Arc<Settings>,
    inner: Mutex<Inner>,
}

impl PathRegistry {
    pub fn new(mounts: Arc<dyn MountPoints>, settings: Arc<Settings>) -> Self {
        PathRegistry {
            mounts,
            settings,
            inner: Mutex::new(Inner {
                instances: HashMap::new(),
                closed: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    /// Instance currently registered for `name`.
    pub fn get(&self, name: &str) -> Option<Arc<RelayInstance>> {
        self.lock().instances.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All registered instances, sorted by name.
    pub fn instances(&self) -> Vec<Arc<RelayInstance>> {
        let mut instances = self
            .lock()
            .instances
            .values()
            .cloned()
            .collect::<Vec<_>>();
        instances.sort_by(|a, b| a.name().cmp(b.name()));
        instances
    }

    /// Return the instance for `name`, creating and binding it if there is none.
    pub fn get_or_create(&self, name: &str) -> Result<Arc<RelayInstance>, Error> {
        let mut inner = self.lock();
        self.get_or_create_locked(&mut inner, name)
    }

    /// Like [`get_or_create`](Self::get_or_create) but also takes a reference on the instance.
    ///
    /// Both happen under the registry lock so that a concurrent release can't tear the instance
    /// down in between.
    pub fn acquire(&self, name: &str) -> Result<Arc<RelayInstance>, Error> {
        let mut inner = self.lock();
        let instance = self.get_or_create_locked(&mut inner, name)?;
        let ref_count = instance.add_ref();

        debug!("Path {}: Acquired, {} references", name, ref_count);

        Ok(instance)
    }

    fn get_or_create_locked(
        &self,
        inner: &mut Inner,
        name: &str,
    ) -> Result<Arc<RelayInstance>, Error> {
        if inner.closed {
            return Err(Error::ShuttingDown);
        }

        if let Some(instance) = inner.instances.get(name) {
            return Ok(instance.clone());
        }

        info!("Path {}: Creating endpoints", name);

        let instance = Arc::new(RelayInstance::new(name, &self.settings));

        self.mounts.add_factory(
            instance.play_path(),
            EndpointFactory {
                launch: self.settings.play_launch.clone(),
                transport_mode: TransportMode::Play,
                shared: true,
                latency: None,
                configure: Arc::new(PlayConfigure::new(instance.clone())),
            },
        )?;

        if let Err(err) = self.mounts.add_factory(
            instance.record_path(),
            EndpointFactory {
                launch: self.settings.record_launch.clone(),
                transport_mode: TransportMode::Record,
                shared: false,
                latency: Some(self.settings.record_latency),
                configure: Arc::new(RecordConfigure::new(instance.clone())),
            },
        ) {
            self.mounts.remove_factory(instance.play_path());
            return Err(err);
        }

        inner
            .instances
            .insert(String::from(name), instance.clone());

        Ok(instance)
    }

    /// Drop one reference on `instance`.
    ///
    /// Returns `true` if this was the last reference and the instance was torn down.
    pub fn release(&self, instance: &Arc<RelayInstance>) -> bool {
        let mut inner = self.lock();
        let name = instance.name();

        let ref_count = match instance.remove_ref() {
            Some(ref_count) => ref_count,
            None => {
                warn!("Path {}: Released without reference", name);
                return false;
            }
        };

        debug!("Path {}: Released, {} references left", name, ref_count);

        if ref_count > 0 {
            return false;
        }

        match inner.instances.get(name) {
            Some(registered) if Arc::ptr_eq(registered, instance) => {
                inner.instances.remove(name);
            }
            _ => {
                debug!("Path {}: Not registered anymore", name);
                return false;
            }
        }
        drop(inner);

        self.teardown(instance);

        true
    }

    /// Tear down all instances and refuse to create new ones.
    pub fn shutdown(&self) -> usize {
        let instances = {
            let mut inner = self.lock();
            inner.closed = true;
            inner.instances.drain().map(|(_, i)| i).collect::<Vec<_>>()
        };

        info!("Shutting down {} paths", instances.len());

        for instance in &instances {
            self.teardown(instance);
        }

        instances.len()
    }

    fn teardown(&self, instance: &RelayInstance) {
        info!("Path {}: Removing endpoints", instance.name());

        self.mounts.remove_factory(instance.record_path());
        self.mounts.remove_factory(instance.play_path());
        instance.mark_released();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::thread;

    use crate::engine::memory::{MemoryEngine, MemoryMedia, MemoryPad};
    use crate::engine::{MediaConfigure, MediaKind};

    fn registry() -> (Arc<MemoryEngine>, PathRegistry) {
        let engine = MemoryEngine::new();
        let registry = PathRegistry::new(engine.clone(), Arc::new(Settings::default()));
        (engine, registry)
    }

    #[test]
    fn creates_both_endpoints() {
        let (engine, registry) = registry();

        let instance = registry.get_or_create("cam1").unwrap();
        assert_eq!(instance.play_path(), "/cam1");
        assert_eq!(instance.record_path(), "/cam1/record");
        assert_eq!(instance.ref_count(), 0);
        assert_eq!(engine.paths(), vec!["/cam1", "/cam1/record"]);

        let (launch, mode, shared, latency) = engine.factory_settings("/cam1").unwrap();
        assert_eq!(launch, crate::settings::DEFAULT_PLAY_LAUNCH);
        assert_eq!(mode, TransportMode::Play);
        assert!(shared);
        assert_eq!(latency, None);

        let (launch, mode, shared, latency) = engine.factory_settings("/cam1/record").unwrap();
        assert_eq!(launch, crate::settings::DEFAULT_RECORD_LAUNCH);
        assert_eq!(mode, TransportMode::Record);
        assert!(!shared);
        assert_eq!(latency, Some(0));

        let again = registry.get_or_create("cam1").unwrap();
        assert!(Arc::ptr_eq(&instance, &again));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn reference_counting() {
        let (engine, registry) = registry();

        let first = registry.acquire("cam1").unwrap();
        let second = registry.acquire("cam1").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.ref_count(), 2);

        assert!(!registry.release(&first));
        assert_eq!(first.ref_count(), 1);
        assert!(registry.get("cam1").is_some());

        assert!(registry.release(&second));
        assert!(registry.get("cam1").is_none());
        assert!(registry.is_empty());
        assert!(engine.paths().is_empty());
        assert!(first.is_released());

        // Nothing left to release
        assert!(!registry.release(&first));
    }

    #[test]
    fn recreated_afresh() {
        let (_engine, registry) = registry();

        let old = registry.acquire("cam1").unwrap();
        let pad = bind_media(&old);
        pad.set_caps("video/x-h264");
        pad.push(&[1]);
        assert_eq!(old.buffer_count(MediaKind::Video), 1);
        assert!(registry.release(&old));

        let new = registry.acquire("cam1").unwrap();
        assert!(!Arc::ptr_eq(&old, &new));
        assert_eq!(new.ref_count(), 1);
        assert_eq!(new.buffer_count(MediaKind::Video), 0);
        assert!(!new.is_egress_bound());
        assert!(new.started_at() >= old.started_at());
    }

    #[test]
    fn near_colliding_names() {
        let (engine, registry) = registry();

        let cam = registry.acquire("cam").unwrap();
        let cam2 = registry.acquire("cam2").unwrap();
        let ca = registry.acquire("ca").unwrap();
        assert!(!Arc::ptr_eq(&cam, &cam2));
        assert!(!Arc::ptr_eq(&cam, &ca));
        assert_eq!(registry.len(), 3);
        assert_eq!(cam.ref_count(), 1);
        assert_eq!(cam2.ref_count(), 1);

        assert!(registry.release(&cam));
        assert!(registry.get("cam").is_none());
        assert!(Arc::ptr_eq(&registry.get("cam2").unwrap(), &cam2));
        assert!(Arc::ptr_eq(&registry.get("ca").unwrap(), &ca));
        assert!(engine.is_mounted("/cam2"));
        assert!(!engine.is_mounted("/cam"));
    }

    #[test]
    fn concurrent_acquire() {
        let (_engine, registry) = registry();
        let registry = Arc::new(registry);

        let threads = (0..8)
            .map(|_| {
                let registry = registry.clone();
                thread::spawn(move || registry.acquire("cam1").unwrap())
            })
            .collect::<Vec<_>>();
        let instances = threads
            .into_iter()
            .map(|t| t.join().unwrap())
            .collect::<Vec<_>>();

        assert_eq!(registry.len(), 1);
        assert!(instances.iter().all(|i| Arc::ptr_eq(i, &instances[0])));
        assert_eq!(instances[0].ref_count(), 8);
    }

    #[test]
    fn shutdown_releases_everything() {
        let (engine, registry) = registry();

        let cam1 = registry.acquire("cam1").unwrap();
        registry.acquire("cam2").unwrap();
        assert_eq!(registry.shutdown(), 2);

        assert!(registry.is_empty());
        assert!(engine.paths().is_empty());
        assert!(cam1.is_released());
        assert_eq!(registry.acquire("cam3").unwrap_err(), Error::ShuttingDown);
    }

    #[test]
    fn failed_mount_leaves_nothing_behind() {
        struct FailingRecord(MemoryEngine);

        impl MountPoints for FailingRecord {
            fn add_factory(&self, path: &str, factory: EndpointFactory) -> Result<(), Error> {
                if factory.transport_mode == TransportMode::Record {
                    return Err(Error::Mount {
                        path: String::from(path),
                        reason: String::from("no record support"),
                    });
                }
                self.0.add_factory(path, factory)
            }

            fn remove_factory(&self, path: &str) {
                self.0.remove_factory(path)
            }
        }

        let mounts = Arc::new(FailingRecord(MemoryEngine::default()));
        let registry = PathRegistry::new(mounts.clone(), Arc::new(Settings::default()));

        assert!(matches!(
            registry.acquire("cam1"),
            Err(Error::Mount { .. })
        ));
        assert!(registry.is_empty());
        assert!(mounts.0.paths().is_empty());
    }

    /// Configure one egress and one ingest media for `instance`, returning the video ingest pad.
    fn bind_media(instance: &Arc<RelayInstance>) -> Arc<MemoryPad> {
        let play = MemoryMedia::from_launch(crate::settings::DEFAULT_PLAY_LAUNCH);
        PlayConfigure::new(instance.clone())
            .media_configure(&play)
            .unwrap();

        let record = MemoryMedia::from_launch(crate::settings::DEFAULT_RECORD_LAUNCH);
        RecordConfigure::new(instance.clone())
            .media_configure(&record)
            .unwrap();

        record.pad("depay0").unwrap()
    }
}
