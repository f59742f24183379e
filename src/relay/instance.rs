// Rust RTSP Relay
//
// Copyright (C) 2020-2021 Sebastian Dröge <sebastian@centricular.com>
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// <https://mozilla.org/MPL/2.0/>.
//
// SPDX-License-Identifier: MPL-2.0

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use log::{debug, info};

use crate::engine::{Caps, MediaKind, PushSource};
use crate::settings::Settings;

/// Snapshot of a relayed path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathInfo {
    pub name: String,
    pub play_path: String,
    pub record_path: String,
    pub started_at: DateTime<Utc>,
    pub ref_count: usize,
    pub egress_bound: bool,
    /// Number of buffers relayed per media kind.
    pub buffers: BTreeMap<MediaKind, u64>,
}

/// Bridge state of one media kind.
#[derive(Default)]
pub(crate) struct KindState {
    /// Push source of the shared egress media, once bound.
    pub(crate) sink: Option<Arc<dyn PushSource>>,
    /// Caps last read off the ingest pad.
    pub(crate) ingest_caps: Option<Caps>,
    /// Caps applied to `sink`.
    pub(crate) applied_caps: Option<Caps>,
    /// Buffers relayed to `sink`.
    pub(crate) buffers: u64,
}

pub(crate) struct State {
    pub(crate) ref_count: usize,
    pub(crate) released: bool,
    pub(crate) egress_bound: bool,
    pub(crate) last_ingest: Option<Instant>,
    pub(crate) kinds: BTreeMap<MediaKind, KindState>,
}

/// Relay state of a single stream name.
///
/// Shared between the registry, the configure hooks of both endpoints and the buffer probes of
/// every ingest media. Everything mutable lives behind one mutex that is only held for short
/// bookkeeping, never while a buffer is pushed.
pub struct RelayInstance {
    name: String,
    play_path: String,
    record_path: String,
    started_at: DateTime<Utc>,
    created: Instant,
    follow_caps_changes: bool,
    state: Mutex<State>,
}

impl fmt::Debug for RelayInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayInstance")
            .field("name", &self.name)
            .field("started_at", &self.started_at)
            .finish()
    }
}

impl RelayInstance {
    pub(crate) fn new(name: &str, settings: &Settings) -> Self {
        let kinds = settings
            .kinds
            .iter()
            .map(|kind| (*kind, KindState::default()))
            .collect();

        RelayInstance {
            name: String::from(name),
            play_path: format!("/{}", name),
            record_path: format!("/{}/record", name),
            started_at: Utc::now(),
            created: Instant::now(),
            follow_caps_changes: settings.follow_caps_changes,
            state: Mutex::new(State {
                ref_count: 0,
                released: false,
                egress_bound: false,
                last_ingest: None,
                kinds,
            }),
        }
    }

    /// Stream name of this path.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Endpoint viewers pull from.
    pub fn play_path(&self) -> &str {
        &self.play_path
    }

    /// Endpoint publishers push to.
    pub fn record_path(&self) -> &str {
        &self.record_path
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Media kinds relayed by this instance.
    pub fn kinds(&self) -> Vec<MediaKind> {
        self.lock().kinds.keys().copied().collect()
    }

    pub fn ref_count(&self) -> usize {
        self.lock().ref_count
    }

    /// Buffers relayed to the egress for `kind` so far.
    pub fn buffer_count(&self, kind: MediaKind) -> u64 {
        self.lock()
            .kinds
            .get(&kind)
            .map(|state| state.buffers)
            .unwrap_or(0)
    }

    /// Whether the push sources of the egress media are bound.
    pub fn is_egress_bound(&self) -> bool {
        self.lock().egress_bound
    }

    /// Whether this instance was torn down.
    pub fn is_released(&self) -> bool {
        self.lock().released
    }

    /// Time since the last ingest buffer, or since creation if there was none yet.
    pub fn idle_time(&self) -> Duration {
        self.lock()
            .last_ingest
            .unwrap_or(self.created)
            .elapsed()
    }

    pub fn info(&self) -> PathInfo {
        let state = self.lock();

        PathInfo {
            name: self.name.clone(),
            play_path: self.play_path.clone(),
            record_path: self.record_path.clone(),
            started_at: self.started_at,
            ref_count: state.ref_count,
            egress_bound: state.egress_bound,
            buffers: state
                .kinds
                .iter()
                .map(|(kind, state)| (*kind, state.buffers))
                .collect(),
        }
    }

    pub(crate) fn follow_caps_changes(&self) -> bool {
        self.follow_caps_changes
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Take one more reference. Returns the new count.
    pub(crate) fn add_ref(&self) -> usize {
        let mut state = self.lock();
        state.ref_count += 1;
        state.ref_count
    }

    /// Drop one reference. Returns the new count, `None` if there was none to drop.
    pub(crate) fn remove_ref(&self) -> Option<usize> {
        let mut state = self.lock();
        if state.ref_count == 0 {
            return None;
        }
        state.ref_count -= 1;
        Some(state.ref_count)
    }

    /// Store the push sources of the shared egress media.
    ///
    /// Only the first call binds anything. Caps that were already seen on the ingest side are
    /// applied right away.
    pub(crate) fn bind_egress(&self, sources: Vec<(MediaKind, Arc<dyn PushSource>)>) -> bool {
        let mut state = self.lock();

        if state.released {
            debug!("Path {}: Not binding egress of released path", self.name);
            return false;
        }

        if state.egress_bound {
            return false;
        }

        for (kind, source) in sources {
            source.set_time_format();

            let kind_state = state.kinds.entry(kind).or_default();
            if let Some(caps) = kind_state.ingest_caps.clone() {
                info!("Path {}: {} caps {}", self.name, kind, caps);
                source.set_caps(&caps);
                kind_state.applied_caps = Some(caps);
            }
            kind_state.sink = Some(source);
        }
        state.egress_bound = true;

        true
    }

    /// Mark as torn down and drop the egress push sources.
    pub(crate) fn mark_released(&self) {
        let mut state = self.lock();
        state.released = true;
        for kind_state in state.kinds.values_mut() {
            kind_state.sink = None;
        }
    }
}
