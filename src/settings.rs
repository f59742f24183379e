// Rust RTSP Relay
//
// Copyright (C) 2020-2021 Sebastian Dröge <sebastian@centricular.com>
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// <https://mozilla.org/MPL/2.0/>.
//
// SPDX-License-Identifier: MPL-2.0

//! Relay settings

use std::env;
use std::time::Duration;

use log::warn;

use crate::engine::MediaKind;

pub const DEFAULT_PORT: u16 = 8554;

/// Ingest pipeline. The first stream must be H264, the second MP4A-LATM.
pub const DEFAULT_RECORD_LAUNCH: &str = "( rtph264depay name=depay0 ! fakesink \
                                         rtpmp4adepay name=depay1 ! fakesink )";

/// Egress pipeline fed by the relay.
pub const DEFAULT_PLAY_LAUNCH: &str = "( appsrc name=video_src is-live=1 do-timestamp=1 ! \
                                       h264parse ! rtph264pay pt=96 config-interval=5 name=pay0 \
                                       appsrc name=audio_src is-live=1 do-timestamp=1 ! \
                                       aacparse ! rtpmp4apay pt=97 name=pay1 )";

#[derive(Debug, Clone)]
pub struct Settings {
    /// Address the RTSP server listens on.
    pub address: String,

    /// Port the RTSP server listens on.
    pub port: u16,

    /// Launch template of the ingest endpoints.
    ///
    /// Must contain a depayloader named after [`MediaKind::depayloader_name`] for each of the
    /// relayed kinds.
    pub record_launch: String,

    /// Launch template of the egress endpoints.
    ///
    /// Must contain an `appsrc` named after [`MediaKind::push_source_name`] for each of the
    /// relayed kinds.
    pub play_launch: String,

    /// Media kinds relayed from ingest to egress.
    pub kinds: Vec<MediaKind>,

    /// Receive latency of the ingest endpoints in milliseconds.
    pub record_latency: u32,

    /// Release a client's path reference after the client and its path were inactive for this
    /// long. `None` keeps references until the client disconnects.
    pub client_timeout: Option<Duration>,

    /// Re-apply the ingest caps to the egress whenever they change.
    ///
    /// By default the caps of the first buffer stay in place for the lifetime of a path.
    pub follow_caps_changes: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            address: String::from("0.0.0.0"),
            port: DEFAULT_PORT,
            record_launch: String::from(DEFAULT_RECORD_LAUNCH),
            play_launch: String::from(DEFAULT_PLAY_LAUNCH),
            kinds: MediaKind::ALL.to_vec(),
            record_latency: 0,
            client_timeout: Some(Duration::from_secs(60)),
            follow_caps_changes: false,
        }
    }
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default settings overridden by `RTSP_RELAY_ADDRESS`, `RTSP_RELAY_PORT` and
    /// `RTSP_RELAY_CLIENT_TIMEOUT` (seconds, 0 disables).
    pub fn from_env() -> Self {
        Self::from_vars(|key| env::var(key).ok())
    }

    fn from_vars<F: Fn(&str) -> Option<String>>(var: F) -> Self {
        let mut settings = Self::default();

        if let Some(address) = var("RTSP_RELAY_ADDRESS") {
            settings.address = address;
        }

        if let Some(port) = var("RTSP_RELAY_PORT") {
            match port.parse::<u16>() {
                Ok(port) => settings.port = port,
                Err(err) => warn!("Ignoring invalid RTSP_RELAY_PORT {:?}: {}", port, err),
            }
        }

        if let Some(timeout) = var("RTSP_RELAY_CLIENT_TIMEOUT") {
            match timeout.parse::<u64>() {
                Ok(0) => settings.client_timeout = None,
                Ok(secs) => settings.client_timeout = Some(Duration::from_secs(secs)),
                Err(err) => warn!(
                    "Ignoring invalid RTSP_RELAY_CLIENT_TIMEOUT {:?}: {}",
                    timeout, err
                ),
            }
        }

        settings
    }

    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn record_launch(mut self, launch: impl Into<String>) -> Self {
        self.record_launch = launch.into();
        self
    }

    pub fn play_launch(mut self, launch: impl Into<String>) -> Self {
        self.play_launch = launch.into();
        self
    }

    pub fn kinds(mut self, kinds: &[MediaKind]) -> Self {
        self.kinds = kinds.to_vec();
        self
    }

    pub fn record_latency(mut self, latency: u32) -> Self {
        self.record_latency = latency;
        self
    }

    pub fn client_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.client_timeout = timeout;
        self
    }

    pub fn follow_caps_changes(mut self, follow: bool) -> Self {
        self.follow_caps_changes = follow;
        self
    }
}
