// Rust RTSP Relay
//
// Copyright (C) 2020-2021 Sebastian Dröge <sebastian@centricular.com>
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// <https://mozilla.org/MPL/2.0/>.
//
// SPDX-License-Identifier: MPL-2.0

use std::sync::Arc;

use futures::channel::mpsc;

use crate::relay::{ClientTracker, PathRegistry};
use crate::settings::Settings;

use super::messages::*;

/// Relay state
pub(super) struct Context {
    pub(super) settings: Arc<Settings>,
    pub(super) relay_sender: mpsc::Sender<RelayMessage>,
    pub(super) registry: Arc<PathRegistry>,
    pub(super) tracker: ClientTracker,
}
