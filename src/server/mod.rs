// Rust RTSP Relay
//
// Copyright (C) 2020-2021 Sebastian Dröge <sebastian@centricular.com>
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// <https://mozilla.org/MPL/2.0/>.
//
// SPDX-License-Identifier: MPL-2.0

//! The relay task.
//!
//! Client events from the RTSP server are serialized through a single task that owns the
//! [`ClientTracker`](crate::relay::ClientTracker) and schedules the liveness checks.

mod context;
mod controller;
mod messages;
mod task;

pub use controller::{Builder, Relay};
