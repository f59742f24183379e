// Rust RTSP Relay
//
// Copyright (C) 2020-2021 Sebastian Dröge <sebastian@centricular.com>
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// <https://mozilla.org/MPL/2.0/>.
//
// SPDX-License-Identifier: MPL-2.0

//! Per-path relay state and its lifecycle.
//!
//! A [`PathRegistry`] owns one [`RelayInstance`] per stream name. The [`RecordConfigure`] and
//! [`PlayConfigure`] hooks bind the ingest and egress media of a path to its instance, and a
//! [`BufferBridge`] per media kind copies buffers from ingest to egress. The
//! [`ClientTracker`] decides when paths are created and torn down.

mod bridge;
mod hooks;
mod instance;
mod registry;
mod tracker;

pub use bridge::BufferBridge;
pub use hooks::{PlayConfigure, RecordConfigure};
pub use instance::{PathInfo, RelayInstance};
pub use registry::PathRegistry;
pub use tracker::ClientTracker;
