// Rust RTSP Relay
//
// Copyright (C) 2020-2021 Sebastian Dröge <sebastian@centricular.com>
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// <https://mozilla.org/MPL/2.0/>.
//
// SPDX-License-Identifier: MPL-2.0

//! # RTSP Relay Library
//!
//! Relays live streams from publishers to viewers. A publisher pushes to
//! `rtsp://host:port/<name>/record`, viewers pull from `rtsp://host:port/<name>`. The endpoints
//! of a stream name are created when a client first asks for them and torn down once the last
//! client referencing them is gone.
//!
//! ## Overview of the components
//!
//! ### `Relay`
//!
//! The [`server::Relay`] is the handle to the relay task. The RTSP server forwards its client
//! connection, request and close events to it and the relay creates and removes endpoints in
//! the server's mount table accordingly.
//!
//! See the [`server`] module for details.
//!
//! ### Engine
//!
//! The RTSP protocol handling and the media pipelines are provided by an engine implementing
//! the traits in [`engine`]: [`engine::MountPoints`] for the mount table, and
//! [`engine::Media`], [`engine::Pad`] and [`engine::PushSource`] for the pipelines created from
//! the endpoint templates.
//!
//! [`engine::memory`] keeps everything in memory and is what the tests use. With the
//! `gstreamer` feature `engine::gstreamer` runs the relay on top of the GStreamer RTSP server.
//!
//! ### Relay state
//!
//! Each stream name gets one [`relay::RelayInstance`] in the [`relay::PathRegistry`]. The
//! configure hooks bind the ingest media of the record endpoint and the shared egress media of
//! the play endpoint to it, and a [`relay::BufferBridge`] per media kind copies every buffer
//! from ingest to egress.
//!
//! See the [`relay`] module for details.

pub mod client;
pub mod engine;
pub mod error;
pub mod relay;
pub mod server;
pub mod settings;
pub(crate) mod utils;

pub use rtsp_types as types;
pub use url::Url;

pub use utils::UrlExt;
