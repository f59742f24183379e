// Rust RTSP Relay
//
// Copyright (C) 2020-2021 Sebastian Dröge <sebastian@centricular.com>
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// <https://mozilla.org/MPL/2.0/>.
//
// SPDX-License-Identifier: MPL-2.0

use std::fmt;

/// Unique identifier for a specific client connection
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id(uuid::Uuid);

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Id {
    pub fn new() -> Self {
        Id(uuid::Uuid::new_v4())
    }
}

impl Default for Id {
    fn default() -> Self {
        Self::new()
    }
}

/// Information about a newly connected client.
#[derive(Debug, Clone, Default)]
pub struct ConnectionInformation {
    /// Remote address as reported by the RTSP server.
    pub peer_addr: Option<String>,
}

impl ConnectionInformation {
    pub fn new(peer_addr: Option<String>) -> Self {
        ConnectionInformation { peer_addr }
    }
}
