// Rust RTSP Relay
//
// Copyright (C) 2020-2021 Sebastian Dröge <sebastian@centricular.com>
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// <https://mozilla.org/MPL/2.0/>.
//
// SPDX-License-Identifier: MPL-2.0

use std::{error, fmt};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A named element is not part of the endpoint's pipeline.
    MissingElement { element: String },
    /// The named element has no pad with this name.
    MissingPad { element: String, pad: String },
    /// The named element exists but is not of the expected type.
    WrongElementType {
        element: String,
        expected: &'static str,
    },
    /// Binding or unbinding an endpoint in the mount table failed.
    Mount { path: String, reason: String },
    /// Generic pipeline engine failure.
    Pipeline(String),
    /// The relay task is not running anymore.
    Disconnected,
    /// The relay is shutting down and does not accept new references.
    ShuttingDown,
}

impl Error {
    /// Whether this error is a configuration error of a single endpoint.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::MissingElement { .. } | Error::MissingPad { .. } | Error::WrongElementType { .. }
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::MissingElement { element } => write!(fmt, "No element named '{}'", element),
            Error::MissingPad { element, pad } => {
                write!(fmt, "Element '{}' has no pad '{}'", element, pad)
            }
            Error::WrongElementType { element, expected } => {
                write!(fmt, "Element '{}' is not a {}", element, expected)
            }
            Error::Mount { path, reason } => write!(fmt, "Can't mount '{}': {}", path, reason),
            Error::Pipeline(reason) => write!(fmt, "Pipeline error: {}", reason),
            Error::Disconnected => write!(fmt, "Relay task is disconnected"),
            Error::ShuttingDown => write!(fmt, "Relay is shutting down"),
        }
    }
}

impl error::Error for Error {}

impl From<futures::channel::mpsc::SendError> for Error {
    fn from(_: futures::channel::mpsc::SendError) -> Self {
        Error::Disconnected
    }
}

impl From<futures::channel::oneshot::Canceled> for Error {
    fn from(_: futures::channel::oneshot::Canceled) -> Self {
        Error::Disconnected
    }
}
