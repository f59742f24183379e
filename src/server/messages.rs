// Rust RTSP Relay
//
// Copyright (C) 2020-2021 Sebastian Dröge <sebastian@centricular.com>
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// <https://mozilla.org/MPL/2.0/>.
//
// SPDX-License-Identifier: MPL-2.0

use futures::channel::oneshot;

use crate::client;
use crate::error::Error;
use crate::relay::PathInfo;

/// Messages sent from the app to the relay
#[derive(derivative::Derivative)]
#[derivative(Debug)]
pub(super) enum AppMessage {
    Quit,
    Paths {
        #[derivative(Debug = "ignore")]
        ret: oneshot::Sender<Vec<PathInfo>>,
    },
}

impl From<AppMessage> for ControllerMessage {
    fn from(msg: AppMessage) -> ControllerMessage {
        ControllerMessage::App(msg)
    }
}

/// Client events forwarded from the RTSP server to the relay
#[derive(derivative::Derivative)]
#[derivative(Debug)]
pub(super) enum ClientMessage {
    Connected {
        client_id: client::Id,
        info: client::ConnectionInformation,
        #[derivative(Debug = "ignore")]
        ret: oneshot::Sender<()>,
    },
    Request {
        client_id: client::Id,
        method: rtsp_types::Method,
        uri: Option<url::Url>,
        /// Name of the path the client is associated with afterwards.
        #[derivative(Debug = "ignore")]
        ret: oneshot::Sender<Result<Option<String>, Error>>,
    },
    Closed {
        client_id: client::Id,
        #[derivative(Debug = "ignore")]
        ret: oneshot::Sender<()>,
    },
}

impl From<ClientMessage> for ControllerMessage {
    fn from(msg: ClientMessage) -> ControllerMessage {
        ControllerMessage::Client(msg)
    }
}

#[derive(Debug)]
pub(super) enum ControllerMessage {
    App(AppMessage),
    Client(ClientMessage),
}

/// Messages handled by the relay task
#[derive(Debug)]
pub(super) enum RelayMessage {
    Controller(ControllerMessage),
    ControllerClosed,
    CheckClientTimeout(client::Id),
}
