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
use std::sync::Arc;

use futures::channel::{mpsc, oneshot};
use futures::lock::Mutex;
use futures::prelude::*;

use async_std::task;

use log::{debug, warn};

use crate::client;
use crate::engine::MountPoints;
use crate::error::Error;
use crate::relay::{ClientTracker, PathInfo, PathRegistry};
use crate::settings::Settings;

use super::context;
use super::messages::*;

/// Relay handle.
///
/// Cheap to clone. The relay task shuts down once the last handle is dropped.
#[derive(Clone)]
pub struct Relay {
    sender: mpsc::Sender<ControllerMessage>,
    app: App,
}

impl fmt::Debug for Relay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Relay")
    }
}

#[derive(Clone)]
struct App(Arc<AppInner>);

struct AppInner {
    join_handle: Mutex<Option<task::JoinHandle<()>>>,
    sender: mpsc::Sender<ControllerMessage>,
    settings: Arc<Settings>,
}

impl Drop for AppInner {
    fn drop(&mut self) {
        // Close the channel once the last app reference is gone
        self.sender.close_channel();
    }
}

impl Relay {
    /// Create a relay that binds its endpoints into `mounts`.
    pub fn builder(mounts: Arc<dyn MountPoints>) -> Builder {
        Builder {
            mounts,
            settings: Settings::default(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.app.0.settings
    }

    async fn request<T>(
        &self,
        msg: impl Into<ControllerMessage>,
        receiver: oneshot::Receiver<T>,
    ) -> Result<T, Error> {
        let mut sender = self.sender.clone();
        sender.send(msg.into()).await?;
        Ok(receiver.await?)
    }

    /// A new client connection was accepted.
    pub async fn client_connected(
        &self,
        client_id: client::Id,
        info: client::ConnectionInformation,
    ) -> Result<(), Error> {
        let (sender, receiver) = oneshot::channel();

        self.request(
            ClientMessage::Connected {
                client_id,
                info,
                ret: sender,
            },
            receiver,
        )
        .await
    }

    /// A client sent a request.
    ///
    /// Returns the name of the path the client is associated with afterwards.
    pub async fn client_request(
        &self,
        client_id: client::Id,
        method: rtsp_types::Method,
        uri: Option<url::Url>,
    ) -> Result<Option<String>, Error> {
        let (sender, receiver) = oneshot::channel();

        self.request(
            ClientMessage::Request {
                client_id,
                method,
                uri,
                ret: sender,
            },
            receiver,
        )
        .await?
    }

    /// A client connection was closed.
    pub async fn client_closed(&self, client_id: client::Id) -> Result<(), Error> {
        let (sender, receiver) = oneshot::channel();

        self.request(
            ClientMessage::Closed {
                client_id,
                ret: sender,
            },
            receiver,
        )
        .await
    }

    /// Currently relayed paths, sorted by name.
    pub async fn paths(&self) -> Result<Vec<PathInfo>, Error> {
        let (sender, receiver) = oneshot::channel();

        self.request(AppMessage::Paths { ret: sender }, receiver)
            .await
    }

    /// Stop the relay task and release all paths.
    pub async fn shutdown(self) {
        debug!("Shutting down relay");

        let mut sender = self.sender.clone();
        if let Err(err) = sender.send(AppMessage::Quit.into()).await {
            warn!("Relay task can't be shut down: {}", err);
            return;
        }

        if let Some(join_handle) = self.app.0.join_handle.lock().await.take() {
            join_handle.await;
        }
    }
}

pub struct Builder {
    mounts: Arc<dyn MountPoints>,
    settings: Settings,
}

impl fmt::Debug for Builder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builder")
            .field("settings", &self.settings)
            .finish()
    }
}

impl Builder {
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;

        self
    }

    pub fn run(self) -> Relay {
        let Builder { mounts, settings } = self;
        let settings = Arc::new(settings);

        // Channel for messages the relay task sends itself
        let (relay_sender, relay_receiver) = mpsc::channel(100);

        let (controller_sender, controller_receiver) = mpsc::channel(100);

        let registry = Arc::new(PathRegistry::new(mounts, settings.clone()));

        let ctx = context::Context {
            settings: settings.clone(),
            relay_sender,
            tracker: ClientTracker::new(registry.clone()),
            registry,
        };

        let join_handle = super::task::spawn(ctx, relay_receiver, controller_receiver);

        Relay {
            sender: controller_sender.clone(),
            app: App(Arc::new(AppInner {
                join_handle: Mutex::new(Some(join_handle)),
                sender: controller_sender,
                settings,
            })),
        }
    }
}
