// Rust RTSP Relay
//
// Copyright (C) 2020-2021 Sebastian Dröge <sebastian@centricular.com>
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// <https://mozilla.org/MPL/2.0/>.
//
// SPDX-License-Identifier: MPL-2.0

use std::cmp;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, trace, warn};

use super::{PathRegistry, RelayInstance};
use crate::client;
use crate::error::Error;
use crate::utils::UrlExt;

struct ClientEntry {
    info: client::ConnectionInformation,
    /// Path this connection holds a reference on.
    instance: Option<Arc<RelayInstance>>,
    last_active: Instant,
}

/// Associates client connections with the path they hold a reference on.
///
/// A connection takes at most one reference, on its first discovery request, and gives it back
/// when it closes or times out.
pub struct ClientTracker {
    registry: Arc<PathRegistry>,
    clients: HashMap<client::Id, ClientEntry>,
}

impl ClientTracker {
    pub fn new(registry: Arc<PathRegistry>) -> Self {
        ClientTracker {
            registry,
            clients: HashMap::new(),
        }
    }

    pub fn registry(&self) -> &Arc<PathRegistry> {
        &self.registry
    }

    /// Number of tracked connections.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Path the client holds a reference on.
    pub fn instance(&self, client_id: client::Id) -> Option<Arc<RelayInstance>> {
        self.clients
            .get(&client_id)
            .and_then(|entry| entry.instance.clone())
    }

    /// Start tracking a new connection. Returns `false` if it was already known.
    pub fn connected(&mut self, client_id: client::Id, info: client::ConnectionInformation) -> bool {
        if self.clients.contains_key(&client_id) {
            warn!("Client {} connected twice", client_id);
            return false;
        }

        debug!("Client {} connected from {:?}", client_id, info.peer_addr);

        self.clients.insert(
            client_id,
            ClientEntry {
                info,
                instance: None,
                last_active: Instant::now(),
            },
        );

        true
    }

    /// Handle a request of a connection.
    ///
    /// Only `OPTIONS` discovers the path of a connection. Returns the path the connection is
    /// associated with afterwards.
    pub fn request(
        &mut self,
        client_id: client::Id,
        method: &rtsp_types::Method,
        uri: Option<&url::Url>,
    ) -> Result<Option<Arc<RelayInstance>>, Error> {
        let entry = match self.clients.get_mut(&client_id) {
            Some(entry) => entry,
            None => {
                warn!("Unknown client {} sent {:?} request", client_id, method);
                return Ok(None);
            }
        };

        entry.last_active = Instant::now();

        trace!("Client {} sent {:?} request for {:?}", client_id, method, uri);

        if *method != rtsp_types::Method::Options {
            return Ok(entry.instance.clone());
        }

        let name = match uri.and_then(|uri| uri.stream_name()) {
            Some(name) => name,
            None => {
                debug!(
                    "Client {} sent discovery request without stream name: {:?}",
                    client_id, uri
                );
                return Ok(entry.instance.clone());
            }
        };

        if let Some(ref instance) = entry.instance {
            if instance.name() != name {
                warn!(
                    "Client {} already associated with path {}, ignoring {}",
                    client_id,
                    instance.name(),
                    name
                );
            }
            return Ok(Some(instance.clone()));
        }

        let instance = self.registry.acquire(&name)?;

        info!(
            "Client {} ({:?}) associated with path {}",
            client_id, entry.info.peer_addr, name
        );
        entry.instance = Some(instance.clone());

        Ok(Some(instance))
    }

    /// Forget a connection and release its path reference.
    ///
    /// Returns `true` if this tore down the path.
    pub fn closed(&mut self, client_id: client::Id) -> bool {
        let entry = match self.clients.remove(&client_id) {
            Some(entry) => entry,
            None => {
                debug!("Unknown client {} closed", client_id);
                return false;
            }
        };

        debug!("Client {} closed", client_id);

        match entry.instance {
            Some(instance) => self.registry.release(&instance),
            None => false,
        }
    }

    /// Release the path reference of a connection if neither the connection nor its path were
    /// active for `timeout`.
    ///
    /// Returns after how long to check again, `None` if the connection holds no reference
    /// anymore.
    pub fn check_timeout(&mut self, client_id: client::Id, timeout: Duration) -> Option<Duration> {
        let entry = self.clients.get_mut(&client_id)?;
        let instance = entry.instance.as_ref()?;

        let idle = cmp::min(entry.last_active.elapsed(), instance.idle_time());
        if idle < timeout {
            return Some(timeout - idle);
        }

        info!(
            "Client {} timed out, releasing path {}",
            client_id,
            instance.name()
        );

        if let Some(instance) = entry.instance.take() {
            self.registry.release(&instance);
        }

        None
    }

    /// Release the references of all connections.
    pub fn shutdown(&mut self) {
        for (client_id, entry) in self.clients.drain() {
            if let Some(instance) = entry.instance {
                debug!("Client {}: Releasing path {}", client_id, instance.name());
                self.registry.release(&instance);
            }
        }
    }
}
