// Rust RTSP Relay
//
// Copyright (C) 2020-2021 Sebastian Dröge <sebastian@centricular.com>
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// <https://mozilla.org/MPL/2.0/>.
//
// SPDX-License-Identifier: MPL-2.0

use std::time::Duration;

use futures::channel::mpsc;
use futures::prelude::*;

use log::{debug, info, trace, warn};

use async_std::task;

use crate::client;

use super::context;
use super::messages::*;

async fn task_fn(
    mut ctx: context::Context,
    receiver: mpsc::Receiver<RelayMessage>,
    controller_receiver: mpsc::Receiver<ControllerMessage>,
) {
    let mut merged_streams = stream::select(
        receiver,
        controller_receiver
            .map(RelayMessage::Controller)
            .chain(stream::once(future::ready(RelayMessage::ControllerClosed))),
    );

    while let Some(msg) = merged_streams.next().await {
        trace!("Received relay message {:?}", msg);
        match msg {
            RelayMessage::ControllerClosed => {
                info!("Controller closed, shutting down");
                break;
            }
            RelayMessage::CheckClientTimeout(client_id) => {
                trace!("Checking timeout for client {}", client_id);

                if let Some(timeout) = ctx.settings.client_timeout {
                    if let Some(remaining) = ctx.tracker.check_timeout(client_id, timeout) {
                        schedule_timeout_check(&ctx, client_id, remaining);
                    }
                }
            }
            RelayMessage::Controller(ControllerMessage::App(msg)) => match msg {
                AppMessage::Quit => {
                    info!("Application wants to shut down relay");
                    break;
                }
                AppMessage::Paths { ret } => {
                    let paths = ctx
                        .registry
                        .instances()
                        .iter()
                        .map(|instance| instance.info())
                        .collect();
                    let _ = ret.send(paths);
                }
            },
            RelayMessage::Controller(ControllerMessage::Client(msg)) => match msg {
                ClientMessage::Connected {
                    client_id,
                    info,
                    ret,
                } => {
                    ctx.tracker.connected(client_id, info);
                    let _ = ret.send(());
                }
                ClientMessage::Request {
                    client_id,
                    method,
                    uri,
                    ret,
                } => {
                    let was_associated = ctx.tracker.instance(client_id).is_some();

                    let res = match ctx.tracker.request(client_id, &method, uri.as_ref()) {
                        Ok(Some(instance)) => {
                            if !was_associated {
                                if let Some(timeout) = ctx.settings.client_timeout {
                                    schedule_timeout_check(&ctx, client_id, timeout);
                                }
                            }
                            Ok(Some(String::from(instance.name())))
                        }
                        Ok(None) => Ok(None),
                        Err(err) => {
                            warn!(
                                "Client {} can't be associated with {:?}: {}",
                                client_id, uri, err
                            );
                            Err(err)
                        }
                    };

                    let _ = ret.send(res);
                }
                ClientMessage::Closed { client_id, ret } => {
                    if ctx.tracker.closed(client_id) {
                        debug!("Client {} was the last one of its path", client_id);
                    }
                    let _ = ret.send(());
                }
            },
        }
    }

    ctx.tracker.shutdown();
    ctx.registry.shutdown();

    debug!("Relay shut down");
}

fn schedule_timeout_check(ctx: &context::Context, client_id: client::Id, after: Duration) {
    let mut relay_sender = ctx.relay_sender.clone();
    task::spawn(async move {
        task::sleep(after).await;
        let _ = relay_sender
            .send(RelayMessage::CheckClientTimeout(client_id))
            .await;
    });
}

pub(super) fn spawn(
    ctx: context::Context,
    receiver: mpsc::Receiver<RelayMessage>,
    controller_receiver: mpsc::Receiver<ControllerMessage>,
) -> task::JoinHandle<()> {
    task::spawn(task_fn(ctx, receiver, controller_receiver))
}
