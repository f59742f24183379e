// Rust RTSP Relay
//
// Copyright (C) 2020-2021 Sebastian Dröge <sebastian@centricular.com>
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// <https://mozilla.org/MPL/2.0/>.
//
// SPDX-License-Identifier: MPL-2.0

use std::error::Error;

use gst_rtsp_server::prelude::*;

use log::info;

use rtsp_relay::engine::gstreamer::{connect_clients, GstMountPoints};
use rtsp_relay::server::Relay;
use rtsp_relay::settings::Settings;

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    gst::init()?;

    let settings = Settings::from_env();

    let main_loop = glib::MainLoop::new(None, false);

    let server = gst_rtsp_server::RTSPServer::new();
    server.set_address(&settings.address);
    server.set_service(&settings.port.to_string());

    let mounts = GstMountPoints::from_server(&server)?;
    let relay = Relay::builder(mounts).settings(settings.clone()).run();
    connect_clients(&server, &relay);

    let _source = server.attach(None)?;

    for &signal in &[libc::SIGINT, libc::SIGTERM] {
        let main_loop = main_loop.clone();
        glib::unix_signal_add(signal, move || {
            info!("Received signal {}, shutting down", signal);
            main_loop.quit();
            glib::ControlFlow::Break
        });
    }

    info!(
        "Relaying rtsp://{}:{}/<name>/record to rtsp://{}:{}/<name>",
        settings.address, settings.port, settings.address, settings.port
    );

    main_loop.run();

    async_std::task::block_on(relay.shutdown());

    Ok(())
}
