//! TLS termination, static-asset serving, and WebSocket fan-out for
//! browser clients.
//!
//! A listener accepts plain TCP connections, terminates TLS itself, then
//! peeks the first request to decide whether the client wants the
//! single-page app's static assets or a WebSocket stream of encoded
//! video. WebSocket clients are registered with a [`kvmd_broadcast::Hub`]
//! and receive every frame pushed to it until they disconnect.

#![warn(missing_docs)]

mod connection;
mod error;
mod handshake;
mod http;
mod stream;
mod tls;

use std::{net::TcpListener, sync::Arc};

pub use crate::{
    error::Error,
    handshake::{is_websocket_upgrade, request_path},
    http::{Response, StaticAssets},
    tls::{load_certs, load_private_key, server_config},
};

use kvmd_broadcast::Hub;
use kvmd_hid::Injector;

/// Accepts connections on `listener` until it errors, dispatching each
/// to its own thread. Runs until the process exits; the caller is
/// expected to bind `listener` and never intends to stop accepting.
///
/// Every WebSocket client's inbound control messages are forwarded to
/// the same `injector`, matching the wire protocol's single shared HID
/// state (last-write-wins across racing clients).
pub fn serve(
    listener: TcpListener,
    tls_config: Arc<rustls::ServerConfig>,
    assets: Arc<StaticAssets>,
    hub: Arc<Hub>,
    injector: Arc<std::sync::Mutex<Injector>>,
) -> ! {
    loop {
        let (tcp, peer) = match listener.accept() {
            Ok(pair) => pair,
            Err(err) => {
                log::warn!("failed to accept connection: {err}");
                continue;
            }
        };

        let tls_config = Arc::clone(&tls_config);
        let assets = Arc::clone(&assets);
        let hub = Arc::clone(&hub);
        let injector = Arc::clone(&injector);
        std::thread::spawn(move || {
            if let Err(err) = connection::handle(tcp, tls_config, &assets, &hub, &injector) {
                log::debug!("connection from {peer} ended: {err}");
            }
        });
    }
}
