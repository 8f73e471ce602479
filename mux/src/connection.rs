use std::{
    io::{Read, Write},
    net::TcpStream,
    sync::Arc,
    time::Duration,
};

use kvmd_broadcast::{Hub, Writer};
use kvmd_hid::Injector;
use rustls::{ServerConfig, StreamOwned};
use tungstenite::{protocol::WebSocketConfig, Message, WebSocket};

use crate::{handshake, http::StaticAssets, stream::PeekedStream, Error};

const PEEK_BUFFER: usize = 8192;
const MAX_MESSAGE_SIZE: usize = 64 * 1024;
const CLIENT_READ_TIMEOUT: Duration = Duration::from_millis(200);

type TlsStream = StreamOwned<rustls::ServerConnection, TcpStream>;

/// Adapts a client's WebSocket connection to the hub's [`Writer`] seam.
///
/// The write loop (driven by [`Hub::broadcast`]) and the connection's own
/// read loop (waiting on client pings/closes) share one socket, so each
/// side takes a lock around its access. The read side sets a short
/// timeout on the underlying stream so it periodically drops the lock
/// instead of blocking on it indefinitely, bounding how long a broadcast
/// can stall behind one idle client.
pub struct ClientWriter {
    socket: Arc<std::sync::Mutex<WebSocket<PeekedStream<TlsStream>>>>,
}

impl Writer for ClientWriter {
    fn write_binary(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        let mut socket = self.socket.lock().unwrap();
        socket
            .send(Message::Binary(bytes.to_vec()))
            .map_err(|err| std::io::Error::other(err.to_string()))
    }
}

/// Handles one accepted TCP connection end to end: TLS handshake,
/// request classification, then either a static-asset HTTP response or
/// a WebSocket session bridged to `hub`.
pub fn handle(
    tcp: TcpStream,
    tls_config: Arc<ServerConfig>,
    assets: &StaticAssets,
    hub: &Hub,
    injector: &Arc<std::sync::Mutex<Injector>>,
) -> Result<(), Error> {
    tcp.set_nodelay(true).map_err(Error::Transport)?;

    let connection = rustls::ServerConnection::new(tls_config).map_err(Error::TlsConfig)?;
    let mut tls = StreamOwned::new(connection, tcp);

    let mut peek_buf = vec![0u8; PEEK_BUFFER];
    let read = peek_request(&mut tls, &mut peek_buf)?;
    peek_buf.truncate(read);

    let stream = PeekedStream::new(peek_buf.clone(), tls);

    if handshake::is_websocket_upgrade(&peek_buf) {
        serve_websocket(stream, hub, injector)
    } else {
        serve_http(stream, &peek_buf, assets)
    }
}

fn peek_request(tls: &mut TlsStream, buf: &mut [u8]) -> Result<usize, Error> {
    let mut total = 0;
    loop {
        let n = tls.read(&mut buf[total..]).map_err(Error::Handshake)?;
        total += n;
        if n == 0 || buf[..total].windows(4).any(|w| w == b"\r\n\r\n") || total == buf.len() {
            break;
        }
    }
    Ok(total)
}

fn serve_http(mut stream: PeekedStream<TlsStream>, request: &[u8], assets: &StaticAssets) -> Result<(), Error> {
    let path = handshake::request_path(request).unwrap_or_else(|| "/".to_string());
    let response = assets.respond(&path);
    stream.write_all(&response.to_bytes()).map_err(Error::Transport)?;
    stream.flush().map_err(Error::Transport)
}

fn serve_websocket(
    stream: PeekedStream<TlsStream>,
    hub: &Hub,
    injector: &Arc<std::sync::Mutex<Injector>>,
) -> Result<(), Error> {
    let config = WebSocketConfig { max_message_size: Some(MAX_MESSAGE_SIZE), ..Default::default() };
    let websocket = tungstenite::accept_with_config(stream, Some(config))
        .map_err(|err| Error::Protocol(err.to_string()))?;

    set_read_timeout(&websocket, CLIENT_READ_TIMEOUT);

    let socket = Arc::new(std::sync::Mutex::new(websocket));
    let client_id = hub.add(Box::new(ClientWriter { socket: Arc::clone(&socket) }));

    loop {
        let message = {
            let mut guard = socket.lock().unwrap();
            guard.read()
        };
        match message {
            Ok(Message::Close(_)) => break,
            Ok(Message::Text(text)) => injector.lock().unwrap().handle_message(&text),
            Ok(_) => continue,
            Err(tungstenite::Error::Io(ref err))
                if matches!(err.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut) =>
            {
                continue;
            }
            Err(_) => break,
        }
    }

    hub.remove(client_id);
    Ok(())
}

fn set_read_timeout(websocket: &WebSocket<PeekedStream<TlsStream>>, timeout: Duration) {
    let _ = websocket.get_ref().get_ref().sock.set_read_timeout(Some(timeout));
}
