/// Extracts the request-target from an HTTP request's first line, e.g.
/// `GET /index.html HTTP/1.1` → `/index.html`.
pub fn request_path(request: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(request);
    let first_line = text.split("\r\n").next()?;
    let mut parts = first_line.split_whitespace();
    parts.next()?; // method
    Some(parts.next()?.to_string())
}

/// Classifies a request as a WebSocket upgrade iff all three hold:
/// `Upgrade: websocket` (case-insensitive), `Connection` contains
/// `upgrade` as one of its comma-separated tokens, and
/// `Sec-WebSocket-Key` is present and non-empty.
pub fn is_websocket_upgrade(request: &[u8]) -> bool {
    let text = String::from_utf8_lossy(request);

    let mut has_upgrade_header = false;
    let mut has_connection_upgrade = false;
    let mut has_key = false;

    for line in text.split("\r\n").skip(1) {
        let Some((name, value)) = line.split_once(':') else { continue };
        let name = name.trim();
        let value = value.trim();
        if name.eq_ignore_ascii_case("upgrade") {
            has_upgrade_header = value.eq_ignore_ascii_case("websocket");
        } else if name.eq_ignore_ascii_case("connection") {
            has_connection_upgrade = value.split(',').any(|token| token.trim().eq_ignore_ascii_case("upgrade"));
        } else if name.eq_ignore_ascii_case("sec-websocket-key") {
            has_key = !value.is_empty();
        }
    }

    has_upgrade_header && has_connection_upgrade && has_key
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(upgrade: bool, connection: bool, key: bool) -> Vec<u8> {
        let mut lines = vec!["GET /ws HTTP/1.1".to_string(), "Host: example.com".to_string()];
        if upgrade {
            lines.push("Upgrade: websocket".to_string());
        }
        if connection {
            lines.push("Connection: keep-alive, Upgrade".to_string());
        }
        if key {
            lines.push("Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==".to_string());
        }
        format!("{}\r\n\r\n", lines.join("\r\n")).into_bytes()
    }

    #[test]
    fn classifies_every_combination_of_the_three_headers() {
        for upgrade in [false, true] {
            for connection in [false, true] {
                for key in [false, true] {
                    let req = request(upgrade, connection, key);
                    let expected = upgrade && connection && key;
                    assert_eq!(
                        is_websocket_upgrade(&req),
                        expected,
                        "upgrade={upgrade} connection={connection} key={key}"
                    );
                }
            }
        }
    }

    #[test]
    fn header_names_are_case_insensitive() {
        let req = b"GET /ws HTTP/1.1\r\nupgrade: WebSocket\r\nCONNECTION: Upgrade\r\nsec-websocket-key: x\r\n\r\n";
        assert!(is_websocket_upgrade(req));
    }

    #[test]
    fn empty_key_value_is_rejected() {
        let req = b"GET /ws HTTP/1.1\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Key: \r\n\r\n";
        assert!(!is_websocket_upgrade(req));
    }

    #[test]
    fn extracts_the_request_path() {
        assert_eq!(request_path(b"GET /app.js HTTP/1.1\r\n\r\n"), Some("/app.js".to_string()));
        assert_eq!(request_path(b"GET / HTTP/1.1\r\n\r\n"), Some("/".to_string()));
    }
}
