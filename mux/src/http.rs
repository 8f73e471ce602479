use std::{
    io::{Cursor, Read},
    path::Path,
};

/// A response to be written back over the TLS stream.
pub struct Response {
    status: u16,
    content_type: &'static str,
    body: Vec<u8>,
}

impl Response {
    /// Serializes the status line, headers, and body.
    ///
    /// `HTTP/1.1 <status>\r\nContent-Type: …\r\nContent-Length:
    /// …\r\nConnection: close\r\n\r\n<body>` — no caching headers, every
    /// response closes the connection.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let status_line = match self.status {
            200 => "200 OK",
            404 => "404 Not Found",
            _ => "500 Internal Server Error",
        };
        let mut out = format!(
            "HTTP/1.1 {status_line}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            self.content_type,
            self.body.len(),
        )
        .into_bytes();
        out.extend_from_slice(&self.body);
        out
    }
}

/// Serves files out of a tar archive held entirely in memory.
pub struct StaticAssets {
    archive: Vec<u8>,
}

impl StaticAssets {
    /// Reads the archive at `path` into memory.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        Ok(Self { archive: std::fs::read(path)? })
    }

    /// Wraps an already-loaded archive (used by tests and by callers
    /// that embed the archive with `include_bytes!`).
    #[must_use]
    pub fn from_bytes(archive: Vec<u8>) -> Self {
        Self { archive }
    }

    /// Maps a request path to a response. `/` serves `index.html`; any
    /// other path has its leading `/` stripped and is looked up
    /// directly, normalizing a `./` prefix on archive entries. Unknown
    /// paths get a `404`.
    #[must_use]
    pub fn respond(&self, request_path: &str) -> Response {
        let wanted = normalize_request_path(request_path);
        match self.find(&wanted) {
            Some(body) => Response { status: 200, content_type: content_type_for(&wanted), body },
            None => Response { status: 404, content_type: "text/plain", body: b"Not Found".to_vec() },
        }
    }

    fn find(&self, path: &str) -> Option<Vec<u8>> {
        let mut archive = tar::Archive::new(Cursor::new(&self.archive));
        for mut entry in archive.entries().ok()?.flatten() {
            let entry_path = entry.path().ok()?.to_string_lossy().into_owned();
            if entry_path.trim_start_matches("./") == path {
                let mut body = Vec::new();
                entry.read_to_end(&mut body).ok()?;
                return Some(body);
            }
        }
        None
    }
}

fn normalize_request_path(request_path: &str) -> String {
    if request_path == "/" {
        "index.html".to_string()
    } else {
        request_path.trim_start_matches('/').to_string()
    }
}

fn content_type_for(path: &str) -> &'static str {
    match path.rsplit('.').next().unwrap_or("") {
        "html" => "text/html",
        "css" => "text/css",
        "js" => "application/javascript",
        "json" => "application/json",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_archive() -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, body) in [("index.html", b"<html></html>".as_slice()), ("./assets/app.js", b"console.log(1)")] {
            let mut header = tar::Header::new_gnu();
            header.set_size(body.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, body).unwrap();
        }
        builder.into_inner().unwrap()
    }

    #[test]
    fn root_path_maps_to_index_html() {
        let assets = StaticAssets::from_bytes(fixture_archive());
        let response = assets.respond("/");
        assert_eq!(response.status, 200);
        assert_eq!(response.content_type, "text/html");
        assert_eq!(response.body, b"<html></html>");
    }

    #[test]
    fn dot_slash_prefixed_entries_are_normalized() {
        let assets = StaticAssets::from_bytes(fixture_archive());
        let response = assets.respond("/assets/app.js");
        assert_eq!(response.status, 200);
        assert_eq!(response.content_type, "application/javascript");
        assert_eq!(response.body, b"console.log(1)");
    }

    #[test]
    fn unknown_path_is_404() {
        let assets = StaticAssets::from_bytes(fixture_archive());
        let response = assets.respond("/missing.png");
        assert_eq!(response.status, 404);
    }

    #[test]
    fn response_serializes_with_the_documented_headers() {
        let assets = StaticAssets::from_bytes(fixture_archive());
        let bytes = assets.respond("/").to_bytes();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Type: text/html\r\n"));
        assert!(text.contains("Content-Length: 14\r\n"));
        assert!(text.contains("Connection: close\r\n"));
        assert!(text.ends_with("<html></html>"));
    }
}
