use std::io::{self, Read, Write};

/// Wraps a stream whose first few bytes have already been read (peeked)
/// elsewhere, replaying them before falling through to the live stream.
///
/// Classifying a connection as HTTP or WebSocket means reading the
/// request line and headers before handing the stream to the
/// WebSocket handshake code, which expects to read the request itself.
/// This replays exactly what was consumed so nothing downstream notices.
pub struct PeekedStream<S> {
    buffered: io::Cursor<Vec<u8>>,
    inner: S,
}

impl<S> PeekedStream<S> {
    pub fn new(peeked: Vec<u8>, inner: S) -> Self {
        Self { buffered: io::Cursor::new(peeked), inner }
    }

    /// Borrows the wrapped stream, e.g. to reach the raw socket beneath
    /// a TLS layer for setting socket options.
    pub fn get_ref(&self) -> &S {
        &self.inner
    }
}

impl<S: Read> Read for PeekedStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if (self.buffered.position() as usize) < self.buffered.get_ref().len() {
            return self.buffered.read(buf);
        }
        self.inner.read(buf)
    }
}

impl<S: Write> Write for PeekedStream<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replays_peeked_bytes_before_the_live_stream() {
        let mut stream = PeekedStream::new(b"GET / ".to_vec(), io::Cursor::new(b"HTTP/1.1\r\n\r\n".to_vec()));
        let mut out = Vec::new();
        stream.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"GET / HTTP/1.1\r\n\r\n");
    }
}
