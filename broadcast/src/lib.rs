//! Fan-out hub for the mux's WebSocket clients.
//!
//! One encoder output is pushed to every connected client under a single
//! mutex; best-effort, no per-client queueing or retransmission. A client
//! whose write fails is dropped on the spot — it resumes on the next
//! keyframe if it reconnects.

#![warn(missing_docs)]

use std::{
    io,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex,
    },
};

/// The write half of one client connection, as seen by the Hub.
///
/// Implemented by the mux for its TLS/WebSocket client handles; kept as
/// a trait here so the Hub doesn't need to know about TLS or framing.
pub trait Writer: Send {
    /// Sends `bytes` as a single binary WebSocket message.
    fn write_binary(&mut self, bytes: &[u8]) -> io::Result<()>;
}

/// Opaque handle identifying a client registered with a [`Hub`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(u64);

struct Entry {
    id: ClientId,
    writer: Box<dyn Writer>,
}

/// An ordered set of clients, FIFO within the set, guarded by one mutex.
#[derive(Default)]
pub struct Hub {
    next_id: AtomicU64,
    clients: Mutex<Vec<Entry>>,
}

impl Hub {
    /// Creates an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new client, returning the id used to remove it later.
    pub fn add(&self, writer: Box<dyn Writer>) -> ClientId {
        let id = ClientId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.clients.lock().unwrap().push(Entry { id, writer });
        id
    }

    /// Removes a client by identity. A no-op if it's already gone (e.g.
    /// a broadcast already evicted it).
    pub fn remove(&self, id: ClientId) {
        self.clients.lock().unwrap().retain(|entry| entry.id != id);
    }

    /// Writes `bytes` as one binary message to every client, dropping
    /// any whose write fails. Logs the eviction count if nonzero.
    pub fn broadcast(&self, bytes: &[u8]) {
        let mut clients = self.clients.lock().unwrap();
        let before = clients.len();
        clients.retain_mut(|entry| entry.writer.write_binary(bytes).is_ok());
        let evicted = before - clients.len();
        if evicted > 0 {
            log::warn!("broadcast: evicted {evicted} client(s) after a write failure");
        }
    }

    /// Current number of registered clients.
    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.lock().unwrap().len()
    }

    /// Whether the hub currently has no clients.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct RecordingWriter {
        received: Arc<Mutex<Vec<u8>>>,
        fails: bool,
    }

    impl Writer for RecordingWriter {
        fn write_binary(&mut self, bytes: &[u8]) -> io::Result<()> {
            if self.fails {
                return Err(io::Error::from(io::ErrorKind::BrokenPipe));
            }
            self.received.lock().unwrap().extend_from_slice(bytes);
            Ok(())
        }
    }

    #[test]
    fn broadcast_delivers_to_every_client() {
        let hub = Hub::new();
        let a = Arc::new(Mutex::new(Vec::new()));
        let b = Arc::new(Mutex::new(Vec::new()));
        hub.add(Box::new(RecordingWriter { received: a.clone(), fails: false }));
        hub.add(Box::new(RecordingWriter { received: b.clone(), fails: false }));

        hub.broadcast(b"frame");

        assert_eq!(*a.lock().unwrap(), b"frame");
        assert_eq!(*b.lock().unwrap(), b"frame");
        assert_eq!(hub.len(), 2);
    }

    #[test]
    fn broadcast_evicts_only_the_failing_client() {
        let hub = Hub::new();
        let a = Arc::new(Mutex::new(Vec::new()));
        let c = Arc::new(Mutex::new(Vec::new()));
        hub.add(Box::new(RecordingWriter { received: a.clone(), fails: false }));
        hub.add(Box::new(RecordingWriter { received: Arc::new(Mutex::new(Vec::new())), fails: true }));
        hub.add(Box::new(RecordingWriter { received: c.clone(), fails: false }));

        hub.broadcast(b"frame");

        assert_eq!(*a.lock().unwrap(), b"frame");
        assert_eq!(*c.lock().unwrap(), b"frame");
        assert_eq!(hub.len(), 2);
    }

    #[test]
    fn remove_is_a_no_op_for_an_already_evicted_client() {
        let hub = Hub::new();
        let id = hub.add(Box::new(RecordingWriter {
            received: Arc::new(Mutex::new(Vec::new())),
            fails: true,
        }));
        hub.broadcast(b"frame");
        assert_eq!(hub.len(), 0);
        hub.remove(id); // must not panic
        assert_eq!(hub.len(), 0);
    }
}
