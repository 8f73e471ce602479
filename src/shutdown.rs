//! Signal-driven shutdown: registers a handler that flips a shared flag
//! and wakes every long-lived thread, then runs teardown once all of
//! them have observed it.

use std::sync::{atomic::AtomicBool, Arc};

use signal_hook::{consts::{SIGINT, SIGTERM}, flag};

use crate::status::StatusDisplay;

/// Explicit construction of the object the signal handler captures by
/// reference, rather than routing through ambient global state: the
/// handler only ever touches `self.flag`, and every other teardown step
/// runs from the main thread once it observes the flag set.
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
    display: Box<dyn StatusDisplay>,
}

impl ShutdownHandle {
    /// Registers `SIGINT`/`SIGTERM` handlers that set a shared flag, and
    /// returns the handle used to check it and to run teardown.
    pub fn install(display: Box<dyn StatusDisplay>) -> std::io::Result<Self> {
        let flag = Arc::new(AtomicBool::new(false));
        flag::register(SIGINT, Arc::clone(&flag))?;
        flag::register(SIGTERM, Arc::clone(&flag))?;
        Ok(Self { flag, display })
    }

    /// The flag every long-lived thread polls to know when to stop.
    #[must_use]
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }

    /// Runs idempotent teardown: powers down the status display. HID
    /// devices and the USB gadget are closed by dropping the video
    /// pump's resources before this is called.
    pub fn teardown(&mut self) {
        self.display.shutdown();
    }
}
