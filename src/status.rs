//! Seam for the on-device status display.
//!
//! EDID injection, signal probing, and physical display hardware are
//! external collaborators; this crate only needs a handle it can power
//! down from the shutdown hook.

/// Something the shutdown hook can tell to power itself off.
pub trait StatusDisplay: Send {
    /// Powers down the display. Called once, from the shutdown hook.
    fn shutdown(&mut self);
}

/// Used when `--no-epaper` is passed: nothing to power down.
pub struct Noop;

impl StatusDisplay for Noop {
    fn shutdown(&mut self) {}
}
