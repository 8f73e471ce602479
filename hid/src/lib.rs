//! Decodes client keyboard/mouse control messages and turns them into
//! USB HID reports for the attached gadget.
//!
//! JSON parsing is deliberately tolerant: an unrecognized message
//! `type` is reported distinctly so the caller can log and skip it
//! without treating it as malformed input, and fields this crate
//! doesn't model are silently ignored rather than rejected.

#![warn(missing_docs)]

mod device;
mod injector;
mod message;
mod report;
mod scancode;

pub use device::HidDevice;
pub use injector::{Injector, DEFAULT_KEYBOARD_DEVICE, DEFAULT_MOUSE_DEVICE};
pub use message::{parse, Event, KeyEvent, Modifiers, MouseEvent, ParseError, UnknownType};
pub use report::{to_report, KeyboardState, MouseState};
pub use scancode::dom_code_to_hid;
