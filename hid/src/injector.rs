use std::path::Path;

use crate::{
    device::HidDevice,
    message,
    report::{KeyboardState, MouseState},
};

/// Default keyboard/mouse gadget device nodes.
///
/// USB-gadget ConfigFS bring-up and report-descriptor setup happen
/// outside this crate; these are simply the character devices that
/// bring-up step is expected to have created by the time a session
/// starts injecting input.
pub const DEFAULT_KEYBOARD_DEVICE: &str = "/dev/hidg0";
/// See [`DEFAULT_KEYBOARD_DEVICE`].
pub const DEFAULT_MOUSE_DEVICE: &str = "/dev/hidg1";

/// Turns parsed client control messages into HID reports and writes
/// them to the keyboard/mouse gadget devices.
///
/// Owns the keyboard/mouse press-tracking state so repeated
/// `keydown`/`keyup`/`down`/`up` events on one connection accumulate
/// correctly. Simultaneous clients racing on the same `Injector` is
/// accepted behavior: last write wins on the HID report.
pub struct Injector {
    keyboard_device: HidDevice,
    mouse_device: HidDevice,
    keyboard_state: KeyboardState,
    mouse_state: MouseState,
}

impl Injector {
    /// Opens the keyboard and mouse gadget devices at the given paths.
    pub fn open(keyboard: &Path, mouse: &Path) -> std::io::Result<Self> {
        Ok(Self {
            keyboard_device: HidDevice::open(keyboard)?,
            mouse_device: HidDevice::open(mouse)?,
            keyboard_state: KeyboardState::new(),
            mouse_state: MouseState::new(),
        })
    }

    /// Parses one text WebSocket message and writes the resulting HID
    /// report. An unrecognized `type` is logged and ignored, matching
    /// the wire protocol's forward-compatibility rule.
    pub fn handle_message(&mut self, text: &str) {
        let event = match message::parse(text) {
            Ok(event) => event,
            Err(message::ParseError::UnknownType(message::UnknownType(type_name))) => {
                log::debug!("ignoring control message of unknown type {type_name:?}");
                return;
            }
            Err(err) => {
                log::warn!("malformed control message: {err}");
                return;
            }
        };

        let Some(report) =
            crate::report::to_report(&event, &mut self.keyboard_state, &mut self.mouse_state)
        else {
            log::debug!("dropping keyboard event with no HID mapping");
            return;
        };

        let device = match &event {
            message::Event::Keyboard { .. } => &mut self.keyboard_device,
            message::Event::Mouse { .. } => &mut self.mouse_device,
        };
        if let Err(err) = device.write_report(&report) {
            log::warn!("failed to write HID report: {err}");
        }
    }
}
