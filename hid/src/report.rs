use crate::message::{Event, KeyEvent, Modifiers, MouseEvent};
use crate::scancode::dom_code_to_hid;

const MODIFIER_CTRL: u8 = 0x01;
const MODIFIER_SHIFT: u8 = 0x02;
const MODIFIER_ALT: u8 = 0x04;
const MODIFIER_META: u8 = 0x08;

/// Up to 6 simultaneously held non-modifier keys, tracked so a keyup
/// removes exactly the key that was released without disturbing the
/// others' report slots.
#[derive(Debug, Default)]
pub struct KeyboardState {
    held: Vec<u8>,
}

impl KeyboardState {
    /// Creates an empty (no keys held) state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a keyboard event, returning the resulting 8-byte HID
    /// report: `[modifiers, 0, key0..key5]`.
    ///
    /// An unrecognized `code` updates the modifier byte but leaves the
    /// key slots untouched, since there's no HID usage ID to place.
    pub fn apply(&mut self, press: KeyEvent, code: &str, modifiers: &Modifiers) -> [u8; 8] {
        if let Some(usage) = dom_code_to_hid(code) {
            match press {
                KeyEvent::Keydown => {
                    if !self.held.contains(&usage) && self.held.len() < 6 {
                        self.held.push(usage);
                    }
                }
                KeyEvent::Keyup => self.held.retain(|&k| k != usage),
            }
        }
        self.to_report(modifiers)
    }

    fn to_report(&self, modifiers: &Modifiers) -> [u8; 8] {
        let mut report = [0u8; 8];
        report[0] = modifier_byte(modifiers);
        for (slot, usage) in report[2..8].iter_mut().zip(self.held.iter()) {
            *slot = *usage;
        }
        report
    }
}

fn modifier_byte(modifiers: &Modifiers) -> u8 {
    let mut byte = 0;
    if modifiers.ctrl {
        byte |= MODIFIER_CTRL;
    }
    if modifiers.shift {
        byte |= MODIFIER_SHIFT;
    }
    if modifiers.alt {
        byte |= MODIFIER_ALT;
    }
    if modifiers.meta {
        byte |= MODIFIER_META;
    }
    byte
}

/// Buttons currently held, tracked so a drag (`Down` followed by a
/// stream of `Move`s) keeps reporting the button down on every report
/// instead of only on the `Down` event itself.
#[derive(Debug, Default)]
pub struct MouseState {
    held: u8,
}

impl MouseState {
    /// Creates an empty (no buttons held) state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a mouse event, returning the resulting 6-byte HID
    /// report: `[buttons, x_lo, x_hi, y_lo, y_hi, wheel]`, x/y absolute
    /// little-endian, wheel clamped to `i8` range.
    pub fn apply(&mut self, event: MouseEvent, x: u16, y: u16, button: u8, delta: i32) -> [u8; 6] {
        let bit = 1u8 << button.min(2);
        match event {
            MouseEvent::Down => self.held |= bit,
            MouseEvent::Up => self.held &= !bit,
            MouseEvent::Move | MouseEvent::Wheel => {}
        }
        let wheel = match event {
            MouseEvent::Wheel => delta.clamp(i32::from(i8::MIN), i32::from(i8::MAX)) as i8,
            _ => 0,
        };
        let [x_lo, x_hi] = x.to_le_bytes();
        let [y_lo, y_hi] = y.to_le_bytes();
        [self.held, x_lo, x_hi, y_lo, y_hi, wheel as u8]
    }
}

/// Converts one already-parsed event into its HID report bytes,
/// carrying forward `keyboard`/`mouse` state for press-tracking across
/// calls.
///
/// Returns `None` for a keyboard event whose `code` has no HID mapping.
pub fn to_report(event: &Event, keyboard: &mut KeyboardState, mouse: &mut MouseState) -> Option<Vec<u8>> {
    match event {
        Event::Keyboard { event, code, modifiers } => {
            Some(keyboard.apply(*event, code, modifiers).to_vec())
        }
        Event::Mouse { event, x, y, button, delta } => {
            Some(mouse.apply(*event, *x, *y, *button, *delta).to_vec())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keydown_with_shift_produces_the_documented_report() {
        let mut keyboard = KeyboardState::new();
        let report = keyboard.apply(KeyEvent::Keydown, "KeyA", &Modifiers { shift: true, ..Default::default() });
        assert_eq!(report[0], 0x02);
        assert_eq!(report[2], 0x04);
        assert_eq!(&report[1..2], &[0]);
        assert_eq!(&report[3..8], &[0, 0, 0, 0, 0]);
    }

    #[test]
    fn keyup_removes_only_the_released_key() {
        let mut keyboard = KeyboardState::new();
        keyboard.apply(KeyEvent::Keydown, "KeyA", &Modifiers::default());
        let report = keyboard.apply(KeyEvent::Keydown, "KeyB", &Modifiers::default());
        assert_eq!(&report[2..4], &[0x04, 0x05]);

        let report = keyboard.apply(KeyEvent::Keyup, "KeyA", &Modifiers::default());
        assert_eq!(&report[2..4], &[0x05, 0x00]);
    }

    #[test]
    fn seventh_simultaneous_key_is_dropped() {
        let mut keyboard = KeyboardState::new();
        for code in ["KeyA", "KeyB", "KeyC", "KeyD", "KeyE", "KeyF", "KeyG"] {
            keyboard.apply(KeyEvent::Keydown, code, &Modifiers::default());
        }
        let report = keyboard.to_report(&Modifiers::default());
        assert_eq!(&report[2..8], &[0x04, 0x05, 0x06, 0x07, 0x08, 0x09]);
    }

    #[test]
    fn mouse_down_sets_the_button_bit() {
        let mut mouse = MouseState::new();
        let report = mouse.apply(MouseEvent::Down, 100, 200, 2, 0);
        assert_eq!(report[0], 0b100);
        assert_eq!(&report[1..3], &100u16.to_le_bytes());
        assert_eq!(&report[3..5], &200u16.to_le_bytes());
    }

    #[test]
    fn button_stays_down_across_a_drag() {
        let mut mouse = MouseState::new();
        mouse.apply(MouseEvent::Down, 0, 0, 0, 0);
        let report = mouse.apply(MouseEvent::Move, 50, 60, 0, 0);
        assert_eq!(report[0], 0b001);
        assert_eq!(&report[1..3], &50u16.to_le_bytes());
        assert_eq!(&report[3..5], &60u16.to_le_bytes());

        let report = mouse.apply(MouseEvent::Up, 50, 60, 0, 0);
        assert_eq!(report[0], 0);
    }

    #[test]
    fn wheel_delta_is_clamped_to_i8() {
        let mut mouse = MouseState::new();
        let report = mouse.apply(MouseEvent::Wheel, 0, 0, 0, 1000);
        assert_eq!(report[5] as i8, i8::MAX);
        let report = mouse.apply(MouseEvent::Wheel, 0, 0, 0, -1000);
        assert_eq!(report[5] as i8, i8::MIN);
    }
}
