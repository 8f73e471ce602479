use serde::Deserialize;

/// One client input event, as received over the WebSocket control channel.
///
/// Deserialized with serde's default tolerant behavior: unknown fields
/// are ignored and an unrecognized `type` fails deserialization of this
/// enum but is handled by the caller rather than treated as a hard error
/// (see [`parse`]).
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Event {
    /// A keyboard key transition.
    Keyboard {
        /// `"keydown"` or `"keyup"`.
        event: KeyEvent,
        /// DOM `code` value, e.g. `"KeyA"`.
        code: String,
        /// Modifier keys held during this event.
        modifiers: Modifiers,
    },
    /// A mouse transition.
    Mouse {
        /// `"move"`, `"down"`, `"up"`, or `"wheel"`.
        event: MouseEvent,
        /// Absolute X position, 0..=32767.
        x: u16,
        /// Absolute Y position, 0..=32767.
        y: u16,
        /// 0 = left, 1 = middle, 2 = right.
        button: u8,
        /// Wheel delta; clamped to i8 range when turned into a report.
        delta: i32,
    },
}

/// Keyboard event kind.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum KeyEvent {
    /// Key pressed.
    Keydown,
    /// Key released.
    Keyup,
}

/// Mouse event kind.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MouseEvent {
    /// Pointer moved without a button state change.
    Move,
    /// Button pressed.
    Down,
    /// Button released.
    Up,
    /// Scroll wheel turned.
    Wheel,
}

/// Modifier key state accompanying a keyboard event.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
pub struct Modifiers {
    #[serde(default)]
    pub ctrl: bool,
    #[serde(default)]
    pub alt: bool,
    #[serde(default)]
    pub shift: bool,
    #[serde(default)]
    pub meta: bool,
}

/// A message whose `type` field isn't one this injector understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownType(pub String);

/// Parses one client control message.
///
/// An unrecognized `type` is reported as [`UnknownType`] rather than a
/// generic deserialization error, so the caller can log and ignore it
/// per the wire protocol's forward-compatibility rule instead of
/// treating it as malformed input.
pub fn parse(text: &str) -> Result<Event, ParseError> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    if let Some(type_name) = value.get("type").and_then(serde_json::Value::as_str) {
        if type_name != "keyboard" && type_name != "mouse" {
            return Err(ParseError::UnknownType(UnknownType(type_name.to_string())));
        }
    }
    Ok(serde_json::from_value(value)?)
}

/// Errors from [`parse`].
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// The message wasn't valid JSON, or was missing required fields
    /// for its `type`.
    #[error("malformed control message: {0}")]
    Malformed(#[from] serde_json::Error),
    /// The message's `type` field named something other than
    /// `"keyboard"` or `"mouse"`.
    #[error("unknown message type {0:?}")]
    UnknownType(UnknownType),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_keydown_with_a_modifier() {
        let event =
            parse(r#"{"type":"keyboard","event":"keydown","key":"a","code":"KeyA","modifiers":{"shift":true}}"#)
                .unwrap();
        assert_eq!(
            event,
            Event::Keyboard {
                event: KeyEvent::Keydown,
                code: "KeyA".to_string(),
                modifiers: Modifiers { shift: true, ..Default::default() },
            }
        );
    }

    #[test]
    fn ignores_unknown_fields() {
        let event = parse(
            r#"{"type":"mouse","event":"move","x":100,"y":200,"button":0,"delta":0,"bogus":"field"}"#,
        )
        .unwrap();
        assert_eq!(event, Event::Mouse { event: MouseEvent::Move, x: 100, y: 200, button: 0, delta: 0 });
    }

    #[test]
    fn reports_an_unknown_type_distinctly_from_malformed_json() {
        let err = parse(r#"{"type":"gamepad","event":"down"}"#).unwrap_err();
        assert!(matches!(err, ParseError::UnknownType(UnknownType(ref name)) if name == "gamepad"));
    }

    #[test]
    fn rejects_invalid_json_as_malformed() {
        let err = parse("not json").unwrap_err();
        assert!(matches!(err, ParseError::Malformed(_)));
    }
}
