//! Report decoding for Xbox-style pads.
//!
//! The same pad produces differently shaped reports depending on the link
//! and on the host driver. Three layouts are recognised, purely from the
//! report length and its leading byte:
//!
//! | protocol            | detected when                        | base |
//! |---------------------|--------------------------------------|------|
//! | USB wired           | `buf[0] == 0x00` and `len >= 14`     | 0    |
//! | Bluetooth standard  | `buf[0] == 0x01`                     | 1    |
//! | Bluetooth stripped  | anything else (permissive policy)    | 0    |
//!
//! Every offset in the tables below is relative to `base`. Bytes that lie
//! past the end of the report read as absent: bits clear, triggers at rest,
//! hat centred.

use std::fmt;

use thiserror::Error;

use super::pad_state::{ButtonId, ControllerState, AXIS_COUNT};

/// Bumped whenever an offset or mask in the layout tables changes.
pub const PROTOCOL_TABLE_VERSION: u32 = 2;

/// Reports shorter than this are never decoded.
pub const MIN_REPORT_LEN: usize = 10;

/// Wired reports must be at least this long to be treated as wired.
pub const WIRED_MIN_LEN: usize = 14;

/// Triggers above this normalised pull count as pressed.
pub const TRIGGER_THRESHOLD: f32 = 0.5;

/// Hat values above this are "centred".
const HAT_MAX_DIRECTION: u8 = 7;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("report too short: {len} bytes")]
    TooShort { len: usize },
    #[error("unrecognised report protocol (leading byte 0x{leading:02x})")]
    AmbiguousProtocol { leading: u8 },
}

/// How to treat a leading byte that matches no known protocol.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DecodePolicy {
    /// Fall back to the stripped Bluetooth layout.
    #[default]
    Permissive,
    /// Reject the report with [`DecodeError::AmbiguousProtocol`].
    Strict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    UsbWired,
    BluetoothStandard,
    BluetoothStripped,
}

impl Protocol {
    /// Classify a report. Returns `None` only when nothing matched; the caller
    /// decides whether that means "stripped" or "reject".
    fn classify(buf: &[u8]) -> Option<Self> {
        match buf.first() {
            Some(0x00) if buf.len() >= WIRED_MIN_LEN => Some(Protocol::UsbWired),
            Some(0x01) => Some(Protocol::BluetoothStandard),
            _ => None,
        }
    }

    pub fn detect(buf: &[u8], policy: DecodePolicy) -> Result<Self, DecodeError> {
        if buf.len() < MIN_REPORT_LEN {
            return Err(DecodeError::TooShort { len: buf.len() });
        }
        match (Self::classify(buf), policy) {
            (Some(protocol), _) => Ok(protocol),
            (None, DecodePolicy::Permissive) => Ok(Protocol::BluetoothStripped),
            (None, DecodePolicy::Strict) => Err(DecodeError::AmbiguousProtocol { leading: buf[0] }),
        }
    }

    pub fn layout(self) -> &'static ReportLayout {
        match self {
            Protocol::UsbWired => &USB_WIRED,
            Protocol::BluetoothStandard => &BLUETOOTH_STANDARD,
            Protocol::BluetoothStripped => &BLUETOOTH_STRIPPED,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::UsbWired => write!(f, "USB wired"),
            Protocol::BluetoothStandard => write!(f, "Bluetooth"),
            Protocol::BluetoothStripped => write!(f, "Bluetooth (stripped)"),
        }
    }
}

/// Where the D-pad lives in a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DpadEncoding {
    /// Four independent bits, listed in the button table.
    Bits,
    /// Low nibble of the byte at this offset: 0 = N, clockwise to 7 = NW.
    Hat { offset: usize },
}

/// One protocol's byte map.
#[derive(Debug)]
pub struct ReportLayout {
    pub protocol: Protocol,
    pub base: usize,
    /// `(control, byte offset, mask)`; triggers are not listed here.
    pub buttons: &'static [(ButtonId, usize, u8)],
    pub dpad: DpadEncoding,
    pub left_trigger: usize,
    pub right_trigger: usize,
    /// First of four consecutive little-endian i16 axes (LX, LY, RX, RY).
    pub sticks: usize,
}

const WIRED_BUTTONS: [(ButtonId, usize, u8); 15] = [
    (ButtonId::DpadUp, 2, 0x01),
    (ButtonId::DpadDown, 2, 0x02),
    (ButtonId::DpadLeft, 2, 0x04),
    (ButtonId::DpadRight, 2, 0x08),
    (ButtonId::Menu, 2, 0x10),
    (ButtonId::View, 2, 0x20),
    (ButtonId::LeftStick, 2, 0x40),
    (ButtonId::RightStick, 2, 0x80),
    (ButtonId::Lb, 3, 0x01),
    (ButtonId::Rb, 3, 0x02),
    (ButtonId::Guide, 3, 0x04),
    (ButtonId::A, 3, 0x10),
    (ButtonId::B, 3, 0x20),
    (ButtonId::X, 3, 0x40),
    (ButtonId::Y, 3, 0x80),
];

const BLUETOOTH_BUTTONS: [(ButtonId, usize, u8); 11] = [
    (ButtonId::Lb, 10, 0x01),
    (ButtonId::Rb, 10, 0x02),
    (ButtonId::View, 10, 0x04),
    (ButtonId::Menu, 10, 0x08),
    (ButtonId::A, 10, 0x10),
    (ButtonId::B, 10, 0x20),
    (ButtonId::X, 10, 0x40),
    (ButtonId::Y, 10, 0x80),
    (ButtonId::LeftStick, 11, 0x10),
    (ButtonId::RightStick, 11, 0x20),
    (ButtonId::Guide, 11, 0x40),
];

static USB_WIRED: ReportLayout = ReportLayout {
    protocol: Protocol::UsbWired,
    base: 0,
    buttons: &WIRED_BUTTONS,
    dpad: DpadEncoding::Bits,
    left_trigger: 4,
    right_trigger: 5,
    sticks: 6,
};

static BLUETOOTH_STANDARD: ReportLayout = ReportLayout {
    protocol: Protocol::BluetoothStandard,
    base: 1,
    buttons: &BLUETOOTH_BUTTONS,
    dpad: DpadEncoding::Hat { offset: 11 },
    left_trigger: 8,
    right_trigger: 9,
    sticks: 0,
};

static BLUETOOTH_STRIPPED: ReportLayout = ReportLayout {
    protocol: Protocol::BluetoothStripped,
    base: 0,
    buttons: &BLUETOOTH_BUTTONS,
    dpad: DpadEncoding::Hat { offset: 11 },
    left_trigger: 8,
    right_trigger: 9,
    sticks: 0,
};

/// Decode one raw report with the permissive policy and no axes.
pub fn decode(buf: &[u8]) -> Result<ControllerState, DecodeError> {
    Decoder::default().decode(buf)
}

/// Report decoder. Stateless; the options only pick the policy and whether
/// stick axes are extracted.
#[derive(Debug, Clone, Copy, Default)]
pub struct Decoder {
    pub policy: DecodePolicy,
    pub analog: bool,
}

impl Decoder {
    pub fn new(policy: DecodePolicy, analog: bool) -> Self {
        Self { policy, analog }
    }

    pub fn decode(&self, buf: &[u8]) -> Result<ControllerState, DecodeError> {
        self.decode_report(buf).map(|(_, state)| state)
    }

    /// Decode and also report which layout was used.
    pub fn decode_report(&self, buf: &[u8]) -> Result<(Protocol, ControllerState), DecodeError> {
        let layout = Protocol::detect(buf, self.policy)?.layout();
        Ok((layout.protocol, self.decode_layout(buf, layout)))
    }

    fn decode_layout(&self, buf: &[u8], layout: &ReportLayout) -> ControllerState {
        let byte = |offset: usize| -> Option<u8> { buf.get(layout.base + offset).copied() };

        let bit = |offset: usize, mask: u8| -> bool {
            byte(offset).map(|b| b & mask != 0).unwrap_or(false)
        };

        let mut state = ControllerState::disconnected();
        state.connected = true;

        for &(id, offset, mask) in layout.buttons {
            state.set_button(id, bit(offset, mask));
        }

        if let DpadEncoding::Hat { offset } = layout.dpad {
            let hat = byte(offset).map(|b| b & 0x0F).unwrap_or(0x08);
            let [up, right, down, left] = hat_directions(hat);
            state.set_button(ButtonId::DpadUp, up);
            state.set_button(ButtonId::DpadRight, right);
            state.set_button(ButtonId::DpadDown, down);
            state.set_button(ButtonId::DpadLeft, left);
        }

        for (id, offset) in [
            (ButtonId::LtDigital, layout.left_trigger),
            (ButtonId::RtDigital, layout.right_trigger),
        ] {
            let value = byte(offset).map(|b| b as f32 / 255.0).unwrap_or(0.0);
            state.buttons[id.index()] = value > TRIGGER_THRESHOLD;
            state.button_values[id.index()] = value;
        }

        if self.analog {
            state.axes = read_sticks(buf, layout.base + layout.sticks);
        }

        state
    }
}

/// Expand a hat value into `[up, right, down, left]`.
fn hat_directions(hat: u8) -> [bool; 4] {
    if hat > HAT_MAX_DIRECTION {
        return [false; 4];
    }
    [
        matches!(hat, 7 | 0 | 1),
        matches!(hat, 1..=3),
        matches!(hat, 3..=5),
        matches!(hat, 5..=7),
    ]
}

/// LX, LY, RX, RY as [-1, 1], Y pointing up. Missing bytes read as centred.
fn read_sticks(buf: &[u8], start: usize) -> [f32; AXIS_COUNT] {
    let mut axes = [0.0; AXIS_COUNT];
    for (i, axis) in axes.iter_mut().enumerate() {
        let idx = start + i * 2;
        let raw = match (buf.get(idx), buf.get(idx + 1)) {
            (Some(&lo), Some(&hi)) => i16::from_le_bytes([lo, hi]),
            _ => 0,
        };
        let mut value = raw as f32 / 32768.0;
        if i % 2 == 1 {
            value = -value;
        }
        *axis = value.clamp(-1.0, 1.0);
    }
    axes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bluetooth(len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        buf[0] = 0x01;
        buf
    }

    fn only_pressed(state: &ControllerState) -> Vec<ButtonId> {
        state.pressed_buttons().collect()
    }

    #[test]
    fn short_reports_are_rejected() {
        assert_eq!(decode(&[]), Err(DecodeError::TooShort { len: 0 }));
        assert_eq!(decode(&[0x01; 9]), Err(DecodeError::TooShort { len: 9 }));
        assert!(decode(&[0x01; 10]).is_ok());
    }

    #[test]
    fn bluetooth_a_button() {
        let buf = [
            0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x10,
        ];
        let state = decode(&buf).unwrap();
        assert!(state.connected);
        assert_eq!(only_pressed(&state), vec![ButtonId::A]);
        assert_eq!(state.button_values[0], 1.0);
        assert_eq!(state.axes, [0.0; 4]);
    }

    #[test]
    fn protocol_detection() {
        let mut wired = vec![0u8; 14];
        assert_eq!(
            Protocol::detect(&wired, DecodePolicy::Permissive),
            Ok(Protocol::UsbWired)
        );
        // Too short for the wired layout: falls through to stripped.
        wired.truncate(13);
        assert_eq!(
            Protocol::detect(&wired, DecodePolicy::Permissive),
            Ok(Protocol::BluetoothStripped)
        );
        assert_eq!(
            Protocol::detect(&bluetooth(10), DecodePolicy::Strict),
            Ok(Protocol::BluetoothStandard)
        );
    }

    #[test]
    fn unknown_leading_byte_falls_back_to_stripped_layout() {
        let mut buf = vec![0u8; 12];
        buf[0] = 0x02;
        buf[10] = 0x20; // B at stripped base 0
        buf[11] = 0x08;
        let state = decode(&buf).unwrap();
        assert_eq!(only_pressed(&state), vec![ButtonId::B]);
    }

    #[test]
    fn strict_policy_rejects_unknown_leading_byte() {
        let decoder = Decoder::new(DecodePolicy::Strict, false);
        let mut buf = vec![0u8; 12];
        buf[0] = 0x02;
        assert_eq!(
            decoder.decode(&buf),
            Err(DecodeError::AmbiguousProtocol { leading: 0x02 })
        );
        // A short "wired" frame is also unrecognised under the strict policy.
        assert_eq!(
            decoder.decode(&[0u8; 12]),
            Err(DecodeError::AmbiguousProtocol { leading: 0x00 })
        );
    }

    #[test]
    fn hat_directions_and_centre() {
        let cases: [(u8, &[ButtonId]); 9] = [
            (0, &[ButtonId::DpadUp]),
            (1, &[ButtonId::DpadUp, ButtonId::DpadRight]),
            (2, &[ButtonId::DpadRight]),
            (3, &[ButtonId::DpadDown, ButtonId::DpadRight]),
            (4, &[ButtonId::DpadDown]),
            (5, &[ButtonId::DpadDown, ButtonId::DpadLeft]),
            (6, &[ButtonId::DpadLeft]),
            (7, &[ButtonId::DpadUp, ButtonId::DpadLeft]),
            (8, &[]),
        ];
        for (hat, expected) in cases {
            let mut buf = bluetooth(13);
            buf[12] = hat;
            let state = decode(&buf).unwrap();
            let mut expected = expected.to_vec();
            expected.sort_by_key(|id| id.index());
            assert_eq!(only_pressed(&state), expected, "hat {hat}");
        }
    }

    #[test]
    fn out_of_range_hat_clears_dpad() {
        for hat in 8..=0x0F {
            let mut buf = bluetooth(13);
            buf[12] = hat;
            let state = decode(&buf).unwrap();
            assert!(!state.pressed(ButtonId::DpadUp));
            assert!(!state.pressed(ButtonId::DpadDown));
            assert!(!state.pressed(ButtonId::DpadLeft));
            assert!(!state.pressed(ButtonId::DpadRight));
        }
    }

    #[test]
    fn hat_byte_high_nibble_holds_stick_clicks_and_guide() {
        let mut buf = bluetooth(13);
        buf[12] = 0x70 | 0x08;
        let state = decode(&buf).unwrap();
        assert_eq!(
            only_pressed(&state),
            vec![ButtonId::LeftStick, ButtonId::RightStick, ButtonId::Guide]
        );
    }

    #[test]
    fn trigger_threshold() {
        let mut buf = bluetooth(12);
        buf[9] = 127;
        buf[10] = 130;
        let state = decode(&buf).unwrap();
        assert!(!state.pressed(ButtonId::LtDigital));
        assert!(state.pressed(ButtonId::RtDigital));
        assert!((state.button_values[6] - 127.0 / 255.0).abs() < 1e-6);
        assert!((state.button_values[7] - 130.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn wired_layout() {
        let mut buf = vec![0u8; 20];
        buf[1] = 0x14;
        buf[2] = 0x01 | 0x08 | 0x20; // up, right, view
        buf[3] = 0x04 | 0x80; // guide, Y
        buf[4] = 0xFF;
        buf[5] = 0x10;
        let state = decode(&buf).unwrap();
        assert_eq!(
            only_pressed(&state),
            vec![
                ButtonId::Y,
                ButtonId::LtDigital,
                ButtonId::View,
                ButtonId::DpadUp,
                ButtonId::DpadRight,
                ButtonId::Guide,
            ]
        );
        assert_eq!(state.button_values[6], 1.0);
    }

    #[test]
    fn decoding_is_deterministic() {
        let buf = [0x01, 0x22, 0x80, 0x00, 0x7F, 0x13, 0x00, 0x9A, 0x01, 0xC8, 0x40, 0xF1, 0x03];
        assert_eq!(decode(&buf), decode(&buf));
        let analog = Decoder::new(DecodePolicy::Permissive, true);
        assert_eq!(analog.decode(&buf), analog.decode(&buf));
    }

    #[test]
    fn sticks_only_decoded_when_analog_enabled() {
        let mut buf = bluetooth(13);
        // LX full right, raw LY at its minimum (reported as full up).
        buf[1..3].copy_from_slice(&i16::MAX.to_le_bytes());
        buf[3..5].copy_from_slice(&i16::MIN.to_le_bytes());

        assert_eq!(decode(&buf).unwrap().axes, [0.0; 4]);

        let state = Decoder::new(DecodePolicy::Permissive, true)
            .decode(&buf)
            .unwrap();
        assert!((state.axes[0] - 1.0).abs() < 1e-3);
        assert_eq!(state.axes[1], 1.0);
        assert_eq!(state.axes[2], 0.0);
        assert_eq!(state.axes[3], 0.0);
    }
}
