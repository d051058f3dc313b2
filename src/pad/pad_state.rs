use serde::{Deserialize, Serialize};

/// Number of digital controls carried in every [`ControllerState`].
pub const BUTTON_COUNT: usize = 17;
/// Number of stick axes (LX, LY, RX, RY).
pub const AXIS_COUNT: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ButtonId {
    A,
    B,
    X,
    Y,
    Lb,
    Rb,
    LtDigital,
    RtDigital,
    View,
    Menu,
    LeftStick,
    RightStick,
    DpadUp,
    DpadDown,
    DpadLeft,
    DpadRight,
    Guide,
}

impl ButtonId {
    /// Every control in state order. `ALL[i].index() == i`.
    pub const ALL: [ButtonId; BUTTON_COUNT] = [
        ButtonId::A,
        ButtonId::B,
        ButtonId::X,
        ButtonId::Y,
        ButtonId::Lb,
        ButtonId::Rb,
        ButtonId::LtDigital,
        ButtonId::RtDigital,
        ButtonId::View,
        ButtonId::Menu,
        ButtonId::LeftStick,
        ButtonId::RightStick,
        ButtonId::DpadUp,
        ButtonId::DpadDown,
        ButtonId::DpadLeft,
        ButtonId::DpadRight,
        ButtonId::Guide,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Display name shown to users.
    pub fn label(self) -> &'static str {
        match self {
            ButtonId::A => "A",
            ButtonId::B => "B",
            ButtonId::X => "X",
            ButtonId::Y => "Y",
            ButtonId::Lb => "LB",
            ButtonId::Rb => "RB",
            ButtonId::LtDigital => "LT (Digital)",
            ButtonId::RtDigital => "RT (Digital)",
            ButtonId::View => "View",
            ButtonId::Menu => "Menu",
            ButtonId::LeftStick => "L-Stick Click",
            ButtonId::RightStick => "R-Stick Click",
            ButtonId::DpadUp => "D-Pad Up",
            ButtonId::DpadDown => "D-Pad Down",
            ButtonId::DpadLeft => "D-Pad Left",
            ButtonId::DpadRight => "D-Pad Right",
            ButtonId::Guide => "Guide",
        }
    }
}

/// Snapshot of every control on the pad at one instant.
///
/// `button_values` mirrors `buttons` as 0.0/1.0 except for the two triggers,
/// which carry the normalised pull. `axes` stays all zero unless analog
/// decoding is enabled.
#[derive(Clone, Debug, PartialEq)]
pub struct ControllerState {
    pub buttons: [bool; BUTTON_COUNT],
    pub button_values: [f32; BUTTON_COUNT],
    pub axes: [f32; AXIS_COUNT],
    pub connected: bool,
}

impl Default for ControllerState {
    fn default() -> Self {
        Self::disconnected()
    }
}

impl ControllerState {
    /// All-released state with no device attached. Used as the diff baseline
    /// whenever the pad goes away.
    pub fn disconnected() -> Self {
        Self {
            buttons: [false; BUTTON_COUNT],
            button_values: [0.0; BUTTON_COUNT],
            axes: [0.0; AXIS_COUNT],
            connected: false,
        }
    }

    pub fn pressed(&self, id: ButtonId) -> bool {
        self.buttons[id.index()]
    }

    /// Set a digital control and keep its magnitude in sync.
    pub fn set_button(&mut self, id: ButtonId, pressed: bool) {
        self.buttons[id.index()] = pressed;
        self.button_values[id.index()] = if pressed { 1.0 } else { 0.0 };
    }

    pub fn pressed_buttons(&self) -> impl Iterator<Item = ButtonId> + '_ {
        ButtonId::ALL
            .into_iter()
            .filter(move |id| self.buttons[id.index()])
    }
}

/// A button changed between two consecutive states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputEdge {
    pub input_index: u8,
    pub pressed: bool,
}

/// An axis moved far enough to change its 7-bit MIDI value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisMotion {
    pub axis_index: u8,
    pub value: u8,
}

/// Button edges from `prev` to `curr`, in ascending index order.
pub fn diff(prev: &ControllerState, curr: &ControllerState) -> Vec<InputEdge> {
    prev.buttons
        .iter()
        .zip(curr.buttons.iter())
        .enumerate()
        .filter(|(_, (old, new))| old != new)
        .map(|(index, (_, &new))| InputEdge {
            input_index: index as u8,
            pressed: new,
        })
        .collect()
}

/// Axes whose quantised value differs between `prev` and `curr`, in
/// ascending axis order.
pub fn diff_axes(prev: &ControllerState, curr: &ControllerState) -> Vec<AxisMotion> {
    let mut motions = Vec::new();
    for index in 0..AXIS_COUNT {
        let old = axis_to_midi(prev.axes[index]);
        let new = axis_to_midi(curr.axes[index]);
        if old != new {
            motions.push(AxisMotion {
                axis_index: index as u8,
                value: new,
            });
        }
    }
    motions
}

/// Map a centred axis in [-1, 1] onto 0..=127.
pub fn axis_to_midi(value: f32) -> u8 {
    let unit = (value.clamp(-1.0, 1.0) + 1.0) / 2.0;
    (unit * 127.0).round() as u8
}
