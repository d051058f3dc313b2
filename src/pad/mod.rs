mod axes;
mod pad_device;
mod pad_state;
mod protocol;

pub use axes::{apply_deadzone, smooth, AxisFilter};
pub use pad_device::{
    is_pad_interface, matching_devices, spawn_reader, DeviceError, DeviceEvent, PadDevice,
};
pub use pad_state::{
    axis_to_midi, diff, diff_axes, AxisMotion, ButtonId, ControllerState, InputEdge, AXIS_COUNT,
    BUTTON_COUNT,
};
pub use protocol::{
    decode, DecodeError, DecodePolicy, Decoder, DpadEncoding, Protocol, ReportLayout,
    MIN_REPORT_LEN, PROTOCOL_TABLE_VERSION, TRIGGER_THRESHOLD, WIRED_MIN_LEN,
};
