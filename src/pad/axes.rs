use super::pad_state::AXIS_COUNT;

/// Deadzone and smoothing applied to stick axes when analog input is on.
///
/// The filter keeps the previous smoothed output, so one instance belongs to
/// one device connection. Call [`AxisFilter::reset`] when the pad goes away.
#[derive(Debug, Clone)]
pub struct AxisFilter {
    deadzone: f32,
    smoothing: f32,
    last: [f32; AXIS_COUNT],
}

impl AxisFilter {
    /// * `deadzone` – radius around centre that reads as zero, in [0, 1).
    /// * `smoothing` – weight kept from the previous output, in [0, 1).
    ///   Zero disables smoothing.
    pub fn new(deadzone: f32, smoothing: f32) -> Self {
        Self {
            deadzone: deadzone.clamp(0.0, 0.99),
            smoothing: smoothing.clamp(0.0, 0.99),
            last: [0.0; AXIS_COUNT],
        }
    }

    pub fn apply(&mut self, raw: [f32; AXIS_COUNT]) -> [f32; AXIS_COUNT] {
        let mut out = [0.0; AXIS_COUNT];
        for i in 0..AXIS_COUNT {
            let target = apply_deadzone(raw[i], self.deadzone);
            let value = smooth(self.last[i], target, self.smoothing);
            self.last[i] = value;
            out[i] = value;
        }
        out
    }

    pub fn reset(&mut self) {
        self.last = [0.0; AXIS_COUNT];
    }
}

/// Zero inside the deadzone, rescaled so the output still spans [-1, 1].
pub fn apply_deadzone(value: f32, deadzone: f32) -> f32 {
    let magnitude = value.abs();
    if magnitude < deadzone {
        return 0.0;
    }
    value.signum() * ((magnitude - deadzone) / (1.0 - deadzone)).min(1.0)
}

/// Exponential smoothing towards `current`.
pub fn smooth(previous: f32, current: f32, smoothing: f32) -> f32 {
    previous + (current - previous) * (1.0 - smoothing)
}
