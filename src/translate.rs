use std::fmt;

use crate::{
    mapping::{InputKind, Mapping, MappingTable, MidiKind},
    pad::{AxisMotion, InputEdge},
};

const NOTE_OFF: u8 = 0x80;
const NOTE_ON: u8 = 0x90;
const CONTROL_CHANGE: u8 = 0xB0;
const VELOCITY: u8 = 127;
const CC_ON: u8 = 127;
const CC_OFF: u8 = 0;

/// A three-byte channel voice message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MidiMessage {
    pub status: u8,
    pub data1: u8,
    pub data2: u8,
}

impl MidiMessage {
    pub fn new(status: u8, data1: u8, data2: u8) -> Self {
        Self {
            status,
            data1,
            data2,
        }
    }

    pub fn as_bytes(&self) -> [u8; 3] {
        [self.status, self.data1, self.data2]
    }
}

impl fmt::Display for MidiMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:X}, {}, {}]", self.status, self.data1, self.data2)
    }
}

/// Status byte for `base` on a 1-based channel.
fn status(base: u8, channel: u8) -> u8 {
    base | (channel.wrapping_sub(1) & 0x0F)
}

/// Translate a button edge through `mapping`.
///
/// Note mappings send Note On (velocity 127) on press and Note Off
/// (velocity 127) on release. CC mappings send 127 on press and 0 on
/// release. Returns `None` if `mapping` is not a button mapping for the
/// edge's index.
pub fn translate(edge: &InputEdge, mapping: &Mapping) -> Option<MidiMessage> {
    if !mapping.matches(edge.input_index, InputKind::Button) {
        return None;
    }
    let message = match (mapping.midi_kind, edge.pressed) {
        (MidiKind::NoteOn, true) => {
            MidiMessage::new(status(NOTE_ON, mapping.channel), mapping.target_number, VELOCITY)
        }
        (MidiKind::NoteOn, false) => {
            MidiMessage::new(status(NOTE_OFF, mapping.channel), mapping.target_number, VELOCITY)
        }
        (MidiKind::ControlChange, pressed) => MidiMessage::new(
            status(CONTROL_CHANGE, mapping.channel),
            mapping.target_number,
            if pressed { CC_ON } else { CC_OFF },
        ),
    };
    Some(message)
}

/// Translate an axis motion through a CC `mapping`.
pub fn translate_axis(motion: &AxisMotion, mapping: &Mapping) -> Option<MidiMessage> {
    if !mapping.matches(motion.axis_index, InputKind::Axis)
        || mapping.midi_kind != MidiKind::ControlChange
    {
        return None;
    }
    Some(MidiMessage::new(
        status(CONTROL_CHANGE, mapping.channel),
        mapping.target_number,
        motion.value.min(127),
    ))
}

/// Look the edge up in `table` and translate it. Unmapped edges yield `None`.
pub fn translate_edge(edge: &InputEdge, table: &MappingTable) -> Option<MidiMessage> {
    table
        .find(edge.input_index, InputKind::Button)
        .and_then(|mapping| translate(edge, mapping))
}

/// Messages for a frame's edges, preserving edge order.
pub fn translate_edges(edges: &[InputEdge], table: &MappingTable) -> Vec<MidiMessage> {
    edges
        .iter()
        .filter_map(|edge| translate_edge(edge, table))
        .collect()
}

/// Messages for a frame's axis motions, preserving axis order.
pub fn translate_motions(motions: &[AxisMotion], table: &MappingTable) -> Vec<MidiMessage> {
    motions
        .iter()
        .filter_map(|motion| {
            table
                .find(motion.axis_index, InputKind::Axis)
                .and_then(|mapping| translate_axis(motion, mapping))
        })
        .collect()
}
