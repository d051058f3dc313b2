//! Gamepad HID reports in, MIDI out.
//!
//! Raw reports are decoded into a [`pad::ControllerState`], diffed against
//! the previous state, and every button edge that has a [`mapping::Mapping`]
//! becomes one [`translate::MidiMessage`]. [`dispatch::Dispatcher`] ties the
//! stages together; device I/O and MIDI ports sit behind
//! [`pad::spawn_reader`] and [`midi_out::MidiSink`].

pub mod config;
pub mod dispatch;
pub mod mapping;
pub mod midi_out;
pub mod pad;
pub mod snapshot;
pub mod translate;
