use midir::{MidiOutput, MidiOutputConnection, MidiOutputPort};
use thiserror::Error;

use crate::translate::MidiMessage;

const CLIENT_NAME: &str = "pad-midi-bridge";
const CONNECTION_NAME: &str = "pad-midi-bridge-out";

/// Why a message could not be delivered. Never fatal to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("no MIDI output selected")]
    NoOutput,
    #[error("MIDI output \"{0}\" not found")]
    OutputNotFound(String),
    #[error("MIDI transport error: {0}")]
    Transport(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MidiInitError {
    #[error("failed to initialise MIDI output: {0}")]
    Init(String),
    #[error("failed to open MIDI connection: {0}")]
    Connection(String),
}

/// Somewhere to deliver outbound MIDI.
pub trait MidiSink {
    fn send_midi(&mut self, message: MidiMessage) -> Result<(), SendError>;
}

impl<S: MidiSink + ?Sized> MidiSink for Box<S> {
    fn send_midi(&mut self, message: MidiMessage) -> Result<(), SendError> {
        (**self).send_midi(message)
    }
}

enum Selection {
    None,
    Missing(String),
    Connected {
        connection: MidiOutputConnection,
        port_name: String,
    },
}

/// A midir output port chosen by name.
pub struct MidiOut {
    selection: Selection,
}

impl MidiOut {
    /// Start with no output selected.
    pub fn new() -> Self {
        Self {
            selection: Selection::None,
        }
    }

    /// Names of all MIDI outputs currently visible.
    pub fn ports() -> Result<Vec<String>, MidiInitError> {
        let midi_out =
            MidiOutput::new(CLIENT_NAME).map_err(|err| MidiInitError::Init(err.to_string()))?;
        Ok(midi_out
            .ports()
            .iter()
            .filter_map(|port| midi_out.port_name(port).ok())
            .collect())
    }

    /// Connect to the first available output, if there is one. Used once at
    /// startup when no output is configured.
    pub fn select_default(&mut self) -> Result<Option<&str>, MidiInitError> {
        self.selection = Selection::None;
        let midi_out =
            MidiOutput::new(CLIENT_NAME).map_err(|err| MidiInitError::Init(err.to_string()))?;
        let first = midi_out.ports().first().cloned();
        match first {
            Some(port) => self.connect(midi_out, &port),
            None => Ok(None),
        }
    }

    /// Select an output by case-insensitive name substring.
    ///
    /// An empty hint deselects: later sends report [`SendError::NoOutput`].
    /// If the hint matches nothing, later sends report
    /// [`SendError::OutputNotFound`]. Returns the name of the connected port,
    /// if any.
    pub fn select(&mut self, port_hint: &str) -> Result<Option<&str>, MidiInitError> {
        // Dropping the old connection closes it.
        self.selection = Selection::None;

        let hint = port_hint.trim();
        if hint.is_empty() {
            return Ok(None);
        }

        let midi_out =
            MidiOutput::new(CLIENT_NAME).map_err(|err| MidiInitError::Init(err.to_string()))?;
        let needle = hint.to_lowercase();
        let found = midi_out
            .ports()
            .into_iter()
            .find(|port| {
                midi_out
                    .port_name(port)
                    .map(|name| name.to_lowercase().contains(&needle))
                    .unwrap_or(false)
            });

        match found {
            Some(port) => self.connect(midi_out, &port),
            None => {
                self.selection = Selection::Missing(hint.to_string());
                Ok(None)
            }
        }
    }

    fn connect(
        &mut self,
        midi_out: MidiOutput,
        port: &MidiOutputPort,
    ) -> Result<Option<&str>, MidiInitError> {
        let port_name = midi_out
            .port_name(port)
            .unwrap_or_else(|_| "<unknown>".into());

        let connection = midi_out
            .connect(port, CONNECTION_NAME)
            .map_err(|err| MidiInitError::Connection(err.to_string()))?;

        self.selection = Selection::Connected {
            connection,
            port_name,
        };
        Ok(self.port_name())
    }

    pub fn port_name(&self) -> Option<&str> {
        match &self.selection {
            Selection::Connected { port_name, .. } => Some(port_name),
            _ => None,
        }
    }
}

impl Default for MidiOut {
    fn default() -> Self {
        Self::new()
    }
}

impl MidiSink for MidiOut {
    fn send_midi(&mut self, message: MidiMessage) -> Result<(), SendError> {
        match &mut self.selection {
            Selection::None => Err(SendError::NoOutput),
            Selection::Missing(name) => Err(SendError::OutputNotFound(name.clone())),
            Selection::Connected { connection, .. } => connection
                .send(&message.as_bytes())
                .map_err(|err| SendError::Transport(err.to_string())),
        }
    }
}
