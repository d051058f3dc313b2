//! User-configured input → MIDI rules.
//!
//! A [`MappingTable`] is an ordered list of [`Mapping`]s. Lookups scan in
//! order and the first match wins, so duplicates are allowed and resolved
//! deterministically. Every edit goes through a validating operation; the
//! dispatch path only ever reads an immutable snapshot handed out by
//! [`MappingStore::snapshot`].

use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, PoisonError, RwLock,
    },
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pad::{AXIS_COUNT, BUTTON_COUNT};

pub const MIN_CHANNEL: u8 = 1;
pub const MAX_CHANNEL: u8 = 16;
pub const MAX_DATA: u8 = 127;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("MIDI channel {0} is outside 1-16")]
    ChannelOutOfRange(u8),
    #[error("note/CC number {0} is outside 0-127")]
    TargetOutOfRange(u8),
    #[error("{kind} index {index} does not exist")]
    InputIndexOutOfRange { kind: InputKind, index: u8 },
    #[error("axis inputs can only drive control changes")]
    AxisNeedsControlChange,
    #[error("no mapping with id {0}")]
    UnknownMapping(MappingId),
    #[error("a mapping with id {0} already exists")]
    DuplicateId(MappingId),
    #[error("failed to access {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Opaque, immutable identifier of a mapping.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MappingId(String);

impl MappingId {
    /// A fresh id, unique within this process and very likely across runs.
    pub fn generate() -> Self {
        static SEQ: AtomicU64 = AtomicU64::new(0);
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let seq = SEQ.fetch_add(1, Ordering::Relaxed);
        Self(format!("m{millis:x}-{seq}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for MappingId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for MappingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    #[default]
    Button,
    Axis,
}

impl InputKind {
    fn index_count(self) -> usize {
        match self {
            InputKind::Button => BUTTON_COUNT,
            InputKind::Axis => AXIS_COUNT,
        }
    }
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputKind::Button => write!(f, "button"),
            InputKind::Axis => write!(f, "axis"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MidiKind {
    NoteOn,
    ControlChange,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    pub id: MappingId,
    pub input_index: u8,
    #[serde(default)]
    pub input_kind: InputKind,
    pub midi_kind: MidiKind,
    /// 1-based MIDI channel.
    pub channel: u8,
    /// Note number or CC number.
    pub target_number: u8,
    #[serde(default)]
    pub label: String,
}

impl Mapping {
    /// A button → note mapping with a fresh id.
    pub fn note(input_index: u8, channel: u8, note: u8, label: &str) -> Self {
        Self {
            id: MappingId::generate(),
            input_index,
            input_kind: InputKind::Button,
            midi_kind: MidiKind::NoteOn,
            channel,
            target_number: note,
            label: label.to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_CHANNEL..=MAX_CHANNEL).contains(&self.channel) {
            return Err(ConfigError::ChannelOutOfRange(self.channel));
        }
        if self.target_number > MAX_DATA {
            return Err(ConfigError::TargetOutOfRange(self.target_number));
        }
        if self.input_index as usize >= self.input_kind.index_count() {
            return Err(ConfigError::InputIndexOutOfRange {
                kind: self.input_kind,
                index: self.input_index,
            });
        }
        if self.input_kind == InputKind::Axis && self.midi_kind != MidiKind::ControlChange {
            return Err(ConfigError::AxisNeedsControlChange);
        }
        Ok(())
    }

    pub fn matches(&self, input_index: u8, input_kind: InputKind) -> bool {
        self.input_index == input_index && self.input_kind == input_kind
    }
}

/// A single-field edit. Applied with [`MappingTable::update`], which
/// validates the result before committing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingUpdate {
    InputIndex(u8),
    InputKind(InputKind),
    MidiKind(MidiKind),
    Channel(u8),
    TargetNumber(u8),
    Label(String),
}

impl MappingUpdate {
    fn apply(self, mapping: &mut Mapping) {
        match self {
            MappingUpdate::InputIndex(index) => mapping.input_index = index,
            MappingUpdate::InputKind(kind) => mapping.input_kind = kind,
            MappingUpdate::MidiKind(kind) => mapping.midi_kind = kind,
            MappingUpdate::Channel(channel) => mapping.channel = channel,
            MappingUpdate::TargetNumber(number) => mapping.target_number = number,
            MappingUpdate::Label(label) => mapping.label = label,
        }
    }
}

/// The seeded table: A, B, X, Y play C4, D4, E4, F4 on channel 1.
pub fn default_mappings() -> Vec<Mapping> {
    let seed = [
        ("btn-a", 0, 60, "Kick (C4)"),
        ("btn-b", 1, 62, "Snare (D4)"),
        ("btn-x", 2, 64, "Hi-Hat (E4)"),
        ("btn-y", 3, 65, "Crash (F4)"),
    ];
    seed.into_iter()
        .map(|(id, input_index, note, label)| Mapping {
            id: MappingId::from(id),
            ..Mapping::note(input_index, 1, note, label)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MappingTable {
    mappings: Vec<Mapping>,
}

impl Default for MappingTable {
    fn default() -> Self {
        Self {
            mappings: default_mappings(),
        }
    }
}

impl MappingTable {
    pub fn empty() -> Self {
        Self {
            mappings: Vec::new(),
        }
    }

    /// Build a table, dropping entries that fail validation or reuse an id.
    /// Returns the table and the rejected entries with their reasons.
    pub fn from_mappings(mappings: Vec<Mapping>) -> (Self, Vec<(Mapping, ConfigError)>) {
        let mut table = Self::empty();
        let mut rejected = Vec::new();
        for mapping in mappings {
            if let Err(err) = table.insert(mapping.clone()) {
                rejected.push((mapping, err));
            }
        }
        (table, rejected)
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Mapping> {
        self.mappings.iter()
    }

    pub fn get(&self, id: &MappingId) -> Option<&Mapping> {
        self.mappings.iter().find(|m| &m.id == id)
    }

    /// First mapping for this input, in table order.
    pub fn find(&self, input_index: u8, input_kind: InputKind) -> Option<&Mapping> {
        self.mappings
            .iter()
            .find(|m| m.matches(input_index, input_kind))
    }

    pub fn insert(&mut self, mapping: Mapping) -> Result<&Mapping, ConfigError> {
        mapping.validate()?;
        if self.get(&mapping.id).is_some() {
            return Err(ConfigError::DuplicateId(mapping.id));
        }
        self.mappings.push(mapping);
        Ok(&self.mappings[self.mappings.len() - 1])
    }

    /// Append a fresh "New Control" mapping (A → C4, channel 1).
    pub fn add_default(&mut self) -> &Mapping {
        self.mappings.push(Mapping::note(0, 1, 60, "New Control"));
        &self.mappings[self.mappings.len() - 1]
    }

    pub fn update(&mut self, id: &MappingId, update: MappingUpdate) -> Result<(), ConfigError> {
        let slot = self
            .mappings
            .iter_mut()
            .find(|m| &m.id == id)
            .ok_or_else(|| ConfigError::UnknownMapping(id.clone()))?;

        let mut edited = slot.clone();
        update.apply(&mut edited);
        edited.validate()?;
        *slot = edited;
        Ok(())
    }

    pub fn delete(&mut self, id: &MappingId) -> Result<Mapping, ConfigError> {
        let pos = self
            .mappings
            .iter()
            .position(|m| &m.id == id)
            .ok_or_else(|| ConfigError::UnknownMapping(id.clone()))?;
        Ok(self.mappings.remove(pos))
    }

    pub fn reset_to_defaults(&mut self) {
        self.mappings = default_mappings();
    }

    /// Drop every axis mapping. Used when analog input is disabled.
    pub fn retain_buttons(&mut self) -> usize {
        let before = self.mappings.len();
        self.mappings.retain(|m| m.input_kind == InputKind::Button);
        before - self.mappings.len()
    }
}

/// Shared, copy-on-write handle to the live mapping table.
///
/// Editors call [`MappingStore::edit`], which works on a private copy and
/// swaps it in only if the edit succeeds. The lock is only held for the
/// pointer swap, never while an edit is being built. Readers take a snapshot, which
/// stays valid and unchanged for as long as they hold it.
#[derive(Debug, Clone, Default)]
pub struct MappingStore {
    current: Arc<RwLock<Arc<MappingTable>>>,
}

impl MappingStore {
    pub fn new(table: MappingTable) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(table))),
        }
    }

    pub fn snapshot(&self) -> Arc<MappingTable> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Apply `f` to a copy of the current table and publish the result.
    ///
    /// `f` runs with no lock held. If another edit was published in the
    /// meantime, `f` runs again on the newer table, so it may be called more
    /// than once.
    pub fn edit<T, F>(&self, mut f: F) -> Result<T, ConfigError>
    where
        F: FnMut(&mut MappingTable) -> Result<T, ConfigError>,
    {
        loop {
            let base = self.snapshot();
            let mut next = MappingTable::clone(&base);
            let out = f(&mut next)?;

            let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
            if Arc::ptr_eq(&*guard, &base) {
                *guard = Arc::new(next);
                return Ok(out);
            }
            log::debug!("Mapping table changed during edit, retrying");
        }
    }
}
