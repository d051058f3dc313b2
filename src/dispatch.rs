//! The report → MIDI pipeline.
//!
//! [`Dispatcher`] receives device notifications from a single producer and
//! handles each raw report to completion before returning: decode, diff
//! against the previous state, translate through a snapshot of the mapping
//! table, send every message in edge order, then store the new baseline and
//! publish it for UI consumers.
//!
//! ```text
//!            on_device_opened
//!   Idle  ─────────────────────▶  Connected
//!    ▲                               │
//!    └───────── on_device_error ─────┘
//! ```

use crate::{
    mapping::MappingStore,
    midi_out::MidiSink,
    pad::{
        diff, diff_axes, AxisFilter, ControllerState, DecodePolicy, Decoder, DeviceEvent, Protocol,
    },
    snapshot::StateCell,
    translate::{translate_edges, translate_motions},
};

/// Category of an entry in the observability stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    Info,
    Midi,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkState {
    Idle,
    Connected { name: String },
}

/// Options fixed for the lifetime of a dispatcher.
#[derive(Debug, Clone, Copy, Default)]
pub struct DispatchOptions {
    pub policy: DecodePolicy,
    /// `Some((deadzone, smoothing))` enables analog axes.
    pub analog: Option<(f32, f32)>,
}

type LogCallback = Box<dyn FnMut(LogKind, &str) + Send + 'static>;

pub struct Dispatcher<S> {
    sink: S,
    mappings: MappingStore,
    published: StateCell,
    decoder: Decoder,
    axis_filter: Option<AxisFilter>,
    link: LinkState,
    last_state: ControllerState,
    last_protocol: Option<Protocol>,
    log_callback: Option<LogCallback>,
}

impl<S: MidiSink> Dispatcher<S> {
    pub fn new(
        sink: S,
        mappings: MappingStore,
        published: StateCell,
        options: DispatchOptions,
    ) -> Self {
        let decoder = Decoder::new(options.policy, options.analog.is_some());
        let axis_filter = options
            .analog
            .map(|(deadzone, smoothing)| AxisFilter::new(deadzone, smoothing));
        Self {
            sink,
            mappings,
            published,
            decoder,
            axis_filter,
            link: LinkState::Idle,
            last_state: ControllerState::disconnected(),
            last_protocol: None,
            log_callback: None,
        }
    }

    /// Install a consumer for the log stream. Entries are also forwarded to
    /// the `log` facade whether or not a callback is set.
    pub fn set_log_callback<F>(&mut self, callback: F)
    where
        F: FnMut(LogKind, &str) + Send + 'static,
    {
        self.log_callback = Some(Box::new(callback));
    }

    pub fn link(&self) -> &LinkState {
        &self.link
    }

    pub fn last_state(&self) -> &ControllerState {
        &self.last_state
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn handle_event(&mut self, event: DeviceEvent) {
        match event {
            DeviceEvent::Opened { name } => self.on_device_opened(&name),
            DeviceEvent::Report(buf) => self.on_raw_report(&buf),
            DeviceEvent::Error(message) => self.on_device_error(&message),
        }
    }

    /// A pad was opened. Safe to call at any time, including while already
    /// connected; the baseline always starts clean.
    pub fn on_device_opened(&mut self, name: &str) {
        self.reset_baseline();
        self.last_state.connected = true;
        self.link = LinkState::Connected {
            name: name.to_string(),
        };
        self.published.publish(self.last_state.clone());
        self.emit(LogKind::Info, &format!("Connected: {name}"));
    }

    /// The pad failed or went away. Drops back to idle with an all-released
    /// baseline so a reconnect does not diff against stale input.
    pub fn on_device_error(&mut self, message: &str) {
        let was_connected = matches!(self.link, LinkState::Connected { .. });
        self.link = LinkState::Idle;
        self.reset_baseline();
        self.published.publish(self.last_state.clone());
        if was_connected {
            self.emit(LogKind::Error, &format!("Connection lost: {message}"));
        } else {
            self.emit(LogKind::Error, &format!("HID error: {message}"));
        }
    }

    /// Process one raw report to completion.
    pub fn on_raw_report(&mut self, buf: &[u8]) {
        if self.link == LinkState::Idle {
            log::trace!("Ignoring {} byte report while idle", buf.len());
            return;
        }

        let (protocol, mut state) = match self.decoder.decode_report(buf) {
            Ok(decoded) => decoded,
            Err(err) => {
                self.emit(LogKind::Error, &format!("Dropped report: {err}"));
                return;
            }
        };

        if self.last_protocol != Some(protocol) {
            self.last_protocol = Some(protocol);
            self.emit(
                LogKind::Info,
                &format!("Protocol detected: {protocol} ({} bytes)", buf.len()),
            );
        }

        if let Some(filter) = self.axis_filter.as_mut() {
            state.axes = filter.apply(state.axes);
        }

        let table = self.mappings.snapshot();
        let edges = diff(&self.last_state, &state);
        let mut messages = translate_edges(&edges, &table);
        if self.axis_filter.is_some() {
            let motions = diff_axes(&self.last_state, &state);
            messages.extend(translate_motions(&motions, &table));
        }

        for message in messages {
            match self.sink.send_midi(message) {
                Ok(()) => self.emit(LogKind::Midi, &format!("MIDI TX: {message}")),
                Err(err) => self.emit(LogKind::Error, &format!("MIDI Error: {err}")),
            }
        }

        self.published.publish(state.clone());
        self.last_state = state;
    }

    fn reset_baseline(&mut self) {
        self.last_state = ControllerState::disconnected();
        self.last_protocol = None;
        if let Some(filter) = self.axis_filter.as_mut() {
            filter.reset();
        }
    }

    fn emit(&mut self, kind: LogKind, message: &str) {
        match kind {
            LogKind::Info => log::info!("{message}"),
            LogKind::Midi => log::debug!("{message}"),
            LogKind::Error => log::warn!("{message}"),
        }
        if let Some(cb) = self.log_callback.as_mut() {
            cb(kind, message);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::{
        mapping::{InputKind, Mapping, MappingId, MappingTable, MappingUpdate, MidiKind},
        midi_out::SendError,
        pad::ButtonId,
        translate::MidiMessage,
    };

    #[derive(Default)]
    struct RecordingSink {
        sent: Vec<MidiMessage>,
        fail: Option<SendError>,
    }

    impl MidiSink for RecordingSink {
        fn send_midi(&mut self, message: MidiMessage) -> Result<(), SendError> {
            if let Some(err) = &self.fail {
                return Err(err.clone());
            }
            self.sent.push(message);
            Ok(())
        }
    }

    type Log = Arc<Mutex<Vec<(LogKind, String)>>>;

    fn dispatcher(
        options: DispatchOptions,
    ) -> (Dispatcher<RecordingSink>, MappingStore, StateCell, Log) {
        let store = MappingStore::new(MappingTable::default());
        let cell = StateCell::new();
        let mut d = Dispatcher::new(RecordingSink::default(), store.clone(), cell.clone(), options);
        let log: Log = Arc::default();
        let sink = log.clone();
        d.set_log_callback(move |kind, message| {
            sink.lock().unwrap().push((kind, message.to_string()));
        });
        (d, store, cell, log)
    }

    /// Bluetooth report with the given face-button byte and hat centred.
    fn bt_report(buttons: u8) -> Vec<u8> {
        let mut buf = vec![0u8; 13];
        buf[0] = 0x01;
        buf[11] = buttons;
        buf[12] = 0x08;
        buf
    }

    #[test]
    fn a_press_plays_middle_c() {
        let (mut d, _, cell, _) = dispatcher(DispatchOptions::default());
        d.on_device_opened("Xbox Wireless Controller");

        let buf = [
            0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x10,
        ];
        d.on_raw_report(&buf);

        assert_eq!(d.sink().sent, vec![MidiMessage::new(0x90, 60, 127)]);
        assert!(cell.latest().pressed(ButtonId::A));
        assert!(cell.latest().connected);
    }

    #[test]
    fn release_sends_note_off_and_repeats_are_silent() {
        let (mut d, _, _, _) = dispatcher(DispatchOptions::default());
        d.on_device_opened("pad");

        d.on_raw_report(&bt_report(0x10 | 0x20)); // A + B
        d.on_raw_report(&bt_report(0x10 | 0x20));
        d.on_raw_report(&bt_report(0x20)); // release A

        assert_eq!(
            d.sink().sent,
            vec![
                MidiMessage::new(0x90, 60, 127),
                MidiMessage::new(0x90, 62, 127),
                MidiMessage::new(0x80, 60, 127),
            ]
        );
    }

    #[test]
    fn reports_are_ignored_while_idle() {
        let (mut d, _, cell, _) = dispatcher(DispatchOptions::default());
        d.on_raw_report(&bt_report(0x10));
        assert!(d.sink().sent.is_empty());
        assert_eq!(cell.generation(), 0);
    }

    #[test]
    fn bad_frames_are_logged_and_skipped() {
        let (mut d, _, _, log) = dispatcher(DispatchOptions {
            policy: DecodePolicy::Strict,
            analog: None,
        });
        d.on_device_opened("pad");
        d.on_raw_report(&[0x01, 0x02]);
        let mut unknown = bt_report(0x10);
        unknown[0] = 0x07;
        d.on_raw_report(&unknown);
        d.on_raw_report(&bt_report(0x10));

        assert_eq!(d.link(), &LinkState::Connected { name: "pad".into() });
        assert_eq!(d.sink().sent, vec![MidiMessage::new(0x90, 60, 127)]);
        let errors = log
            .lock()
            .unwrap()
            .iter()
            .filter(|(kind, _)| *kind == LogKind::Error)
            .count();
        assert_eq!(errors, 2);
    }

    #[test]
    fn disconnect_resets_the_baseline() {
        let (mut d, _, cell, log) = dispatcher(DispatchOptions::default());
        d.on_device_opened("pad");
        d.on_raw_report(&bt_report(0x10));

        d.on_device_error("read failed");
        assert_eq!(d.link(), &LinkState::Idle);
        assert_eq!(*d.last_state(), ControllerState::disconnected());
        assert!(!cell.latest().connected);

        // A held across reconnect is a fresh press.
        d.on_device_opened("pad");
        d.on_raw_report(&bt_report(0x10));
        assert_eq!(
            d.sink().sent,
            vec![MidiMessage::new(0x90, 60, 127), MidiMessage::new(0x90, 60, 127)]
        );
        assert!(log
            .lock()
            .unwrap()
            .iter()
            .any(|(kind, message)| *kind == LogKind::Error && message.contains("read failed")));
    }

    #[test]
    fn send_failures_do_not_stop_the_frame() {
        let (mut d, _, cell, log) = dispatcher(DispatchOptions::default());
        d.sink_mut().fail = Some(SendError::NoOutput);
        d.on_device_opened("pad");
        d.on_raw_report(&bt_report(0x10 | 0x20 | 0x40));

        let midi_errors: Vec<String> = log
            .lock()
            .unwrap()
            .iter()
            .filter(|(kind, message)| *kind == LogKind::Error && message.starts_with("MIDI Error"))
            .map(|(_, message)| message.clone())
            .collect();
        assert_eq!(midi_errors.len(), 3);
        // Baseline still advanced.
        assert!(cell.latest().pressed(ButtonId::X));
        assert!(d.last_state().pressed(ButtonId::X));
    }

    #[test]
    fn edits_apply_from_the_next_report() {
        let (mut d, store, _, _) = dispatcher(DispatchOptions::default());
        d.on_device_opened("pad");

        store
            .edit(|table| {
                table.update(
                    &MappingId::from("btn-a"),
                    MappingUpdate::MidiKind(MidiKind::ControlChange),
                )
            })
            .unwrap();
        d.on_raw_report(&bt_report(0x10));
        d.on_raw_report(&bt_report(0x00));

        assert_eq!(
            d.sink().sent,
            vec![MidiMessage::new(0xB0, 60, 127), MidiMessage::new(0xB0, 60, 0)]
        );
    }

    #[test]
    fn messages_follow_ascending_button_order() {
        let (mut d, store, _, _) = dispatcher(DispatchOptions::default());
        store
            .edit(|table| {
                table.insert(Mapping {
                    id: MappingId::from("guide"),
                    input_index: ButtonId::Guide.index() as u8,
                    input_kind: InputKind::Button,
                    midi_kind: MidiKind::ControlChange,
                    channel: 2,
                    target_number: 64,
                    label: "Sustain".into(),
                })?;
                Ok(())
            })
            .unwrap();
        d.on_device_opened("pad");

        let mut buf = bt_report(0x80 | 0x10); // Y + A
        buf[12] = 0x48; // guide, hat centred
        d.on_raw_report(&buf);

        assert_eq!(
            d.sink().sent,
            vec![
                MidiMessage::new(0x90, 60, 127),
                MidiMessage::new(0x90, 65, 127),
                MidiMessage::new(0xB1, 64, 127),
            ]
        );
    }

    #[test]
    fn analog_axes_send_cc_after_buttons() {
        let (mut d, store, cell, _) = dispatcher(DispatchOptions {
            policy: DecodePolicy::Permissive,
            analog: Some((0.0, 0.0)),
        });
        store
            .edit(|table| {
                table.insert(Mapping {
                    id: MappingId::from("lx"),
                    input_index: 0,
                    input_kind: InputKind::Axis,
                    midi_kind: MidiKind::ControlChange,
                    channel: 1,
                    target_number: 1,
                    label: "Mod".into(),
                })?;
                Ok(())
            })
            .unwrap();
        d.on_device_opened("pad");

        let mut buf = bt_report(0x10);
        buf[1..3].copy_from_slice(&i16::MAX.to_le_bytes());
        d.on_raw_report(&buf);
        d.on_raw_report(&buf);

        assert_eq!(
            d.sink().sent,
            vec![MidiMessage::new(0x90, 60, 127), MidiMessage::new(0xB0, 1, 127)]
        );
        assert!(cell.latest().axes[0] > 0.99);
    }

    #[test]
    fn digital_mode_keeps_axes_zero() {
        let (mut d, _, cell, _) = dispatcher(DispatchOptions::default());
        d.on_device_opened("pad");
        let mut buf = bt_report(0);
        buf[1..3].copy_from_slice(&i16::MAX.to_le_bytes());
        d.on_raw_report(&buf);
        assert_eq!(cell.latest().axes, [0.0; 4]);
        assert!(d.sink().sent.is_empty());
    }

    #[test]
    fn protocol_changes_are_logged_once() {
        let (mut d, _, _, log) = dispatcher(DispatchOptions::default());
        d.on_device_opened("pad");
        d.on_raw_report(&bt_report(0));
        d.on_raw_report(&bt_report(0));
        let detections = log
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, message)| message.starts_with("Protocol detected"))
            .count();
        assert_eq!(detections, 1);
    }

    #[test]
    fn device_events_drive_the_state_machine() {
        let (mut d, _, _, _) = dispatcher(DispatchOptions::default());
        d.handle_event(DeviceEvent::Opened { name: "pad".into() });
        d.handle_event(DeviceEvent::Report(bt_report(0x20)));
        d.handle_event(DeviceEvent::Error("gone".into()));
        assert_eq!(d.link(), &LinkState::Idle);
        assert_eq!(d.sink().sent, vec![MidiMessage::new(0x90, 62, 127)]);
    }
}
