use std::{
    error::Error,
    path::{Path, PathBuf},
    sync::mpsc,
    thread,
};

use clap::{Parser, Subcommand};
use pad_midi_bridge::{
    config::{load_mappings, save_mappings, BridgeConfig},
    dispatch::{DispatchOptions, Dispatcher},
    mapping::{InputKind, MappingStore, MappingTable, MidiKind},
    midi_out::MidiOut,
    pad::{self, ButtonId, DeviceEvent, PROTOCOL_TABLE_VERSION},
    snapshot::{StateCell, StateWatcher},
};

type BoxResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

#[derive(Debug, Parser)]
#[command(version, about = "Play MIDI with a gamepad")]
struct Cli {
    /// Configuration file (created with defaults if missing)
    #[arg(short, long, default_value = "bridge.yml")]
    config: PathBuf,

    /// Log filter, e.g. "debug" or "pad_midi_bridge=trace"
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Bridge the pad to MIDI (default)
    Run {
        /// MIDI output name hint, overrides the config
        #[arg(short, long)]
        output: Option<String>,
        /// Reject reports with an unknown leading byte
        #[arg(long)]
        strict: bool,
        /// Decode sticks and drive axis mappings
        #[arg(long)]
        analog: bool,
    },
    /// List MIDI outputs
    Ports,
    /// List HID interfaces matching the configured filter
    Devices,
    /// Print the mapping table
    Mappings,
    /// Overwrite the mapping file with the defaults
    ResetMappings,
}

fn main() -> BoxResult<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .init();

    let mut config = BridgeConfig::load_or_default(&cli.config)?;
    if !cli.config.exists() {
        config.save(&cli.config)?;
        log::info!("Wrote default configuration to {}", cli.config.display());
    }
    let mappings_path = config.mappings_path(&cli.config);

    match cli.command.unwrap_or(Command::Run {
        output: None,
        strict: false,
        analog: false,
    }) {
        Command::Run {
            output,
            strict,
            analog,
        } => {
            if output.is_some() {
                config.midi_output = output;
            }
            config.strict_protocol |= strict;
            config.analog.enabled |= analog;
            run(&config, &mappings_path)
        }
        Command::Ports => {
            for name in MidiOut::ports()? {
                println!("{name}");
            }
            Ok(())
        }
        Command::Devices => list_devices(&config),
        Command::Mappings => {
            print_mappings(&load_mappings(&mappings_path, config.analog.enabled)?);
            Ok(())
        }
        Command::ResetMappings => {
            save_mappings(&mappings_path, &MappingTable::default())?;
            log::info!("Mappings reset to defaults in {}", mappings_path.display());
            Ok(())
        }
    }
}

fn run(config: &BridgeConfig, mappings_path: &Path) -> BoxResult<()> {
    log::info!(
        "Starting pad-midi-bridge v{} (protocol table v{})",
        env!("CARGO_PKG_VERSION"),
        PROTOCOL_TABLE_VERSION
    );

    let table = load_mappings(mappings_path, config.analog.enabled)?;
    if !mappings_path.exists() {
        save_mappings(mappings_path, &table)?;
    }
    log::info!("Loaded {} mapping(s)", table.len());
    let mappings = MappingStore::new(table);

    let mut midi = MidiOut::new();
    match config.midi_output.as_deref().map(str::trim) {
        None => match midi.select_default()? {
            Some(name) => log::info!("Auto-selected output: {name}"),
            None => log::error!("No MIDI outputs found; messages will be dropped"),
        },
        Some("") => log::warn!("MIDI output disabled; messages will be dropped"),
        Some(hint) => match midi.select(hint)? {
            Some(name) => log::info!("MIDI output: {name}"),
            None => log::error!("MIDI output \"{hint}\" not found"),
        },
    }

    let published = StateCell::new();
    spawn_watcher(published.watch(config.refresh_interval()))?;

    let options = DispatchOptions {
        policy: config.decode_policy(),
        analog: config
            .analog
            .enabled
            .then_some((config.analog.deadzone, config.analog.smoothing)),
    };
    let mut dispatcher = Dispatcher::new(midi, mappings, published, options);

    let (tx, rx) = mpsc::channel::<DeviceEvent>();
    let reader = pad::spawn_reader(config.device, config.scan_interval(), tx)?;
    log::info!(
        "Searching for controllers (vid=0x{:04x} usage_page={} usage={})",
        config.device.vendor_id,
        config.device.usage_page,
        config.device.usage
    );

    // Reports are handled strictly in arrival order, one at a time.
    for event in rx {
        dispatcher.handle_event(event);
    }

    if reader.join().is_err() {
        log::error!("HID thread panicked");
    }
    Ok(())
}

/// Stand-in for a UI: reads the latest state once per frame.
fn spawn_watcher(mut watcher: StateWatcher) -> BoxResult<()> {
    thread::Builder::new()
        .name("pad-midi-bridge-ui".into())
        .spawn(move || loop {
            if let Some(state) = watcher.next_frame() {
                let pressed: Vec<&str> = state.pressed_buttons().map(ButtonId::label).collect();
                log::debug!(
                    "[{}] pressed: {:?} triggers: {:.2}/{:.2}",
                    if state.connected { "online" } else { "searching" },
                    pressed,
                    state.button_values[ButtonId::LtDigital.index()],
                    state.button_values[ButtonId::RtDigital.index()]
                );
            }
        })?;
    Ok(())
}

fn list_devices(config: &BridgeConfig) -> BoxResult<()> {
    let api = hidapi::HidApi::new()?;
    let mut found = 0;
    for info in pad::matching_devices(&api, &config.device) {
        found += 1;
        println!(
            "{:04x}:{:04x} {} ({})",
            info.vendor_id(),
            info.product_id(),
            info.product_string().unwrap_or("Unknown"),
            info.path().to_string_lossy()
        );
    }
    if found == 0 {
        println!("No matching controllers found.");
    }
    Ok(())
}

fn print_mappings(table: &MappingTable) {
    for mapping in table.iter() {
        let input = match mapping.input_kind {
            InputKind::Button => ButtonId::from_index(mapping.input_index as usize)
                .map(ButtonId::label)
                .unwrap_or("?")
                .to_string(),
            InputKind::Axis => format!("Axis {}", mapping.input_index),
        };
        let kind = match mapping.midi_kind {
            MidiKind::NoteOn => "note",
            MidiKind::ControlChange => "cc",
        };
        println!(
            "{:<14} {:<16} ch{:<2} {:<4} {:<3} {}",
            mapping.id.as_str(),
            input,
            mapping.channel,
            kind,
            mapping.target_number,
            mapping.label
        );
    }
}
