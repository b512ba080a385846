//! open-tyon CLI: command-line configuration tool for the ROCCAT Tyon.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use crossbeam_channel::Receiver;
use open_tyon_core::backend;
use open_tyon_core::buttons::{ButtonFunction, PhysicalButton, BUTTON_SLOTS};
use open_tyon_core::calibration::tcu::{TcuSession, TcuState, PROGRESS_MAX};
use open_tyon_core::calibration::xc::{XcSession, XcState};
use open_tyon_core::comm::{ControlChannel, ErrorClass};
use open_tyon_core::config::Config;
use open_tyon_core::device::{self, DeviceInfo};
use open_tyon_core::dpi::CPI_LEVELS;
use open_tyon_core::error::Error as CoreError;
use open_tyon_core::events::{self, Event, EventSink};
use open_tyon_core::input::InputListener;
use open_tyon_core::jobs;
use open_tyon_core::keymap::KeyCombination;
use open_tyon_core::onboard::{self, DriverState};
use open_tyon_core::profile::Profile;
use open_tyon_core::report_rate;
use open_tyon_core::safety::PROFILE_COUNT;
use open_tyon_core::settings::{LightColor, LightZone};
use open_tyon_core::sync::ProfileSynchronizer;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

/// How long `xc calibrate` waits for the lever before giving up.
const XC_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[command(
    name = "open-tyon",
    version,
    about = "Open-source ROCCAT Tyon configuration"
)]
struct Cli {
    /// Debug logging (RUST_LOG overrides).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (default: <config dir>/open-tyon/config.json).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Do not write the profile store after changes.
    #[arg(long, global = true)]
    no_autosave: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List connected Tyons.
    ListDevices,
    /// Show firmware, calibration and control unit state.
    Info,
    /// Show profile contents.
    Show {
        /// Profile number (1-5); all profiles if omitted.
        #[arg(long)]
        profile: Option<usize>,
        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Make a profile the active one.
    SetActive {
        /// Profile number (1-5).
        profile: usize,
    },
    /// Set one CPI level (200-8200, step 200).
    SetDpi {
        profile: usize,
        /// CPI level (1-5).
        level: usize,
        dpi: u16,
    },
    /// Set X/Y sensitivity (-5 to 5).
    SetSensitivity {
        profile: usize,
        #[arg(allow_negative_numbers = true)]
        x: i8,
        #[arg(allow_negative_numbers = true)]
        y: i8,
    },
    /// Assign a function to a button slot.
    SetButton {
        profile: usize,
        /// Slot (1-16 standard, 17-32 EasyShift).
        slot: usize,
        /// Function name, e.g. "click", "cpi-up", "shortcut".
        function: String,
        /// Key combination for shortcuts, e.g. "ctrl+shift+k".
        #[arg(long)]
        key: Option<String>,
    },
    /// Set a light color: palette index (0-15) or #RRGGBB.
    SetLight {
        profile: usize,
        /// wheel or bottom
        zone: String,
        color: String,
    },
    /// Switch TalkFX on or off, optionally changing the polling rate.
    SetTalkfx {
        profile: usize,
        state: Toggle,
        /// Polling rate in Hz (125, 250, 500, 1000).
        #[arg(long)]
        rate: Option<u16>,
    },
    /// Rename a profile.
    Rename { profile: usize, name: String },
    /// Copy one profile over another.
    Copy { from: usize, to: usize },
    /// Export all profiles to an .rtpf file.
    Export { file: PathBuf },
    /// Import profiles from an .rtpf file and write them to the device.
    Import { file: PathBuf },
    /// Restore factory defaults on every profile.
    Reset,
    /// Tracking control unit.
    Tcu {
        #[command(subcommand)]
        action: TcuAction,
    },
    /// Set the distance control unit level (0-3).
    Dcu { level: u8 },
    /// X-Celerator lever.
    Xc {
        #[command(subcommand)]
        action: XcAction,
    },
}

#[derive(Subcommand)]
enum TcuAction {
    /// Sample the surface and store the result.
    Calibrate {
        /// Accept without asking.
        #[arg(long)]
        yes: bool,
    },
    /// Enable surface tracking.
    On,
    /// Disable surface tracking.
    Off,
}

#[derive(Subcommand)]
enum XcAction {
    /// Capture the lever's minimum, rest and maximum positions.
    Calibrate,
}

#[derive(Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
}

/// Convert a 1-based number from the command line.
fn one_based(value: usize, what: &str, max: usize) -> Result<usize> {
    if value == 0 || value > max {
        bail!("{what} must be between 1 and {max}, got {value}");
    }
    Ok(value - 1)
}

fn profile_arg(value: usize) -> Result<usize> {
    one_based(value, "profile", PROFILE_COUNT)
}

struct App {
    config: Config,
    autosave: bool,
    events: EventSink,
    rx: Receiver<Event>,
}

impl App {
    fn new(config: Config, autosave: bool) -> Self {
        let (events, rx) = events::channel();
        Self {
            config,
            autosave,
            events,
            rx,
        }
    }

    /// Print notifications queued so far.
    fn drain_events(&self) {
        for event in self.rx.try_iter() {
            match event {
                Event::TcuProgress { value, max } => {
                    eprint!("\rSampling surface: {:>3}%", value * 100 / max.max(1));
                    if value >= max {
                        eprintln!();
                    }
                }
                Event::XcPhase(phase) => println!("{}", phase.instruction()),
                Event::Error { code, message } => debug!(%code, "error notification: {message}"),
                other => debug!(?other, "notification"),
            }
        }
    }

    fn open_channel(&self) -> Result<(DeviceInfo, ControlChannel)> {
        let info = device::first_device()?;
        let transport = backend::open_control(&info, self.config.settle_delay())?;
        Ok((info, ControlChannel::new(Box::new(transport), self.config.comm())))
    }

    /// Open the device, restore host-side names, and load every profile.
    fn open_synchronizer(&self) -> Result<(DeviceInfo, ProfileSynchronizer)> {
        let (info, channel) = self.open_channel()?;
        let mut sync = ProfileSynchronizer::new(channel, self.events.clone(), self.config.layout());
        let store = self.config.profile_store()?;
        if store.exists() {
            match sync.restore_store(&store) {
                Ok(count) => debug!(count, path = %store.display(), "Profile store restored"),
                Err(e) => warn!("ignoring profile store {}: {e}", store.display()),
            }
        }
        let (sync, result) = jobs::spawn_load(sync)?.join();
        self.drain_events();
        result.context("loading profiles from device")?;
        Ok((info, sync))
    }

    fn save(&self, sync: ProfileSynchronizer) -> Result<ProfileSynchronizer> {
        let (sync, result) = jobs::spawn_save(sync)?.join();
        self.drain_events();
        result.context("saving profiles to device")?;
        self.persist(&sync)?;
        Ok(sync)
    }

    fn persist(&self, sync: &ProfileSynchronizer) -> Result<()> {
        if !self.autosave {
            return Ok(());
        }
        let store = self.config.profile_store()?;
        sync.export_file(&store)
            .with_context(|| format!("writing profile store {}", store.display()))
    }

    /// Load, change, save, autosave.
    fn mutate(&self, change: impl FnOnce(&mut ProfileSynchronizer) -> Result<()>) -> Result<()> {
        let (_, mut sync) = self.open_synchronizer()?;
        change(&mut sync)?;
        self.save(sync)?;
        Ok(())
    }
}

fn print_profile(profile: &Profile, active: bool, sync: &ProfileSynchronizer) {
    let s = &profile.settings;
    println!(
        "Profile {}: {}{}",
        profile.index() + 1,
        profile.name(),
        if active { " (active)" } else { "" }
    );
    println!(
        "  Sensitivity: x={} y={}{}",
        s.sensitivity_x(),
        s.sensitivity_y(),
        if s.advanced_sensitivity() { " (advanced)" } else { "" }
    );
    for level in 0..CPI_LEVELS {
        let cpi = s.cpi_level(level).unwrap_or_default();
        let marker = if level == s.cpi_active as usize {
            "*"
        } else if s.cpi_level_enabled(level) {
            " "
        } else {
            "-"
        };
        println!("  CPI {}{marker} {cpi}", level + 1);
    }
    match s.polling_rate() {
        Ok(rate) => println!("  Polling rate: {rate}"),
        Err(e) => println!("  Polling rate: invalid ({e})"),
    }
    println!("  TalkFX: {}", if s.talkfx() { "on" } else { "off" });
    for zone in [LightZone::Wheel, LightZone::Bottom] {
        let [r, g, b] = s.effective_rgb(zone);
        println!(
            "  Light {:?}: #{r:02X}{g:02X}{b:02X}{}",
            zone,
            if s.light_enabled(zone) { "" } else { " (off)" }
        );
    }
    for slot in 0..BUTTON_SLOTS {
        let Some((button, shifted)) = PhysicalButton::from_slot(slot) else {
            continue;
        };
        println!(
            "  [{:>2}] {}{}: {}",
            slot + 1,
            button.label(),
            if shifted { " (EasyShift)" } else { "" },
            profile.buttons.slots[slot].describe(sync.layout())
        );
    }
}

fn profile_json(profile: &Profile, active: bool, sync: &ProfileSynchronizer) -> serde_json::Value {
    let s = &profile.settings;
    let levels: Vec<serde_json::Value> = (0..CPI_LEVELS)
        .map(|level| {
            serde_json::json!({
                "cpi": s.cpi_level(level).unwrap_or_default(),
                "enabled": s.cpi_level_enabled(level),
            })
        })
        .collect();
    let buttons: Vec<String> = profile
        .buttons
        .slots
        .iter()
        .map(|slot| slot.describe(sync.layout()))
        .collect();
    serde_json::json!({
        "index": profile.index() + 1,
        "name": profile.name(),
        "active": active,
        "sensitivity": { "x": s.sensitivity_x(), "y": s.sensitivity_y() },
        "cpi_levels": levels,
        "cpi_active": s.cpi_active + 1,
        "polling_rate": s.polling_rate().ok(),
        "talkfx": s.talkfx(),
        "buttons": buttons,
    })
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt} [y/N] ");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(matches!(line.trim(), "y" | "Y" | "yes"))
}

fn tcu_calibrate(app: &App, yes: bool) -> Result<()> {
    let (_, mut sync) = app.open_synchronizer()?;
    println!("Place the mouse on the surface and do not move it.");
    let mut session = TcuSession::start(sync.channel(), app.events.clone())?;
    while session.state() == TcuState::Sampling {
        std::thread::sleep(app.config.tcu_tick());
        let result = session.tick(sync.channel());
        app.drain_events();
        if let Err(e) = result {
            if let Err(cancel) = session.cancel(sync.channel()) {
                warn!("TCU cancel after failure: {cancel}");
            }
            return Err(e).context("TCU sampling");
        }
    }
    debug!(progress = session.progress(), max = PROGRESS_MAX, "sampling done");

    session.test(sync.channel())?;
    println!("Surface median {}. Move the mouse to try the new tracking.", session.median());
    if !yes && !confirm("Keep the new calibration?")? {
        session.cancel(sync.channel())?;
        println!("Calibration discarded.");
        return Ok(());
    }
    let report = session.accept(sync.channel())?;
    sync.set_control_unit(report);
    app.save(sync)?;
    println!("TCU calibration stored.");
    Ok(())
}

fn xc_calibrate(app: &App) -> Result<()> {
    let (info, channel) = app.open_channel()?;
    let input = backend::open_input(&info)?;
    let previous = onboard::read_device_state(&channel)?;
    onboard::write_device_state(&channel, DriverState::On)?;
    let (listener, specials) = InputListener::spawn(Box::new(input))?;

    let mut session = XcSession::new(app.config.xc(), app.events.clone());
    let result = (|| -> Result<()> {
        session.start(&channel)?;
        app.drain_events();
        let deadline = Instant::now() + XC_TIMEOUT;
        while session.state() != XcState::Applied {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                bail!("no stable lever position within {} s", XC_TIMEOUT.as_secs());
            }
            let special = match specials.recv_timeout(remaining.min(Duration::from_millis(500))) {
                Ok(special) => special,
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                    bail!("input stream closed")
                }
            };
            session.handle_special(&channel, &special, Instant::now())?;
            app.drain_events();
        }
        Ok(())
    })();

    listener.stop();
    if result.is_err() && !matches!(session.state(), XcState::Applied | XcState::Cancelled) {
        if let Err(e) = session.cancel(&channel) {
            warn!("XC cancel failed: {e}");
        }
    }
    if let Err(e) = onboard::write_device_state(&channel, previous) {
        warn!("restoring device state failed: {e}");
    }
    result?;
    let v = session.values();
    println!("X-Celerator calibrated: min {} mid {} max {}", v.min, v.mid, v.max);
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let config_path = match cli.config {
        Some(path) => path,
        None => Config::default_path()?,
    };
    let config = Config::load(&config_path)
        .with_context(|| format!("reading config {}", config_path.display()))?;
    let app = App::new(config, !cli.no_autosave);

    match cli.command {
        Commands::ListDevices => {
            let devices = device::discover_devices()?;
            if devices.is_empty() {
                println!("No ROCCAT Tyon found.");
                println!("Ensure the mouse is connected and you may access its hidraw nodes.");
            } else {
                for dev in &devices {
                    println!(
                        "{} (VID: 0x{:04X}, PID: 0x{:04X}, control: {}, misc: {})",
                        dev.model.name(),
                        dev.vid,
                        dev.pid,
                        dev.path,
                        dev.misc_path.as_deref().unwrap_or("-")
                    );
                }
            }
        }
        Commands::Info => {
            let (dev, channel) = app.open_channel()?;
            let fw = channel.read_info()?;
            let cu = onboard::read_control_unit(&channel)?;
            println!("{}", dev.model.name());
            println!("Link: {:?}", channel.link_status());
            println!("Firmware: {} (DFU {})", fw.firmware_string(), fw.dfu_version);
            println!(
                "X-Celerator: min {} mid {} max {}",
                fw.xc_min, fw.xc_mid, fw.xc_max
            );
            println!("Active profile: {}", onboard::read_active_profile(&channel)? + 1);
            println!(
                "DCU level: {}  TCU: {} (median {})",
                cu.dcu,
                if cu.tcu != 0 { "on" } else { "off" },
                cu.median
            );
        }
        Commands::Show { profile, json } => {
            let (_, sync) = app.open_synchronizer()?;
            let indices: Vec<usize> = match profile {
                Some(p) => vec![profile_arg(p)?],
                None => (0..PROFILE_COUNT).collect(),
            };
            let active = sync.active_profile() as usize;
            if json {
                let list = indices
                    .iter()
                    .map(|&i| Ok(profile_json(sync.profile(i)?, i == active, &sync)))
                    .collect::<Result<Vec<_>>>()?;
                println!("{}", serde_json::to_string_pretty(&list)?);
            } else {
                for i in indices {
                    print_profile(sync.profile(i)?, i == active, &sync);
                }
            }
        }
        Commands::SetActive { profile } => {
            let index = profile_arg(profile)?;
            app.mutate(|sync| Ok(sync.set_active_profile(index)?))?;
            println!("Profile {profile} is now active");
        }
        Commands::SetDpi {
            profile,
            level,
            dpi,
        } => {
            let index = profile_arg(profile)?;
            let level_index = one_based(level, "CPI level", CPI_LEVELS)?;
            app.mutate(|sync| Ok(sync.set_dpi_level(index, level_index, dpi)?))?;
            println!("Profile {profile} CPI level {level} set to {dpi}");
        }
        Commands::SetSensitivity { profile, x, y } => {
            let index = profile_arg(profile)?;
            app.mutate(|sync| Ok(sync.set_sensitivity(index, x, y)?))?;
            println!("Profile {profile} sensitivity set to x={x} y={y}");
        }
        Commands::SetButton {
            profile,
            slot,
            function,
            key,
        } => {
            let index = profile_arg(profile)?;
            let slot_index = one_based(slot, "button slot", BUTTON_SLOTS)?;
            let function = ButtonFunction::from_name(&function)
                .ok_or_else(|| anyhow!("unknown button function '{function}'"))?;
            let combo = match (function, key) {
                (ButtonFunction::Shortcut, Some(key)) => Some(
                    KeyCombination::parse(&key)
                        .ok_or_else(|| anyhow!("cannot parse key combination '{key}'"))?,
                ),
                (ButtonFunction::Shortcut, None) => bail!("shortcut needs --key"),
                (_, Some(_)) => bail!("--key only applies to the shortcut function"),
                (_, None) => None,
            };
            app.mutate(|sync| {
                match &combo {
                    Some(combo) => sync.set_button_shortcut(index, slot_index, combo)?,
                    None => sync.set_button_function(index, slot_index, function)?,
                }
                Ok(())
            })?;
            match combo {
                Some(combo) => println!("Profile {profile} slot {slot} set to {combo}"),
                None => println!("Profile {profile} slot {slot} set to {function}"),
            }
        }
        Commands::SetLight {
            profile,
            zone,
            color,
        } => {
            let index = profile_arg(profile)?;
            let light_zone = LightZone::from_name(&zone)
                .ok_or_else(|| anyhow!("unknown light zone '{zone}' (wheel or bottom)"))?;
            let light_color = LightColor::parse(&color)
                .ok_or_else(|| anyhow!("cannot parse color '{color}'"))?;
            app.mutate(|sync| Ok(sync.set_light_color(index, light_zone, light_color)?))?;
            println!("Profile {profile} {zone} light set to {color}");
        }
        Commands::SetTalkfx {
            profile,
            state,
            rate,
        } => {
            let index = profile_arg(profile)?;
            let rate = rate.map(report_rate::validate_polling_rate).transpose()?;
            let on = matches!(state, Toggle::On);
            app.mutate(|sync| {
                sync.set_talkfx(index, on)?;
                if let Some(rate) = rate {
                    sync.set_polling_rate(index, rate)?;
                }
                Ok(())
            })?;
            println!("Profile {profile} TalkFX {}", if on { "on" } else { "off" });
        }
        Commands::Rename { profile, name } => {
            let index = profile_arg(profile)?;
            app.mutate(|sync| Ok(sync.set_profile_name(index, &name)?))?;
            println!("Profile {profile} renamed to {name}");
        }
        Commands::Copy { from, to } => {
            let (src, dst) = (profile_arg(from)?, profile_arg(to)?);
            app.mutate(|sync| Ok(sync.copy_profile(src, dst)?))?;
            println!("Profile {from} copied to profile {to}");
        }
        Commands::Export { file } => {
            let (_, sync) = app.open_synchronizer()?;
            sync.export_file(&file)?;
            println!("Exported {PROFILE_COUNT} profiles to {}", file.display());
        }
        Commands::Import { file } => {
            let mut count = 0;
            app.mutate(|sync| {
                count = sync.import_file(&file)?;
                Ok(())
            })?;
            println!("Imported {count} profiles from {}", file.display());
        }
        Commands::Reset => {
            let (_, sync) = app.open_synchronizer()?;
            let (sync, result) = jobs::spawn_reset(sync)?.join();
            app.drain_events();
            result.context("resetting profiles")?;
            app.persist(&sync)?;
            println!("All profiles reset to factory defaults");
        }
        Commands::Tcu { action } => match action {
            TcuAction::Calibrate { yes } => tcu_calibrate(&app, yes)?,
            TcuAction::On | TcuAction::Off => {
                let on = matches!(action, TcuAction::On);
                app.mutate(|sync| {
                    sync.set_tcu_enabled(on);
                    Ok(())
                })?;
                println!("TCU {}", if on { "on" } else { "off" });
            }
        },
        Commands::Dcu { level } => {
            app.mutate(|sync| Ok(sync.set_dcu_level(level)?))?;
            println!("DCU level set to {level}");
        }
        Commands::Xc { action } => match action {
            XcAction::Calibrate => xc_calibrate(&app)?,
        },
    }

    Ok(())
}

/// Exit status: the errno of the underlying core error, 1 otherwise.
fn exit_code(err: &anyhow::Error) -> u8 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<CoreError>())
        .map(|core| {
            let class = ErrorClass::classify(core);
            debug!(?class, "core error");
            core.code().errno() as u8
        })
        .unwrap_or(1)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(exit_code(&e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_negative_sensitivity() {
        let cli = Cli::try_parse_from(["open-tyon", "set-sensitivity", "2", "-3", "4"]).unwrap();
        match cli.command {
            Commands::SetSensitivity { profile, x, y } => assert_eq!((profile, x, y), (2, -3, 4)),
            _ => panic!("wrong command"),
        }
    }

    #[test]
    fn cli_parses_nested_calibration() {
        let cli = Cli::try_parse_from(["open-tyon", "-v", "tcu", "calibrate", "--yes"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(
            cli.command,
            Commands::Tcu {
                action: TcuAction::Calibrate { yes: true }
            }
        ));
    }

    #[test]
    fn one_based_bounds() {
        assert_eq!(profile_arg(1).unwrap(), 0);
        assert_eq!(profile_arg(5).unwrap(), 4);
        assert!(profile_arg(0).is_err());
        assert!(profile_arg(6).is_err());
    }

    #[test]
    fn exit_code_follows_core_errno() {
        let err = anyhow::Error::new(CoreError::DeviceNotFound("Tyon".into()))
            .context("opening device");
        assert_eq!(exit_code(&err), 19);
        assert_eq!(exit_code(&anyhow!("plain")), 1);
    }

    #[test]
    fn store_path_is_respected() {
        let config = Config {
            profile_store: Some(PathBuf::from("/tmp/x.rtpf")),
            ..Config::default()
        };
        let app = App::new(config, false);
        assert_eq!(
            app.config.profile_store().unwrap(),
            PathBuf::from("/tmp/x.rtpf")
        );
    }
}
