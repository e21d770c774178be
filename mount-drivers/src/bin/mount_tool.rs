//! Command-line control of a telescope mount.
//!
//! Subcommands:
//! - `status`: poll and print position and state
//! - `goto` / `sync`: slew to or sync on RA/Dec (J2000 unless `--jnow`)
//! - `park` / `unpark` / `set-park`: parking and the stored park position
//! - `abort`: stop all motion
//! - `track`: tracking on/off, track mode and custom rate
//! - `move`: manual motion for a fixed time
//! - `guide`: one guide pulse
//! - `home`: find, slew to, or set the home position
//! - `info`: model, firmware and capabilities
//!
//! `--simulate` runs every command against the built-in protocol simulator.

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use mount_drivers::codec::ieq::IeqCodec;
use mount_drivers::codec::synscan::SynscanCodec;
use mount_drivers::codec::synscan_legacy::SynscanLegacyCodec;
use mount_drivers::codec::TrackMode;
use mount_drivers::config::TransportConfig;
use mount_drivers::park::{FileParkStore, MemoryParkStore, ParkStore};
use mount_drivers::sim::{IeqSimulator, SynscanProtocol, SynscanSimulator};
use mount_drivers::transport::{SerialTransport, TcpTransport, Transport};
use mount_drivers::{
    Direction, MotionCommand, MountCodec, MountConfig, MountFamily, MountSession, StatusSnapshot,
    SystemClock, TrackingState,
};
use shared::ConfigStorage;
use sky_math::{CataloguePosition, HorizontalPosition, ObservedPosition, ObserverLocation};
use tracing::{info, warn};

/// Polls to wait for a slew or park before giving up
const MAX_WAIT_POLLS: u32 = 600;

/// Model code the iOptron simulator reports when none is configured
const SIM_IEQ_MODEL: &str = "0060";

/// Telescope mount control tool
#[derive(Parser, Debug)]
#[command(name = "mount_tool")]
#[command(about = "Control Synscan and iOptron telescope mounts")]
#[command(version)]
struct Args {
    /// Mount configuration JSON file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Saved mount configuration name in ~/.mount_config/mounts/
    #[arg(long, global = true)]
    mount: Option<String>,

    /// Save the resolved configuration under this name
    #[arg(long, global = true)]
    save_as: Option<String>,

    /// Mount family (synscan, synscan-legacy, ieq)
    #[arg(long, global = true)]
    family: Option<MountFamily>,

    /// Serial port path
    #[arg(long, global = true)]
    port: Option<String>,

    /// Serial baud rate (defaults to the family's rate)
    #[arg(long, global = true)]
    baud: Option<u32>,

    /// Connect over TCP to host:port instead of a serial port
    #[arg(long, global = true)]
    tcp: Option<String>,

    /// Site latitude in degrees, north positive
    #[arg(long, global = true, allow_hyphen_values = true, requires = "lon")]
    lat: Option<f64>,

    /// Site longitude in degrees, east positive
    #[arg(long, global = true, allow_hyphen_values = true, requires = "lat")]
    lon: Option<f64>,

    /// Run against the built-in protocol simulator
    #[arg(long, global = true)]
    simulate: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Switch {
    On,
    Off,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum HomeAction {
    /// Search for the home sensors
    Find,
    /// Slew to the stored home position
    Goto,
    /// Store the current position as home
    Set,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll the mount and print its position
    Status {
        /// Number of polls
        #[arg(short, long, default_value = "1")]
        count: u32,
    },

    /// Slew to a position
    Goto {
        /// Right ascension in hours (azimuth in degrees with --altaz)
        ra: f64,
        /// Declination in degrees (altitude with --altaz)
        #[arg(allow_hyphen_values = true)]
        dec: f64,
        /// Coordinates are apparent (JNow) rather than J2000
        #[arg(long)]
        jnow: bool,
        /// Coordinates are azimuth and altitude
        #[arg(long, conflicts_with = "jnow")]
        altaz: bool,
        /// Return once the slew has started
        #[arg(long)]
        no_wait: bool,
    },

    /// Tell the mount where it is pointing
    Sync {
        /// Right ascension in hours
        ra: f64,
        /// Declination in degrees
        #[arg(allow_hyphen_values = true)]
        dec: f64,
        /// Coordinates are apparent (JNow) rather than J2000
        #[arg(long)]
        jnow: bool,
    },

    /// Park the mount
    Park {
        /// Return once the park has started
        #[arg(long)]
        no_wait: bool,
    },

    /// Unpark the mount
    Unpark,

    /// Stop all motion
    Abort,

    /// Switch tracking on or off
    Track {
        #[arg(value_enum)]
        state: Switch,
        /// Track mode (sidereal, lunar, solar, king, custom)
        #[arg(long)]
        mode: Option<TrackMode>,
        /// Custom track rate as a multiple of sidereal
        #[arg(long)]
        rate: Option<f64>,
    },

    /// Move in one direction for a while
    Move {
        /// north, south, east or west
        direction: Direction,
        /// How long to move
        #[arg(short, long, default_value = "1000")]
        duration_ms: u64,
        /// Slew rate index
        #[arg(short, long)]
        rate: Option<usize>,
    },

    /// Send one guide pulse
    Guide {
        /// north, south, east or west
        direction: Direction,
        /// Pulse length
        duration_ms: u32,
        /// Guide rates (RA, DEC) as fractions of sidereal
        #[arg(long, num_args = 2, value_names = ["RA", "DEC"])]
        guide_rates: Option<Vec<f64>>,
    },

    /// Set the park position (current position unless told otherwise)
    SetPark {
        /// Restore the default park position
        #[arg(long, conflicts_with_all = ["az", "alt"])]
        default: bool,
        /// Park azimuth in degrees
        #[arg(long, requires = "alt")]
        az: Option<f64>,
        /// Park altitude in degrees
        #[arg(long, requires = "az", allow_hyphen_values = true)]
        alt: Option<f64>,
    },

    /// Home position operations
    Home {
        #[arg(value_enum)]
        action: HomeAction,
        /// Return once the slew has started
        #[arg(long)]
        no_wait: bool,
    },

    /// Show model, firmware and capabilities
    Info,
}

type Session<C> = MountSession<C, Box<dyn Transport>, SystemClock, Box<dyn ParkStore>>;

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let config = resolve_config(&args)?;

    if let Some(name) = &args.save_as {
        let path = ConfigStorage::new()?.save_mount_config(name, &config)?;
        info!("Saved mount configuration to {}", path.display());
    }

    let transport = open_transport(&config)?;
    let store = park_store(&config);

    match config.family {
        MountFamily::Synscan => run(SynscanCodec::new(), transport, store, &config, args.command),
        MountFamily::SynscanLegacy => {
            run(SynscanLegacyCodec::new(), transport, store, &config, args.command)
        }
        MountFamily::Ieq => {
            let codec = match &config.ieq_model_override {
                Some(code) => IeqCodec::with_model_override(code.clone()),
                None => IeqCodec::new(),
            };
            run(codec, transport, store, &config, args.command)
        }
    }
}

fn resolve_config(args: &Args) -> Result<MountConfig> {
    let mut config = match (&args.config, &args.mount) {
        (Some(path), _) => MountConfig::load_from_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        (None, Some(name)) => match ConfigStorage::new()?.get_mount_config(name) {
            Some(loaded) => loaded.with_context(|| format!("Failed to load mount {name}"))?,
            None => bail!("No saved mount configuration named {name}"),
        },
        (None, None) => MountConfig::default(),
    };

    if let Some(family) = args.family {
        config.family = family;
        if let TransportConfig::Serial { baud, .. } = &mut config.transport {
            *baud = family.default_baud();
        }
    }
    if let Some(address) = &args.tcp {
        config.transport = TransportConfig::Tcp {
            address: address.clone(),
        };
    }
    if args.port.is_some() || args.baud.is_some() {
        let (current_port, current_baud) = match &config.transport {
            TransportConfig::Serial { port, baud } => (port.clone(), *baud),
            TransportConfig::Tcp { .. } => ("/dev/ttyUSB0".to_string(), config.family.default_baud()),
        };
        config.transport = TransportConfig::Serial {
            port: args.port.clone().unwrap_or(current_port),
            baud: args.baud.unwrap_or(current_baud),
        };
    }
    if let (Some(lat), Some(lon)) = (args.lat, args.lon) {
        config.location = ObserverLocation::new(lat, lon, config.location.elevation_m);
    }
    if args.simulate {
        config.simulate = true;
    }
    Ok(config)
}

fn open_transport(config: &MountConfig) -> Result<Box<dyn Transport>> {
    if config.simulate {
        info!("Using simulated {} mount", config.family);
        return Ok(match config.family {
            MountFamily::Synscan => {
                Box::new(SynscanSimulator::new(SynscanProtocol::Current, 0, SystemClock))
            }
            MountFamily::SynscanLegacy => {
                Box::new(SynscanSimulator::new(SynscanProtocol::Legacy, 0, SystemClock))
            }
            MountFamily::Ieq => Box::new(IeqSimulator::new(
                config
                    .ieq_model_override
                    .clone()
                    .unwrap_or_else(|| SIM_IEQ_MODEL.to_string()),
            )),
        });
    }

    Ok(match &config.transport {
        TransportConfig::Serial { port, baud } => Box::new(SerialTransport::open(port, *baud)?),
        TransportConfig::Tcp { address } => Box::new(TcpTransport::connect(address.as_str())?),
    })
}

fn park_store(config: &MountConfig) -> Box<dyn ParkStore> {
    if config.simulate {
        return Box::new(MemoryParkStore::new());
    }
    match ConfigStorage::new() {
        Ok(storage) => Box::new(FileParkStore::new(storage, config.device_name.clone())),
        Err(e) => {
            warn!("Park state will not persist: {e}");
            Box::new(MemoryParkStore::new())
        }
    }
}

fn run<C: MountCodec>(
    codec: C,
    transport: Box<dyn Transport>,
    store: Box<dyn ParkStore>,
    config: &MountConfig,
    command: Command,
) -> Result<()> {
    let mut session: Session<C> =
        MountSession::connect(codec, transport, SystemClock, store, config)?;
    let poll = config.poll_period();

    match command {
        Command::Status { count } => {
            for i in 0..count {
                if i > 0 {
                    thread::sleep(poll);
                }
                print_snapshot(&session.on_timer_tick());
            }
        }
        Command::Goto {
            ra,
            dec,
            jnow,
            altaz,
            no_wait,
        } => {
            if altaz {
                session.goto_altaz(HorizontalPosition::new(ra, dec))?;
            } else if jnow {
                session.goto(ObservedPosition::new(ra, dec))?;
            } else {
                session.goto(CataloguePosition::new(ra, dec))?;
            }
            if !no_wait {
                wait_while(&mut session, TrackingState::Slewing, poll)?;
            }
        }
        Command::Sync { ra, dec, jnow } => {
            if jnow {
                session.sync(ObservedPosition::new(ra, dec))?;
            } else {
                session.sync(CataloguePosition::new(ra, dec))?;
            }
            print_snapshot(&session.on_timer_tick());
        }
        Command::Park { no_wait } => {
            session.park()?;
            if !no_wait {
                wait_while(&mut session, TrackingState::Parking, poll)?;
            }
        }
        Command::Unpark => session.unpark()?,
        Command::Abort => session.abort()?,
        Command::Track { state, mode, rate } => {
            if let Some(mode) = mode {
                session.set_track_mode(mode)?;
            }
            if let Some(rate) = rate {
                session.set_track_rate(rate)?;
            }
            session.set_track_enabled(state == Switch::On)?;
        }
        Command::Move {
            direction,
            duration_ms,
            rate,
        } => {
            if let Some(index) = rate {
                session.set_slew_rate(index)?;
            }
            session.move_axis(direction, MotionCommand::Start)?;
            thread::sleep(Duration::from_millis(duration_ms));
            session.move_axis(direction, MotionCommand::Stop)?;
            print_snapshot(&session.on_timer_tick());
        }
        Command::Guide {
            direction,
            duration_ms,
            guide_rates,
        } => {
            if let Some([ra, de]) = guide_rates.as_deref() {
                session.set_guide_rates(*ra, *de)?;
            }
            session.guide(direction, duration_ms)?;
            if let Some(deadline) = session.next_timer_deadline() {
                thread::sleep((deadline - Utc::now()).to_std().unwrap_or_default());
                session.service_timers()?;
            }
        }
        Command::SetPark { default, az, alt } => {
            match (default, az, alt) {
                (true, _, _) => session.set_park_default()?,
                (false, Some(az), Some(alt)) => {
                    session.set_park_position(HorizontalPosition::new(az, alt))?
                }
                _ => session.set_park_current()?,
            }
            let park = session.park_position();
            println!(
                "Park position: Az {:.4} Alt {:.4}",
                park.azimuth_deg, park.altitude_deg
            );
        }
        Command::Home { action, no_wait } => {
            match action {
                HomeAction::Find => session.find_home()?,
                HomeAction::Goto => session.goto_home()?,
                HomeAction::Set => session.set_current_as_home()?,
            }
            if action != HomeAction::Set && !no_wait {
                wait_while(&mut session, TrackingState::Slewing, poll)?;
            }
        }
        Command::Info => {
            println!("{}", serde_json::to_string_pretty(&session.mount_info())?);
        }
    }

    println!("Mount state: {}", session.state());
    Ok(())
}

fn wait_while<C: MountCodec>(
    session: &mut Session<C>,
    busy: TrackingState,
    poll: Duration,
) -> Result<()> {
    for _ in 0..MAX_WAIT_POLLS {
        thread::sleep(poll);
        let snapshot = session.on_timer_tick();
        print_snapshot(&snapshot);
        if snapshot.state != busy {
            return Ok(());
        }
    }
    bail!("Mount still {busy} after {MAX_WAIT_POLLS} polls")
}

fn print_snapshot(snapshot: &StatusSnapshot) {
    let stale = if snapshot.stale { " (stale)" } else { "" };
    match (snapshot.catalogue, snapshot.horizontal) {
        (Some(catalogue), Some(horizontal)) => println!(
            "{}{stale}: J2000 {catalogue}, Az {:.4} Alt {:.4}, tracking {}{}",
            snapshot.state,
            horizontal.azimuth_deg,
            horizontal.altitude_deg,
            snapshot.tracking,
            snapshot
                .pier_side
                .map(|side| format!(", pier {side}"))
                .unwrap_or_default()
        ),
        _ => println!("{}{stale}: no position yet", snapshot.state),
    }
}
