//! padrelay - userspace game controller driver
//!
//! Binds discovered controllers to the slots of the configuration and
//! forwards their input to virtual uinput devices until Ctrl+C.
//!
//! Usage:
//!   padrelay [CONFIG]            run the driver (default: configs/default.toml)
//!   padrelay --list [--json]     list detected controllers and exit

use anyhow::{bail, Context, Result};
use log::{info, warn};
use padrelay::backend::UinputDeviceFactory;
use padrelay::controller::discovery::{EvdevScanner, MultiScanner, StaticScanner};
use padrelay::controller::{DefaultOpener, DeviceScanner};
use padrelay::mapping::config::Config;
use padrelay::SlotManager;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

struct Args {
    config: Option<PathBuf>,
    list: bool,
    json: bool,
}

fn parse_args() -> Result<Option<Args>> {
    let mut args = Args {
        config: None,
        list: false,
        json: false,
    };
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "-h" | "--help" => return Ok(None),
            "-l" | "--list" => args.list = true,
            "--json" => args.json = true,
            flag if flag.starts_with('-') => bail!("unknown option: {}", flag),
            path => {
                if args.config.replace(PathBuf::from(path)).is_some() {
                    bail!("only one configuration file may be given");
                }
            }
        }
    }
    Ok(Some(args))
}

fn print_usage() {
    println!("Usage: padrelay [CONFIG]");
    println!("       padrelay --list [--json]");
    println!();
    println!("Options:");
    println!("  -l, --list    list detected controllers and exit");
    println!("      --json    print the list as JSON");
    println!("  -h, --help    show this help");
}

/// Shared HID context, only present when USB scanning is enabled
#[cfg(feature = "usb")]
type Hid = Option<Arc<parking_lot::Mutex<hidapi::HidApi>>>;
#[cfg(not(feature = "usb"))]
type Hid = ();

#[cfg(feature = "usb")]
fn open_hid(config: &Config) -> Result<Hid> {
    if !config.settings.scan_usb {
        return Ok(None);
    }
    let api = hidapi::HidApi::new().context("Failed to initialize hidapi")?;
    Ok(Some(Arc::new(parking_lot::Mutex::new(api))))
}

#[cfg(not(feature = "usb"))]
fn open_hid(config: &Config) -> Result<Hid> {
    if config.settings.scan_usb {
        warn!("scan_usb is set but padrelay was built without the `usb` feature");
    }
    Ok(())
}

#[cfg_attr(not(feature = "usb"), allow(unused_variables))]
fn build_scanner(config: &Config, hid: &Hid) -> Result<MultiScanner> {
    let mut scanner = MultiScanner::new();
    if config.settings.scan_evdev {
        // never pick up our own virtual devices
        scanner.push(Box::new(EvdevScanner::new(&config.settings.device_name)));
    }
    #[cfg(feature = "usb")]
    if let Some(api) = hid {
        scanner.push(Box::new(padrelay::controller::discovery::UsbScanner::new(Arc::clone(api))));
    }
    if !config.settings.replay.is_empty() {
        scanner.push(Box::new(StaticScanner::replay_files(&config.settings.replay)));
    }
    Ok(scanner)
}

#[cfg_attr(not(feature = "usb"), allow(unused_variables))]
fn build_opener(config: &Config, hid: &Hid) -> Result<DefaultOpener> {
    let maps = config.evdev_maps().context("Invalid evdev code tables")?;
    let opener = DefaultOpener::new(maps, config.settings.evdev_grab, config.settings.capture_dir.clone());
    #[cfg(feature = "usb")]
    let opener = match hid {
        Some(api) => opener.with_hidapi(Arc::clone(api)),
        None => opener,
    };
    Ok(opener)
}

fn list_devices(config: &Config, json: bool) -> Result<()> {
    let hid = open_hid(config)?;
    let mut scanner = build_scanner(config, &hid)?;
    let devices = scanner.scan().context("Device scan failed")?;
    if json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }
    if devices.is_empty() {
        println!("No controllers found");
    }
    for (i, device) in devices.iter().enumerate() {
        println!("{:2}: {}", i, device);
    }
    Ok(())
}

/// Flip `shutdown` on Ctrl+C
fn spawn_signal_thread(shutdown: Arc<AtomicBool>) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .build()
        .context("Failed to create signal runtime")?;
    thread::Builder::new()
        .name("signals".to_string())
        .spawn(move || {
            runtime.block_on(async {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => info!("Ctrl+C received"),
                    Err(e) => warn!("Signal handler failed: {}", e),
                }
            });
            shutdown.store(true, Ordering::SeqCst);
        })
        .context("Failed to spawn signal thread")?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Some(args) = parse_args()? else {
        print_usage();
        return Ok(());
    };

    let config = match &args.config {
        Some(path) => Config::load(path).with_context(|| format!("Failed to load {}", path.display()))?,
        None => Config::load_default().context("Failed to load configs/default.toml")?,
    };

    if args.list {
        return list_devices(&config, args.json);
    }

    println!("=== padrelay ===");
    println!();
    println!("Controllers bound to a slot are grabbed and replaced by virtual devices");
    println!("named \"{}\".", config.settings.device_name);
    println!("Press Ctrl+C to stop");
    println!();

    let hid = open_hid(&config)?;
    let scanner = build_scanner(&config, &hid)?;
    if scanner.is_empty() {
        warn!("No device sources enabled (scan_evdev, scan_usb and replay are all off)");
    }
    let opener = build_opener(&config, &hid)?;

    let mut manager = SlotManager::from_config(&config, Box::new(UinputDeviceFactory), Box::new(opener))
        .context("Failed to set up virtual devices")?;

    let shutdown = Arc::new(AtomicBool::new(false));
    spawn_signal_thread(Arc::clone(&shutdown))?;

    manager.run(Box::new(scanner), shutdown)?;
    println!("Stopped");
    Ok(())
}
