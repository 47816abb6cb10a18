mod cli;
mod console;
mod controller;
mod ec;
mod errors;
mod fan;
mod gui;
mod hwmon;
mod platform;
mod pwm;
mod shutdown;

use std::fs::File;
use std::io;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use simplelog::{ConfigBuilder, LevelFilter, WriteLogger};

use cli::{Cli, Commands};
use ec::PortIo;
use hwmon::AttrId;
use platform::{FanDevice, HardwareHost, Host, SimulatedHost};

type Device = FanDevice<Box<dyn PortIo>>;

fn level_from_verbosity(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Log to gpdfan.log next to the executable unless told otherwise.
    let log_path = cli.log_file.clone().unwrap_or_else(|| {
        std::env::current_exe()
            .unwrap_or_default()
            .parent()
            .unwrap_or(std::path::Path::new("."))
            .join("gpdfan.log")
    });
    let log_config = ConfigBuilder::new().set_time_format_rfc3339().build();
    let log_level = level_from_verbosity(cli.verbose);
    if let Ok(file) = File::create(&log_path) {
        let _ = WriteLogger::init(log_level, log_config, file);
    }
    info!("gpdfan started (log level: {})", log_level);

    shutdown::install();

    let device = attach(&cli)?;
    match cli.command {
        Commands::Status { json } => cmd_status(&device, json),
        Commands::Get { attribute } => cmd_get(&device, &attribute),
        Commands::Hold { pwm, interval } => cmd_hold(&device, pwm, interval),
        Commands::Monitor { interval } => cmd_monitor(&device, interval),
        Commands::Console => cmd_console(&device),
        Commands::Auto => cmd_auto(device),
        Commands::Gui => gui::run(device),
    }
}

fn attach(cli: &Cli) -> Result<Device> {
    let host: Box<dyn Host> = if cli.simulate {
        Box::new(SimulatedHost::new())
    } else {
        Box::new(HardwareHost {
            dmi_root: cli.dmi_root.clone(),
            force: cli.force,
            lock_path: cli.lock_file.clone(),
        })
    };
    platform::attach(host.as_ref()).context("failed to attach to the fan controller")
}

fn cmd_status(device: &Device, json: bool) -> Result<()> {
    let status = device.status();
    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("{}", status);
    }
    Ok(())
}

fn cmd_get(device: &Device, attribute: &str) -> Result<()> {
    let id: AttrId = attribute.parse()?;
    println!("{}", device.read(&id)?);
    Ok(())
}

fn cmd_hold(device: &Device, pwm: u8, interval_secs: u64) -> Result<()> {
    device.controller().set_manual(pwm);
    println!("Holding {} at PWM {} (Ctrl+C to release)...", device.name(), pwm);
    watch(device, interval_secs, |device| println!("{}", device.status()));
    println!("Releasing fan to firmware control.");
    Ok(())
}

fn cmd_monitor(device: &Device, interval_secs: u64) -> Result<()> {
    watch(device, interval_secs, |device| {
        // Clear screen with ANSI escape
        print!("\x1B[2J\x1B[H");
        println!("Fan Monitor (every {}s) — Ctrl+C to stop\n", interval_secs);
        let status = device.status();
        println!("{:<22} {:>8} {:>6} {:>7}", "FAN", "RPM", "PWM", "ENABLE");
        println!("{}", "-".repeat(46));
        println!(
            "{:<22} {:>8} {:>6} {:>7}",
            status.name, status.rpm, status.pwm, status.pwm_enable
        );
    });
    Ok(())
}

fn cmd_console(device: &Device) -> Result<()> {
    println!("Attribute console for {} (quit or Ctrl+D to exit)", device.name());
    let lines = console::spawn_stdin_reader();
    console::run(device, lines, &mut io::stdout(), shutdown::requested)?;
    Ok(())
}

fn cmd_auto(device: Device) -> Result<()> {
    // Detaching writes manual-enable = 0.
    drop(device);
    println!("Fan returned to firmware control.");
    Ok(())
}

/// Call `report` every `interval_secs` until a shutdown is requested.
fn watch(device: &Device, interval_secs: u64, report: impl Fn(&Device)) {
    let interval = Duration::from_secs(interval_secs.max(1));
    while !shutdown::requested() {
        report(device);
        let started = Instant::now();
        while started.elapsed() < interval && !shutdown::requested() {
            thread::sleep(Duration::from_millis(100));
        }
    }
}
