use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

use crate::platform::dmi::DMI_BASE;
use crate::platform::lock::DEFAULT_LOCK_PATH;

#[derive(Parser)]
#[command(name = "gpdfan")]
#[command(about = "Fan control for the GPD Win 4 (7840U/8840U) through its embedded controller")]
#[command(version)]
pub struct Cli {
    /// Increase log verbosity (-v = info, -vv = debug, -vvv = trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log file (default: gpdfan.log next to the executable)
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Talk to a simulated embedded controller instead of the hardware
    #[arg(long, global = true)]
    pub simulate: bool,

    /// Attach even if the machine is not a recognised GPD Win 4
    #[arg(long, global = true)]
    pub force: bool,

    /// Directory holding the DMI identity strings
    #[arg(long, global = true, default_value = DMI_BASE)]
    pub dmi_root: PathBuf,

    /// Lock file claiming the EC ports for this instance
    #[arg(long, global = true, default_value = DEFAULT_LOCK_PATH)]
    pub lock_file: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print fan speed and control state
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Read one attribute (fan1_input, pwm1_enable, pwm1)
    Get {
        /// Attribute name
        attribute: String,
    },

    /// Hold the fan at a fixed duty cycle (0–255) until interrupted
    Hold {
        /// PWM value (0 = slowest, 255 = full speed)
        #[arg(value_parser = clap::value_parser!(u8))]
        pwm: u8,

        /// Status refresh interval in seconds
        #[arg(short, long, default_value = "2")]
        interval: u64,
    },

    /// Monitor the fan in real-time
    Monitor {
        /// Refresh interval in seconds
        #[arg(short, long, default_value = "1")]
        interval: u64,
    },

    /// Read and write attributes interactively from stdin
    Console,

    /// Return the fan to firmware control
    Auto,

    /// Open the graphical fan control interface
    Gui,
}
