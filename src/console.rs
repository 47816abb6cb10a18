//! Line-oriented attribute console.
//!
//! Each line is `<attribute>` to read or `<attribute> <value>` to write,
//! using the hwmon names (`fan1_input`, `pwm1_enable`, `pwm1`). Errors are
//! reported with the errno a sensor framework would return and leave the
//! device untouched.

use std::io::{self, BufRead, Write};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use log::{debug, warn};

use crate::ec::PortIo;
use crate::errors::FanControlError;
use crate::hwmon::{AttrId, HwmonDevice, CHIP_ATTRIBUTES};

#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    Quit,
}

/// Run one console line against the device.
pub fn execute<P: PortIo>(
    device: &HwmonDevice<P>,
    line: &str,
    out: &mut impl Write,
) -> io::Result<Outcome> {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return Ok(Outcome::Continue);
    };
    if command.starts_with('#') {
        return Ok(Outcome::Continue);
    }

    match command {
        "quit" | "exit" => return Ok(Outcome::Quit),
        "help" | "list" => {
            for id in CHIP_ATTRIBUTES {
                writeln!(out, "{:<12} {:04o}", id.to_string(), device.is_visible(&id))?;
            }
            return Ok(Outcome::Continue);
        }
        "status" => {
            writeln!(out, "{}", device.status())?;
            return Ok(Outcome::Continue);
        }
        _ => {}
    }

    let result = command.parse::<AttrId>().and_then(|id| match words.next() {
        None => device.read(&id).map(Some),
        Some(raw) => {
            let value = raw.parse::<i64>().map_err(|_| {
                FanControlError::InvalidArgument(format!("'{}' is not an integer", raw))
            })?;
            device.write(&id, value).map(|()| None)
        }
    });

    match result {
        Ok(Some(value)) => writeln!(out, "{}", value)?,
        Ok(None) => writeln!(out, "ok")?,
        Err(error) => {
            debug!("console: '{}' failed: {}", line.trim(), error);
            writeln!(out, "error: {} ({})", error, error.errno())?
        }
    }
    Ok(Outcome::Continue)
}

/// Read stdin on a helper thread so the console loop can still notice a
/// shutdown request while no input arrives.
pub fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (line_tx, line_rx) = mpsc::channel();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if line_tx.send(line).is_err() {
                        break;
                    }
                }
                Err(error) => {
                    warn!("console: stdin read failed: {}", error);
                    break;
                }
            }
        }
    });
    line_rx
}

/// Serve lines until `quit`, end of input, or `stop` returns true.
pub fn run<P: PortIo>(
    device: &HwmonDevice<P>,
    lines: mpsc::Receiver<String>,
    out: &mut impl Write,
    stop: impl Fn() -> bool,
) -> io::Result<()> {
    loop {
        if stop() {
            return Ok(());
        }
        let line = match lines.recv_timeout(Duration::from_millis(200)) {
            Ok(line) => line,
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => return Ok(()),
        };
        if execute(device, &line, out)? == Outcome::Quit {
            return Ok(());
        }
        out.flush()?;
    }
}
