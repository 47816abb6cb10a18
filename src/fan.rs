use std::fmt;

use serde::Serialize;

use crate::controller::FanMode;

/// Snapshot of the fan as the sensor surface reports it.
#[derive(Debug, Clone, Serialize)]
pub struct FanStatus {
    /// Registered device name
    pub name: String,
    /// `fan1_input`
    pub rpm: u16,
    /// `pwm1`, 0 while the firmware is in control
    pub pwm: u8,
    /// `pwm1_enable`
    pub pwm_enable: u8,
    pub mode: FanMode,
    /// Duty that manual mode applies, also while in auto
    pub cached_duty: u8,
}

impl fmt::Display for FanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode {
            FanMode::Manual => write!(
                f,
                "{}: {} RPM [manual, pwm {}]",
                self.name, self.rpm, self.pwm
            ),
            FanMode::Auto => write!(
                f,
                "{}: {} RPM [auto, pending pwm {}]",
                self.name, self.rpm, self.cached_duty
            ),
        }
    }
}
