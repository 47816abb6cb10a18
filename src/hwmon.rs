//! Sensor surface: the attribute table a hardware-monitoring host sees.
//!
//! Attributes follow the hwmon naming scheme (`fan1_input`, `pwm1_enable`,
//! `pwm1`). The device exposes one fan channel:
//!
//! | attribute     | mode | read                    | write                  |
//! |---------------|------|-------------------------|------------------------|
//! | `fan1_input`  | 0444 | tachometer RPM          | -                      |
//! | `pwm1_enable` | 0644 | 0 auto, 1 manual        | 1 manual, 0 auto       |
//! | `pwm1`        | 0644 | duty, 0 while auto      | duty 0–255             |
//!
//! Anything else is unsupported.

use std::fmt;
use std::str::FromStr;

use log::debug;

use crate::controller::{FanController, FanMode};
use crate::ec::PortIo;
use crate::errors::FanControlError;
use crate::fan::FanStatus;
use crate::pwm::DUTY_MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorType {
    Fan,
    Pwm,
    Temp,
}

impl SensorType {
    fn prefix(self) -> &'static str {
        match self {
            SensorType::Fan => "fan",
            SensorType::Pwm => "pwm",
            SensorType::Temp => "temp",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    Input,
    Enable,
    Label,
    Min,
    Max,
    Target,
    Mode,
}

impl Attribute {
    fn suffix(self) -> &'static str {
        match self {
            Attribute::Input => "input",
            Attribute::Enable => "enable",
            Attribute::Label => "label",
            Attribute::Min => "min",
            Attribute::Max => "max",
            Attribute::Target => "target",
            Attribute::Mode => "mode",
        }
    }

    fn from_suffix(suffix: &str) -> Option<Self> {
        Some(match suffix {
            "input" => Attribute::Input,
            "enable" => Attribute::Enable,
            "label" => Attribute::Label,
            "min" => Attribute::Min,
            "max" => Attribute::Max,
            "target" => Attribute::Target,
            "mode" => Attribute::Mode,
            _ => return None,
        })
    }
}

/// One sensor attribute: type, attribute and zero-based channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttrId {
    pub sensor: SensorType,
    pub attr: Attribute,
    pub channel: u8,
}

impl AttrId {
    pub const FAN_INPUT: AttrId = AttrId::new(SensorType::Fan, Attribute::Input, 0);
    pub const PWM_ENABLE: AttrId = AttrId::new(SensorType::Pwm, Attribute::Enable, 0);
    pub const PWM_INPUT: AttrId = AttrId::new(SensorType::Pwm, Attribute::Input, 0);

    pub const fn new(sensor: SensorType, attr: Attribute, channel: u8) -> Self {
        Self {
            sensor,
            attr,
            channel,
        }
    }
}

impl fmt::Display for AttrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let index = u16::from(self.channel) + 1;
        match (self.sensor, self.attr) {
            // pwmN is the duty itself, it has no _input suffix
            (SensorType::Pwm, Attribute::Input) => write!(f, "pwm{}", index),
            (sensor, attr) => write!(f, "{}{}_{}", sensor.prefix(), index, attr.suffix()),
        }
    }
}

impl FromStr for AttrId {
    type Err = FanControlError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let unknown = || FanControlError::Unsupported(format!("unknown attribute '{}'", name));

        let digits_at = name
            .find(|c: char| c.is_ascii_digit())
            .ok_or_else(unknown)?;
        let (prefix, rest) = name.split_at(digits_at);
        let (index, suffix) = match rest.split_once('_') {
            Some((index, suffix)) => (index, Some(suffix)),
            None => (rest, None),
        };

        let sensor = match prefix {
            "fan" => SensorType::Fan,
            "pwm" => SensorType::Pwm,
            "temp" => SensorType::Temp,
            _ => return Err(unknown()),
        };
        let index: u16 = index.parse().map_err(|_| unknown())?;
        let channel = index
            .checked_sub(1)
            .and_then(|channel| u8::try_from(channel).ok())
            .ok_or_else(unknown)?;
        let attr = match (sensor, suffix) {
            (SensorType::Pwm, None) => Attribute::Input,
            (_, Some(suffix)) => Attribute::from_suffix(suffix).ok_or_else(unknown)?,
            (_, None) => return Err(unknown()),
        };

        Ok(AttrId::new(sensor, attr, channel))
    }
}

/// Attributes the chip registers with the host.
pub const CHIP_ATTRIBUTES: [AttrId; 3] = [AttrId::FAN_INPUT, AttrId::PWM_ENABLE, AttrId::PWM_INPUT];

/// The fan controller as seen through the sensor surface.
pub struct HwmonDevice<P> {
    name: &'static str,
    controller: FanController<P>,
}

impl<P: PortIo> HwmonDevice<P> {
    pub fn new(name: &'static str, controller: FanController<P>) -> Self {
        Self { name, controller }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn controller(&self) -> &FanController<P> {
        &self.controller
    }

    /// File mode of an attribute, 0 when it does not exist.
    pub fn is_visible(&self, id: &AttrId) -> u16 {
        match *id {
            AttrId::FAN_INPUT => 0o444,
            AttrId::PWM_ENABLE | AttrId::PWM_INPUT => 0o644,
            _ => 0,
        }
    }

    pub fn read(&self, id: &AttrId) -> Result<i64, FanControlError> {
        let value = match *id {
            AttrId::FAN_INPUT => i64::from(self.controller.read_rpm()),
            AttrId::PWM_ENABLE => i64::from(self.controller.current_mode_report()),
            AttrId::PWM_INPUT => i64::from(self.controller.current_pwm_report()),
            _ => return Err(unsupported(id, "read")),
        };
        debug!("{}: read {} = {}", self.name, id, value);
        Ok(value)
    }

    pub fn write(&self, id: &AttrId, value: i64) -> Result<(), FanControlError> {
        debug!("{}: write {} = {}", self.name, id, value);
        match *id {
            AttrId::PWM_ENABLE => match value {
                1 => self.controller.enable_manual(),
                0 => self.controller.set_auto(),
                _ => {
                    return Err(FanControlError::InvalidArgument(format!(
                        "{} must be 0 or 1, got {}",
                        id, value
                    )))
                }
            },
            AttrId::PWM_INPUT => {
                let duty = u8::try_from(value).map_err(|_| {
                    FanControlError::InvalidArgument(format!(
                        "{} must be within 0..={}, got {}",
                        id, DUTY_MAX, value
                    ))
                })?;
                self.controller.set_cached_duty(duty);
            }
            _ => return Err(unsupported(id, "write")),
        }
        Ok(())
    }

    /// Snapshot of every readable attribute.
    pub fn status(&self) -> FanStatus {
        let state = self.controller.state();
        let (pwm, pwm_enable) = match state.mode {
            FanMode::Manual => (state.cached_duty, 1),
            FanMode::Auto => (0, 0),
        };
        FanStatus {
            name: self.name.to_string(),
            rpm: self.controller.read_rpm(),
            pwm,
            pwm_enable,
            mode: state.mode,
            cached_duty: state.cached_duty,
        }
    }
}

fn unsupported(id: &AttrId, access: &str) -> FanControlError {
    FanControlError::Unsupported(format!("{} of {}", access, id))
}
