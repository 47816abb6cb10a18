//! Attaching the fan controller to a machine.
//!
//! The host supplies three collaborators through [`Host`]: an identity check
//! that decides whether this driver applies, the reservation of the two EC
//! ports, and registration of the attribute table. [`attach`] runs them in
//! that order and returns a [`FanDevice`]; dropping the device hands the fan
//! back to firmware before the ports are released.

pub mod dmi;
pub mod ioport;
pub mod lock;
pub mod sim;

use std::ops::Deref;
use std::path::PathBuf;

use log::{debug, info, warn};

use crate::controller::FanController;
use crate::ec::{EcBus, PortIo, EC_ADDR_PORT, EC_DATA_PORT};
use crate::errors::FanControlError;
use crate::hwmon::{AttrId, HwmonDevice, CHIP_ATTRIBUTES};
use ioport::RawPorts;
use lock::{LockedPorts, PortLock};
use sim::SimulatedEc;

pub const DRIVER_NAME: &str = "gpd-win4-7840u-fan";

/// What the surrounding system provides to a device being attached.
pub trait Host {
    /// Succeeds only on supported hardware.
    fn identify(&self) -> Result<(), FanControlError>;

    /// Reserve the EC ports for the lifetime of the returned handle.
    fn reserve_ports(&self) -> Result<Box<dyn PortIo>, FanControlError>;

    /// Publish the attribute table with its file modes.
    fn register(&self, name: &str, attributes: &[(AttrId, u16)]) -> Result<(), FanControlError> {
        for (id, mode) in attributes {
            debug!("{}: registered {} ({:o})", name, id, mode);
        }
        Ok(())
    }
}

/// The real machine: DMI identity, `ioperm` port access.
pub struct HardwareHost {
    pub dmi_root: PathBuf,
    /// Skip the identity check.
    pub force: bool,
    /// Lock file keeping a second instance off the ports.
    pub lock_path: PathBuf,
}

impl Host for HardwareHost {
    fn identify(&self) -> Result<(), FanControlError> {
        match dmi::check_system(&self.dmi_root, dmi::SUPPORTED_SYSTEMS) {
            Ok(identity) => {
                info!(
                    "detected {} {}",
                    identity.sys_vendor, identity.product_name
                );
                Ok(())
            }
            Err(FanControlError::DeviceAbsent { vendor, product }) if self.force => {
                warn!(
                    "unsupported system '{} {}', continuing because of --force",
                    vendor, product
                );
                Ok(())
            }
            Err(error) => Err(error),
        }
    }

    fn reserve_ports(&self) -> Result<Box<dyn PortIo>, FanControlError> {
        let lock = PortLock::acquire(&self.lock_path)?;
        let ports = RawPorts::reserve(EC_ADDR_PORT, EC_DATA_PORT)?;
        Ok(Box::new(LockedPorts::new(lock, ports)))
    }
}

/// A simulated EC with a tachometer, usable on any machine.
pub struct SimulatedHost {
    ec: SimulatedEc,
}

impl SimulatedHost {
    pub fn new() -> Self {
        Self {
            ec: SimulatedEc::with_tachometer(),
        }
    }
}

impl Default for SimulatedHost {
    fn default() -> Self {
        Self::new()
    }
}

impl Host for SimulatedHost {
    fn identify(&self) -> Result<(), FanControlError> {
        info!("using simulated embedded controller");
        Ok(())
    }

    fn reserve_ports(&self) -> Result<Box<dyn PortIo>, FanControlError> {
        Ok(Box::new(self.ec.clone()))
    }
}

#[cfg(test)]
impl SimulatedHost {
    pub fn ec(&self) -> SimulatedEc {
        self.ec.clone()
    }
}

/// An attached fan. Dropping it returns the fan to firmware control.
pub struct FanDevice<P: PortIo> {
    hwmon: HwmonDevice<P>,
}

impl<P: PortIo> Deref for FanDevice<P> {
    type Target = HwmonDevice<P>;

    fn deref(&self) -> &Self::Target {
        &self.hwmon
    }
}

impl<P: PortIo> Drop for FanDevice<P> {
    fn drop(&mut self) {
        self.hwmon.controller().release();
        info!("{}: detached", self.hwmon.name());
    }
}

/// Identify, reserve, register. Nothing touches the EC unless all three
/// succeed.
pub fn attach(host: &dyn Host) -> Result<FanDevice<Box<dyn PortIo>>, FanControlError> {
    host.identify()?;
    let ports = host.reserve_ports()?;

    let controller = FanController::new(EcBus::new(ports));
    let hwmon = HwmonDevice::new(DRIVER_NAME, controller);

    let attributes: Vec<(AttrId, u16)> = CHIP_ATTRIBUTES
        .iter()
        .map(|id| (*id, hwmon.is_visible(id)))
        .collect();
    host.register(DRIVER_NAME, &attributes)
        .map_err(|error| match error {
            unavailable @ FanControlError::ResourceUnavailable(_) => unavailable,
            other => FanControlError::ResourceUnavailable(format!("registration failed: {}", other)),
        })?;

    info!("{}: GPD Win 4 7840U/8840U fan control loaded", DRIVER_NAME);
    Ok(FanDevice { hwmon })
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::controller::FanMode;
    use crate::ec::testing::{PortOp, RecordingPorts};
    use crate::ec::{Register, EC_DATA_PORT, SEQUENCE_LEN};

    /// Scripted host around a shared simulated EC.
    struct TestHost {
        present: bool,
        ports_free: bool,
        registers: bool,
        lock_path: Option<PathBuf>,
        ec: SimulatedEc,
        trace: Arc<Mutex<Vec<PortOp>>>,
        registered: Mutex<Vec<(AttrId, u16)>>,
    }

    impl TestHost {
        fn new() -> Self {
            Self {
                present: true,
                ports_free: true,
                registers: true,
                lock_path: None,
                ec: SimulatedEc::new(),
                trace: Arc::new(Mutex::new(Vec::new())),
                registered: Mutex::new(Vec::new()),
            }
        }
    }

    impl Host for TestHost {
        fn identify(&self) -> Result<(), FanControlError> {
            if self.present {
                Ok(())
            } else {
                Err(FanControlError::DeviceAbsent {
                    vendor: "ACME".into(),
                    product: "Toaster".into(),
                })
            }
        }

        fn reserve_ports(&self) -> Result<Box<dyn PortIo>, FanControlError> {
            if !self.ports_free {
                return Err(FanControlError::ResourceUnavailable("ports busy".into()));
            }
            let mut ports = RecordingPorts::new(self.ec.clone());
            ports.trace = Arc::clone(&self.trace);
            match &self.lock_path {
                Some(path) => Ok(Box::new(LockedPorts::new(PortLock::acquire(path)?, ports))),
                None => Ok(Box::new(ports)),
            }
        }

        fn register(&self, _name: &str, attributes: &[(AttrId, u16)]) -> Result<(), FanControlError> {
            if !self.registers {
                return Err(std::io::Error::other("host refused").into());
            }
            self.registered.lock().unwrap().extend_from_slice(attributes);
            Ok(())
        }
    }

    #[test]
    fn attach_registers_attribute_table() {
        let host = TestHost::new();
        let device = attach(&host).unwrap();

        assert_eq!(device.name(), DRIVER_NAME);
        assert_eq!(
            *host.registered.lock().unwrap(),
            vec![
                (AttrId::FAN_INPUT, 0o444),
                (AttrId::PWM_ENABLE, 0o644),
                (AttrId::PWM_INPUT, 0o644),
            ]
        );
        // Attaching alone never touches the EC.
        assert!(host.trace.lock().unwrap().is_empty());
    }

    #[test]
    fn absent_hardware_never_activates() {
        let host = TestHost {
            present: false,
            ..TestHost::new()
        };
        let result = attach(&host);
        assert!(matches!(result, Err(FanControlError::DeviceAbsent { .. })));
        assert!(host.trace.lock().unwrap().is_empty());
    }

    #[test]
    fn busy_ports_never_activate() {
        let host = TestHost {
            ports_free: false,
            ..TestHost::new()
        };
        let result = attach(&host);
        assert!(matches!(result, Err(FanControlError::ResourceUnavailable(_))));
        assert!(host.registered.lock().unwrap().is_empty());
    }

    #[test]
    fn failed_registration_is_resource_unavailable() {
        let host = TestHost {
            registers: false,
            ..TestHost::new()
        };
        let result = attach(&host);
        assert!(matches!(result, Err(FanControlError::ResourceUnavailable(_))));
    }

    #[test]
    fn drop_returns_fan_to_firmware() {
        for manual in [false, true] {
            let host = TestHost::new();
            {
                let device = attach(&host).unwrap();
                if manual {
                    device.write(&AttrId::PWM_ENABLE, 1).unwrap();
                    assert_eq!(host.ec.peek(Register::MANUAL_ENABLE), 1);
                }
            }

            let trace = host.trace.lock().unwrap();
            let last = &trace[trace.len() - SEQUENCE_LEN..];
            assert_eq!(
                last[3],
                PortOp::Out {
                    port: EC_DATA_PORT,
                    value: Register::MANUAL_ENABLE.high()
                }
            );
            assert_eq!(
                last[7],
                PortOp::Out {
                    port: EC_DATA_PORT,
                    value: Register::MANUAL_ENABLE.low()
                }
            );
            assert_eq!(
                last[11],
                PortOp::Out {
                    port: EC_DATA_PORT,
                    value: 0
                }
            );
            assert_eq!(host.ec.peek(Register::MANUAL_ENABLE), 0);
        }
    }

    #[cfg(unix)]
    #[test]
    fn second_instance_cannot_take_over_held_fan() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join("gpdfan.lock");
        let host = TestHost {
            lock_path: Some(lock_path),
            ..TestHost::new()
        };

        let holder = attach(&host).unwrap();
        holder.controller().set_manual(100);

        let second = attach(&host);
        assert!(matches!(second, Err(FanControlError::ResourceUnavailable(_))));
        drop(second);

        assert_eq!(holder.controller().state().mode, FanMode::Manual);
        assert_eq!(host.ec.peek(Register::MANUAL_ENABLE), 1);

        drop(holder);
        assert_eq!(host.ec.peek(Register::MANUAL_ENABLE), 0);
        assert!(attach(&host).is_ok());
    }

    #[test]
    fn simulated_host_attaches() {
        let device = attach(&SimulatedHost::new()).unwrap();
        assert_eq!(device.read(&AttrId::FAN_INPUT).unwrap(), 2600);
        device.write(&AttrId::PWM_INPUT, 255).unwrap();
        device.write(&AttrId::PWM_ENABLE, 1).unwrap();
        assert_eq!(device.read(&AttrId::FAN_INPUT).unwrap(), 5400);
    }
}
