//! In-memory model of the EC's index/data port interface.
//!
//! Implements the same pointer-register handshake the real controller does,
//! backed by 64 KiB of EC RAM. Clones share the same RAM so a test can keep a
//! handle while the bus owns another.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::ec::{
    PortIo, Register, EC_ADDR_PORT, EC_DATA_PORT, POINTER_ADDR_HIGH, POINTER_ADDR_LOW,
    POINTER_DATA, SELECT_DATA, SELECT_INDEX,
};
use crate::pwm::HW_DUTY_MAX;

/// RPM the simulated firmware curve settles at.
const FIRMWARE_RPM: u16 = 2600;
/// RPM at hardware duty 184.
const FULL_SPEED_RPM: u32 = 5400;

struct SimState {
    selected: u8,
    pointer: u8,
    addr_high: u8,
    addr_low: u8,
    ram: Vec<u8>,
    tachometer: bool,
}

impl SimState {
    fn addr(&self) -> usize {
        usize::from(self.addr_high) << 8 | usize::from(self.addr_low)
    }

    /// Derive the RPM registers from mode and duty.
    fn spin(&mut self) {
        let manual = self.ram[usize::from(Register::MANUAL_ENABLE.addr())] == 1;
        let rpm = if manual {
            let duty = u32::from(self.ram[usize::from(Register::PWM.addr())]);
            (duty * FULL_SPEED_RPM / u32::from(HW_DUTY_MAX)) as u16
        } else {
            FIRMWARE_RPM
        };
        let [high, low] = rpm.to_be_bytes();
        self.ram[usize::from(Register::RPM_HIGH.addr())] = high;
        self.ram[usize::from(Register::RPM_LOW.addr())] = low;
    }
}

#[derive(Clone)]
pub struct SimulatedEc {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedEc {
    /// Zeroed RAM, RPM registers only change when poked.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                selected: 0,
                pointer: 0,
                addr_high: 0,
                addr_low: 0,
                ram: vec![0; usize::from(u16::MAX) + 1],
                tachometer: false,
            })),
        }
    }

    /// RPM registers follow the manual-enable and PWM registers.
    pub fn with_tachometer() -> Self {
        let sim = Self::new();
        {
            let mut state = sim.state();
            state.tachometer = true;
            state.spin();
        }
        sim
    }

    /// Read EC RAM directly, bypassing the port protocol.
    #[cfg(test)]
    pub fn peek(&self, register: Register) -> u8 {
        self.state().ram[usize::from(register.addr())]
    }

    /// Write EC RAM directly, as the firmware would.
    #[cfg(test)]
    pub fn poke(&self, register: Register, value: u8) {
        self.state().ram[usize::from(register.addr())] = value;
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SimulatedEc {
    fn default() -> Self {
        Self::new()
    }
}

impl PortIo for SimulatedEc {
    fn outb(&mut self, port: u16, value: u8) {
        let mut state = self.state();
        match port {
            EC_ADDR_PORT => state.selected = value,
            EC_DATA_PORT => match state.selected {
                SELECT_INDEX => state.pointer = value,
                SELECT_DATA => match state.pointer {
                    POINTER_ADDR_HIGH => state.addr_high = value,
                    POINTER_ADDR_LOW => state.addr_low = value,
                    POINTER_DATA => {
                        let addr = state.addr();
                        state.ram[addr] = value;
                        if state.tachometer {
                            state.spin();
                        }
                    }
                    _ => {}
                },
                _ => {}
            },
            _ => {}
        }
    }

    fn inb(&mut self, port: u16) -> u8 {
        let state = self.state();
        if port == EC_DATA_PORT && state.selected == SELECT_DATA && state.pointer == POINTER_DATA
        {
            state.ram[state.addr()]
        } else {
            0xFF
        }
    }
}
