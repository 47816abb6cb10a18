//! Fan control state machine.
//!
//! The controller owns the cached duty and the Auto/Manual mode, and is the
//! only thing that writes the fan registers. Every mutation holds the state
//! lock for the whole hardware update, so a reader never sees cached state
//! that disagrees with what was written to the EC. Lock order is always
//! state, then bus.

use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, info};
use serde::Serialize;

use crate::ec::{EcBus, PortIo, Register};
use crate::pwm::{self, DUTY_MAX};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FanMode {
    /// EC firmware runs its own curve.
    Auto,
    /// The EC holds the host supplied duty.
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanState {
    /// Generic 0–255 duty. Applied to hardware only in manual mode; in auto
    /// mode it is the value the next switch to manual will use.
    pub cached_duty: u8,
    pub mode: FanMode,
}

impl Default for FanState {
    fn default() -> Self {
        Self {
            cached_duty: DUTY_MAX,
            mode: FanMode::Auto,
        }
    }
}

pub struct FanController<P> {
    bus: EcBus<P>,
    state: Mutex<FanState>,
}

impl<P: PortIo> FanController<P> {
    /// Start in auto mode with full duty pending. The hardware is assumed to
    /// be under firmware control already.
    pub fn new(bus: EcBus<P>) -> Self {
        Self {
            bus,
            state: Mutex::new(FanState::default()),
        }
    }

    /// Current tachometer reading. Both bytes come from one bus session.
    pub fn read_rpm(&self) -> u16 {
        let mut ec = self.bus.lock();
        let high = ec.read(Register::RPM_HIGH);
        let low = ec.read(Register::RPM_LOW);
        u16::from(high) << 8 | u16::from(low)
    }

    /// Take manual control at `duty`.
    pub fn set_manual(&self, duty: u8) {
        let mut state = self.lock_state();
        self.apply(&mut state, duty);
    }

    /// Take manual control at the cached duty. Re-applies even when already
    /// manual so the EC matches the cache after out-of-band changes.
    pub fn enable_manual(&self) {
        let mut state = self.lock_state();
        let duty = state.cached_duty;
        self.apply(&mut state, duty);
    }

    /// Hand the fan back to the firmware curve. The cached duty is kept.
    pub fn set_auto(&self) {
        let mut state = self.lock_state();
        self.bus.write(Register::MANUAL_ENABLE, 0);
        if state.mode != FanMode::Auto {
            info!("fan returned to firmware control");
        }
        state.mode = FanMode::Auto;
    }

    /// Update the duty without changing mode. Written through immediately in
    /// manual mode, only cached in auto mode.
    pub fn set_cached_duty(&self, duty: u8) {
        let mut state = self.lock_state();
        match state.mode {
            FanMode::Manual => self.apply(&mut state, duty),
            FanMode::Auto => {
                debug!("caching duty {} while in auto mode", duty);
                state.cached_duty = duty;
            }
        }
    }

    /// Duty as reported to the sensor surface: 0 while the firmware is in
    /// charge.
    pub fn current_pwm_report(&self) -> u8 {
        let state = self.lock_state();
        match state.mode {
            FanMode::Manual => state.cached_duty,
            FanMode::Auto => 0,
        }
    }

    pub fn current_mode_report(&self) -> u8 {
        match self.lock_state().mode {
            FanMode::Auto => 0,
            FanMode::Manual => 1,
        }
    }

    pub fn state(&self) -> FanState {
        *self.lock_state()
    }

    /// Return the fan to firmware control before the controller goes away.
    /// Writes manual-enable = 0 whatever the current mode.
    pub fn release(&self) {
        let mut state = self.lock_state();
        self.bus.write(Register::MANUAL_ENABLE, 0);
        state.mode = FanMode::Auto;
        info!("released fan to firmware control");
    }

    /// Duty first, then the mode flip, so the EC never runs manual at a
    /// stale duty.
    fn apply(&self, state: &mut FanState, duty: u8) {
        let scaled = pwm::scale(duty);
        {
            let mut ec = self.bus.lock();
            ec.write(Register::PWM, scaled);
            ec.write(Register::MANUAL_ENABLE, 1);
        }
        if state.mode != FanMode::Manual {
            info!("fan under manual control");
        }
        debug!("duty {} applied as hardware duty {}", duty, scaled);
        state.cached_duty = duty;
        state.mode = FanMode::Manual;
    }

    fn lock_state(&self) -> MutexGuard<'_, FanState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
