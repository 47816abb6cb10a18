//! Embedded controller RAM access over the two-port index/data interface.
//!
//! The EC exposes its 16-bit RAM through a pair of 8-bit ports. Every access
//! programs three pointer registers in turn (address high, address low, data)
//! and each pointer is selected with an index/data handshake, so one logical
//! access is a fixed 12-step port sequence. Two sequences must never
//! interleave: the pointer registers live inside the EC and a second caller
//! would silently retarget the first one's access.
//!
//! [`EcBus`] owns the ports behind a mutex and only hands out [`EcSession`]s,
//! which run complete sequences. There is no way to reach the raw ports
//! through the bus.

use std::sync::{Mutex, MutexGuard, PoisonError};

use log::trace;

/// Index (address) port of the EC interface.
pub const EC_ADDR_PORT: u16 = 0x4E;
/// Data port of the EC interface.
pub const EC_DATA_PORT: u16 = 0x4F;

/// Value written to the index port to select the pointer-index register.
pub const SELECT_INDEX: u8 = 0x2E;
/// Value written to the index port to select the pointer-data register.
pub const SELECT_DATA: u8 = 0x2F;

pub const POINTER_ADDR_HIGH: u8 = 0x11;
pub const POINTER_ADDR_LOW: u8 = 0x10;
pub const POINTER_DATA: u8 = 0x12;

/// Port operations making up one read or write.
pub const SEQUENCE_LEN: usize = 12;

/// A location in the EC's 16-bit address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Register(u16);

impl Register {
    /// 0 = firmware curve, 1 = host supplied duty.
    pub const MANUAL_ENABLE: Register = Register(0x0275);
    pub const RPM_HIGH: Register = Register(0x0218);
    pub const RPM_LOW: Register = Register(0x0219);
    /// Hardware duty, 1..=184.
    pub const PWM: Register = Register(0x1809);

    pub const fn addr(self) -> u16 {
        self.0
    }

    pub const fn high(self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub const fn low(self) -> u8 {
        (self.0 & 0xFF) as u8
    }
}

/// Raw 8-bit port access.
///
/// Implementations assume the port range has already been reserved; port
/// I/O cannot fail once that is done.
pub trait PortIo: Send {
    fn outb(&mut self, port: u16, value: u8);
    fn inb(&mut self, port: u16) -> u8;
}

impl<T: PortIo + ?Sized> PortIo for Box<T> {
    fn outb(&mut self, port: u16, value: u8) {
        (**self).outb(port, value)
    }

    fn inb(&mut self, port: u16) -> u8 {
        (**self).inb(port)
    }
}

/// The EC bus: the ports plus the lock serializing access to them.
pub struct EcBus<P> {
    ports: Mutex<P>,
}

impl<P: PortIo> EcBus<P> {
    pub fn new(ports: P) -> Self {
        Self {
            ports: Mutex::new(ports),
        }
    }

    /// Acquire the bus. Every access made through the returned session is a
    /// complete sequence, and no other caller touches the ports until it is
    /// dropped.
    pub fn lock(&self) -> EcSession<'_, P> {
        // Port state can't be left half-updated by a panic in a caller, the
        // next sequence reprograms all pointers anyway.
        let ports = self.ports.lock().unwrap_or_else(PoisonError::into_inner);
        EcSession { ports }
    }

    /// Read one register in its own critical section.
    #[cfg(test)]
    pub fn read(&self, register: Register) -> u8 {
        self.lock().read(register)
    }

    /// Write one register in its own critical section.
    pub fn write(&self, register: Register, value: u8) {
        self.lock().write(register, value)
    }
}

/// Exclusive access to the EC bus for the lifetime of the guard.
pub struct EcSession<'a, P> {
    ports: MutexGuard<'a, P>,
}

impl<P: PortIo> EcSession<'_, P> {
    pub fn read(&mut self, register: Register) -> u8 {
        self.address(register);
        self.select(POINTER_DATA);
        let value = self.ports.inb(EC_DATA_PORT);
        trace!("ec read {:#06X} -> {:#04X}", register.addr(), value);
        value
    }

    pub fn write(&mut self, register: Register, value: u8) {
        trace!("ec write {:#06X} <- {:#04X}", register.addr(), value);
        self.address(register);
        self.select(POINTER_DATA);
        self.ports.outb(EC_DATA_PORT, value);
    }

    fn address(&mut self, register: Register) {
        self.select(POINTER_ADDR_HIGH);
        self.ports.outb(EC_DATA_PORT, register.high());
        self.select(POINTER_ADDR_LOW);
        self.ports.outb(EC_DATA_PORT, register.low());
    }

    /// Point the data port at `pointer`.
    fn select(&mut self, pointer: u8) {
        self.ports.outb(EC_ADDR_PORT, SELECT_INDEX);
        self.ports.outb(EC_DATA_PORT, pointer);
        self.ports.outb(EC_ADDR_PORT, SELECT_DATA);
    }
}


#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::testing::{PortOp, RecordingPorts};
    use super::*;
    use crate::platform::sim::SimulatedEc;

    fn out(port: u16, value: u8) -> PortOp {
        PortOp::Out { port, value }
    }

    fn expected_prefix(register: Register) -> Vec<PortOp> {
        vec![
            out(EC_ADDR_PORT, SELECT_INDEX),
            out(EC_DATA_PORT, POINTER_ADDR_HIGH),
            out(EC_ADDR_PORT, SELECT_DATA),
            out(EC_DATA_PORT, register.high()),
            out(EC_ADDR_PORT, SELECT_INDEX),
            out(EC_DATA_PORT, POINTER_ADDR_LOW),
            out(EC_ADDR_PORT, SELECT_DATA),
            out(EC_DATA_PORT, register.low()),
            out(EC_ADDR_PORT, SELECT_INDEX),
            out(EC_DATA_PORT, POINTER_DATA),
            out(EC_ADDR_PORT, SELECT_DATA),
        ]
    }

    #[test]
    fn register_bytes() {
        assert_eq!(Register::PWM.high(), 0x18);
        assert_eq!(Register::PWM.low(), 0x09);
        assert_eq!(Register::MANUAL_ENABLE.addr(), 0x0275);
    }

    #[test]
    fn write_emits_full_sequence() {
        let sim = SimulatedEc::new();
        let ports = RecordingPorts::new(sim.clone());
        let trace = Arc::clone(&ports.trace);
        let bus = EcBus::new(ports);

        bus.write(Register::PWM, 0x42);

        let mut expected = expected_prefix(Register::PWM);
        expected.push(out(EC_DATA_PORT, 0x42));
        assert_eq!(*trace.lock().unwrap(), expected);
        assert_eq!(sim.peek(Register::PWM), 0x42);
    }

    #[test]
    fn read_emits_full_sequence() {
        let sim = SimulatedEc::new();
        sim.poke(Register::RPM_LOW, 0x2C);
        let ports = RecordingPorts::new(sim);
        let trace = Arc::clone(&ports.trace);
        let bus = EcBus::new(ports);

        assert_eq!(bus.read(Register::RPM_LOW), 0x2C);

        let mut expected = expected_prefix(Register::RPM_LOW);
        expected.push(PortOp::In {
            port: EC_DATA_PORT,
            value: 0x2C,
        });
        assert_eq!(*trace.lock().unwrap(), expected);
    }

    #[test]
    fn session_runs_back_to_back_sequences() {
        let sim = SimulatedEc::new();
        let bus = EcBus::new(sim.clone());
        {
            let mut ec = bus.lock();
            ec.write(Register(0x0100), 7);
            ec.write(Register(0x0101), 9);
            assert_eq!(ec.read(Register(0x0100)), 7);
        }
        assert_eq!(sim.peek(Register(0x0101)), 9);
    }

    #[test]
    fn concurrent_accesses_never_interleave() {
        let ports = RecordingPorts::new(SimulatedEc::new());
        let trace = Arc::clone(&ports.trace);
        let bus = Arc::new(EcBus::new(ports));

        let writers: Vec<_> = (0..4u16)
            .map(|worker| {
                let bus = Arc::clone(&bus);
                thread::spawn(move || {
                    let register = Register(0x0300 + worker);
                    for round in 0..50u8 {
                        bus.write(register, round);
                        assert_eq!(bus.read(register), round);
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let trace = trace.lock().unwrap();
        assert_eq!(trace.len(), 4 * 50 * 2 * SEQUENCE_LEN);
        for sequence in trace.chunks(SEQUENCE_LEN) {
            let register = match (sequence[3], sequence[7]) {
                (
                    PortOp::Out { value: high, .. },
                    PortOp::Out { value: low, .. },
                ) => Register(u16::from(high) << 8 | u16::from(low)),
                other => panic!("malformed address bytes: {:?}", other),
            };
            assert_eq!(&sequence[..11], expected_prefix(register).as_slice());
            assert!(matches!(
                sequence[11],
                PortOp::Out { port: EC_DATA_PORT, .. } | PortOp::In { port: EC_DATA_PORT, .. }
            ));
        }
    }
}
