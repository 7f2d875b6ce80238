//! Two-wire register access for the MT9P031 on the TRDB-D5M. Works with any microcontroller
//! implementing the embedded-hal blocking I2C interface; the transport itself (clocking, bus
//! arbitration) belongs to the HAL.

use core::marker::PhantomData;
use embedded_hal::blocking::i2c;

/// Device address is 0xBA, however the I2C driver will left-shift the provided address by 1.
pub const D5M_ADDRESS: u8 = 0x5D;

/// Sensor bus driver.
pub struct SensorBus<I2C> {
    /// Marker to ensure the same I2C type is used in all calls.
    i2c: PhantomData<I2C>,
    /// Device I2C address.
    address: u8,
}

/// Sensor bus errors. Both variants carry the register the transaction was addressed to.
#[derive(Debug, Eq, PartialEq)]
pub enum BusError<E> {
    /// I2C write error.
    I2cWrite { reg: u8, source: E },
    /// I2C read error. No value is returned: whatever the bus latched is not trustworthy.
    I2cRead { reg: u8, source: E },
}

impl<E> BusError<E> {
    /// Register identifier of the failed transaction.
    pub fn register(&self) -> u8 {
        match self {
            BusError::I2cWrite { reg, .. } | BusError::I2cRead { reg, .. } => *reg,
        }
    }
}

impl<I2C, E> SensorBus<I2C>
where
    I2C: i2c::Write<Error = E> + i2c::WriteRead<Error = E>,
{
    /// Creates a new sensor bus driver associated with an I2C peripheral.
    pub fn new(_i2c: &I2C) -> Self {
        Self::with_address(_i2c, D5M_ADDRESS)
    }

    /// Same as `new`, for boards that strap the sensor to the alternate address.
    pub fn with_address(_i2c: &I2C, address: u8) -> Self {
        SensorBus {
            i2c: PhantomData,
            address,
        }
    }

    /// Device I2C address in use.
    pub fn address(&self) -> u8 {
        self.address
    }

    /// Write a 16-bit register: pointer byte, then the value most significant byte first.
    pub fn write_register(&self, i2c: &mut I2C, reg: u8, val: u16) -> Result<(), BusError<E>> {
        let [msb, lsb] = val.to_be_bytes();
        i2c.write(self.address, &[reg, msb, lsb])
            .map_err(|source| BusError::I2cWrite { reg, source })
    }

    /// Read a 16-bit register, reassembled big-endian from two bytes.
    pub fn read_register(&self, i2c: &mut I2C, reg: u8) -> Result<u16, BusError<E>> {
        let mut buf = [0x00; 2];
        i2c.write_read(self.address, &[reg], &mut buf)
            .map_err(|source| BusError::I2cRead { reg, source })?;

        Ok(u16::from_be_bytes(buf))
    }

    /// Read a register, clear the bits in `clear`, set the bits in `set` and write it back.
    /// Returns the value written. The read failing aborts before anything is written.
    pub fn modify_register(
        &self,
        i2c: &mut I2C,
        reg: u8,
        clear: u16,
        set: u16,
    ) -> Result<u16, BusError<E>> {
        let current = self.read_register(i2c, reg)?;
        let val = (current & !clear) | set;
        self.write_register(i2c, reg, val)?;
        Ok(val)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::d5m::regs::{Register, DOCUMENTED};
    use crate::test::{BusOp, SimSensor};
    use proptest::prelude::*;

    #[test]
    fn write_is_msb_first() {
        let mut sim = SimSensor::new();
        let bus = SensorBus::new(&sim);
        bus.write_register(&mut sim, Register::ROW_SIZE, 0x077F).unwrap();
        assert_eq!(
            sim.operations(),
            &[BusOp::Write(D5M_ADDRESS, std::vec![0x03, 0x07, 0x7F])]
        );
    }

    #[test]
    fn read_failure_is_reported_not_substituted() {
        let mut sim = SimSensor::new();
        sim.fail_reads_of(Register::READ_MODE_1);
        let bus = SensorBus::new(&sim);
        let err = bus.read_register(&mut sim, Register::READ_MODE_1).unwrap_err();
        assert!(matches!(err, BusError::I2cRead { reg: 0x1E, .. }));
        assert_eq!(err.register(), Register::READ_MODE_1);
    }

    #[test]
    fn failed_baseline_read_writes_nothing() {
        let mut sim = SimSensor::new();
        sim.fail_reads_of(Register::OUTPUT_CONTROL);
        let bus = SensorBus::new(&sim);
        let before = sim.register(Register::OUTPUT_CONTROL);
        assert!(bus
            .modify_register(&mut sim, Register::OUTPUT_CONTROL, 0, 0x0002)
            .is_err());
        assert_eq!(sim.register(Register::OUTPUT_CONTROL), before);
        assert!(sim.writes().is_empty());
    }

    #[test]
    fn alternate_address_is_used_on_the_wire() {
        let mut sim = SimSensor::at_address(0x48);
        let bus = SensorBus::with_address(&sim, 0x48);
        bus.write_register(&mut sim, Register::RED_GAIN, 0x0010).unwrap();
        assert_eq!(bus.read_register(&mut sim, Register::RED_GAIN).unwrap(), 0x0010);
    }

    proptest! {
        #[test]
        fn register_round_trip(index in 0..DOCUMENTED.len(), val in any::<u16>()) {
            let reg = DOCUMENTED[index].id;
            let mut sim = SimSensor::new();
            let bus = SensorBus::new(&sim);
            bus.write_register(&mut sim, reg, val).unwrap();
            prop_assert_eq!(bus.read_register(&mut sim, reg).unwrap(), val);
            prop_assert_eq!(
                &sim.operations()[0],
                &BusOp::Write(D5M_ADDRESS, std::vec![reg, (val >> 8) as u8, val as u8])
            );
        }
    }
}
