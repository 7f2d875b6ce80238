//! TRDB-D5M camera driver.
//!
//! `Camera` ties the sensor side (register bus and configurator) to the capture side (the
//! controller block and the frame handoff). The handoff is borrowed rather than owned so it can
//! sit in a `static` that the frame-complete interrupt handler also reaches.

pub mod bus;
pub mod config;
pub mod controller;
pub mod regs;

use bus::SensorBus;
use config::{Configurator, SensorOptions};
use controller::{ControllerSnapshot, Mmio};
use crate::error::{Error, ProtocolViolation};
use crate::frame_buf::BufferHandle;
use crate::handoff::{FrameHandoff, FrameNotifier, State};
use embedded_hal::blocking::{
    delay::{DelayMs, DelayUs},
    i2c,
};
use heapless::{consts, LinearMap};
use regs::DOCUMENTED;
use rtt_target::rprintln;

/// Number of horizontal pixels after 4x binning and skipping.
pub const FRAME_WIDTH: u16 = 320;

/// Number of vertical pixels after 4x binning and skipping.
pub const FRAME_HEIGHT: u16 = 240;

/// Number of pixels in one frame.
pub const FRAME_PIXELS: usize = (FRAME_WIDTH as usize) * (FRAME_HEIGHT as usize);

/// Number of total bytes in one frame using RGB565 format (2 bytes per pixel).
pub const FRAME_SIZE: u32 = (FRAME_PIXELS as u32) * 2;

/// Register identifier to value.
pub type RegMap = LinearMap<u8, u16, consts::U64>;

/// Everything `dump_diagnostics` could read back.
#[derive(Clone, Debug)]
pub struct Diagnostics {
    pub sensor: RegMap,
    pub controller: ControllerSnapshot,
}

/// D5M camera: sensor bus plus the capture controller's handoff.
pub struct Camera<'a, I2C, R> {
    i2c: I2C,
    bus: SensorBus<I2C>,
    handoff: &'a FrameHandoff<R>,
}

impl<'a, I2C, E, R> Camera<'a, I2C, R>
where
    I2C: i2c::Write<Error = E> + i2c::WriteRead<Error = E>,
    R: Mmio,
{
    pub fn new(i2c: I2C, handoff: &'a FrameHandoff<R>) -> Self {
        let bus = SensorBus::new(&i2c);
        Camera { i2c, bus, handoff }
    }

    /// Same as `new` with the sensor strapped to another address.
    pub fn with_address(i2c: I2C, address: u8, handoff: &'a FrameHandoff<R>) -> Self {
        let bus = SensorBus::with_address(&i2c, address);
        Camera { i2c, bus, handoff }
    }

    /// Give back the I2C peripheral.
    pub fn free(self) -> I2C {
        self.i2c
    }

    pub fn handoff(&self) -> &'a FrameHandoff<R> {
        self.handoff
    }

    /// Run the sensor bring-up for `options`. Refused while a capture is armed or draining,
    /// since reprogramming geometry mid-frame corrupts the frame being captured.
    pub fn configure(&mut self, options: &SensorOptions) -> Result<(), Error<E>> {
        if self.handoff.state() != State::Idle {
            return Err(ProtocolViolation::CaptureActive.into());
        }
        Configurator::new(&self.bus).configure(&mut self.i2c, options)
    }

    /// Power the camera and open the receive gate.
    pub fn enable(&self) {
        self.handoff.controller().enable();
    }

    /// Power down the camera and close the receive gate.
    pub fn disable(&self) {
        self.handoff.controller().disable();
    }

    /// Reset cycle: power off, wait, power on, wait for the sensor to come up.
    pub fn power_cycle<D: DelayMs<u32>>(&self, delay: &mut D, settle_ms: u32) {
        self.disable();
        delay.delay_ms(settle_ms);
        self.enable();
        delay.delay_ms(settle_ms);
    }

    pub fn start<N: FrameNotifier>(&self, notifier: &mut N) {
        self.handoff.start(notifier);
    }

    pub fn arm(&self, buffer: BufferHandle) -> Result<(), Error<E>> {
        Ok(self.handoff.arm(buffer)?)
    }

    pub fn queue_next(&self, buffer: BufferHandle) -> Result<(), Error<E>> {
        Ok(self.handoff.queue_next(buffer)?)
    }

    pub fn wait_for_frame<N, D>(
        &self,
        notifier: &mut N,
        delay: &mut D,
        timeout_us: u32,
    ) -> Result<BufferHandle, Error<E>>
    where
        N: FrameNotifier,
        D: DelayUs<u32>,
    {
        Ok(self.handoff.wait_for_frame(notifier, delay, timeout_us)?)
    }

    pub fn recycle(&self, buffer: BufferHandle) -> Result<(), Error<E>> {
        Ok(self.handoff.recycle(buffer)?)
    }

    pub fn cancel(&self) {
        self.handoff.cancel();
    }

    /// Read back every documented sensor register and the controller block, logging each.
    pub fn dump_diagnostics(&mut self) -> Result<Diagnostics, Error<E>> {
        let mut sensor = RegMap::new();

        rprintln!("D5M register dump:");
        for info in DOCUMENTED.iter() {
            let val = self.bus.read_register(&mut self.i2c, info.id)?;
            rprintln!("  {:#04X} {:<24} {:#06X}", info.id, info.name, val);
            sensor.insert(info.id, val).ok();
        }

        let controller = self.handoff.controller().snapshot();
        rprintln!(
            "Controller: CR={:#X} IMR={:#X} ISR={:#X} IAR={:#010X}",
            controller.control,
            controller.irq_mask,
            controller.irq_status,
            controller.frame_pointer
        );
        rprintln!(
            "Handoff: {:?}, {} frames, {} overruns",
            self.handoff.state(),
            self.handoff.frames(),
            self.handoff.overruns()
        );

        Ok(Diagnostics { sensor, controller })
    }
}
