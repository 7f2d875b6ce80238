//! Accessor for the camera controller IP that sits between the D5M parallel pixel bus and
//! memory. The controller exposes four word-sized registers:
//!
//! ```text
//! 0: CR   bit 0 continuous capture (receive gate), bit 1 camera power enable
//! 1: IMR  bit 0 frame-complete interrupt enabled
//! 2: ISR  bit 0 frame-complete pending, write 1 to clear
//! 3: IAR  destination address of the next frame
//! ```
//!
//! There is no locking in here. During capture the handoff protocol is the only writer of the
//! IAR register.

/// Word offsets of the controller registers.
pub struct Offset;

impl Offset {
    pub const CR: usize = 0x00;
    pub const IMR: usize = 0x01;
    pub const ISR: usize = 0x02;
    pub const IAR: usize = 0x03;
}

/// Controller register bits.
pub struct Mask;

impl Mask {
    pub const CR_CON_EN: u32 = 0x0000_0001;
    pub const CR_CAM_EN: u32 = 0x0000_0002;
    pub const IMR_IRQ: u32 = 0x0000_0001;
    pub const ISR_IRQ: u32 = 0x0000_0001;
}

/// Word-addressed register access. Implemented over raw memory for real hardware and by
/// simulated blocks in tests.
pub trait Mmio {
    /// Read the register at word `offset`.
    fn read_word(&self, offset: usize) -> u32;

    /// Write the register at word `offset`.
    fn write_word(&self, offset: usize, value: u32);
}

/// Memory mapped register block accessed with volatile loads and stores.
#[derive(Debug)]
pub struct VolatileBlock {
    base: usize,
}

impl VolatileBlock {
    /// Creates an accessor for the register block at `base`.
    ///
    /// # Safety
    ///
    /// `base` must be the address of the controller's register block, valid for 32-bit
    /// volatile access for the lifetime of the program.
    pub const unsafe fn new(base: usize) -> Self {
        VolatileBlock { base }
    }

    fn addr(&self, offset: usize) -> *mut u32 {
        (self.base + offset * core::mem::size_of::<u32>()) as *mut u32
    }
}

impl Mmio for VolatileBlock {
    fn read_word(&self, offset: usize) -> u32 {
        // Safety: `new` requires `base` to point at the register block
        unsafe { core::ptr::read_volatile(self.addr(offset)) }
    }

    fn write_word(&self, offset: usize, value: u32) {
        // Safety: `new` requires `base` to point at the register block
        unsafe { core::ptr::write_volatile(self.addr(offset), value) }
    }
}

/// How a pending frame-complete interrupt is cleared.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AckMode {
    /// Writing 1 to ISR bit 0 clears it. Writes to IAR only move the destination.
    StatusRegister,
    /// The IAR write that rearms the engine also acknowledges the interrupt.
    FramePointer,
}

/// Raw values of the four controller registers.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ControllerSnapshot {
    pub control: u32,
    pub irq_mask: u32,
    pub irq_status: u32,
    pub frame_pointer: u32,
}

/// Camera controller driver.
pub struct Controller<R> {
    regs: R,
    ack: AckMode,
}

impl<R> Controller<R> {
    /// Wrap a register block.
    pub const fn new(regs: R, ack: AckMode) -> Self {
        Controller { regs, ack }
    }

    /// Acknowledge convention this controller was built with.
    pub fn ack_mode(&self) -> AckMode {
        self.ack
    }

    /// Underlying register block.
    pub fn regs(&self) -> &R {
        &self.regs
    }
}

impl<R: Mmio> Controller<R> {
    /// Power the camera and open the receive gate in a single write.
    pub fn enable(&self) {
        self.regs
            .write_word(Offset::CR, Mask::CR_CAM_EN | Mask::CR_CON_EN);
    }

    /// Power down the camera and close the receive gate.
    pub fn disable(&self) {
        self.regs.write_word(Offset::CR, 0);
    }

    /// Allow the capture engine to write into the armed buffer. Leaves the power bit alone.
    pub fn enable_receive(&self) {
        let cr = self.regs.read_word(Offset::CR);
        self.regs.write_word(Offset::CR, cr | Mask::CR_CON_EN);
    }

    /// Stop the capture engine from starting another frame. Leaves the power bit alone.
    pub fn disable_receive(&self) {
        let cr = self.regs.read_word(Offset::CR);
        self.regs.write_word(Offset::CR, cr & !Mask::CR_CON_EN);
    }

    /// Whether the receive gate is open.
    pub fn receiving(&self) -> bool {
        self.regs.read_word(Offset::CR) & Mask::CR_CON_EN != 0
    }

    /// Enable or disable the frame-complete interrupt line.
    pub fn set_interrupt_enabled(&self, enabled: bool) {
        let imr = if enabled { Mask::IMR_IRQ } else { 0 };
        self.regs.write_word(Offset::IMR, imr);
    }

    /// Polling path: is a completed frame pending?
    pub fn frame_ready(&self) -> bool {
        self.regs.read_word(Offset::ISR) & Mask::ISR_IRQ != 0
    }

    /// Point the capture engine at a new destination.
    pub fn set_target_buffer(&self, addr: u32) {
        self.regs.write_word(Offset::IAR, addr);
    }

    /// Destination the capture engine is (or was last) writing into.
    pub fn target_buffer(&self) -> u32 {
        self.regs.read_word(Offset::IAR)
    }

    /// Clear the pending frame-complete condition.
    ///
    /// With `AckMode::FramePointer` this rewrites the current destination, which is what the
    /// hardware takes as acknowledge. Callers that are about to rearm should skip this and let
    /// the rearm write do it.
    pub fn acknowledge(&self) {
        match self.ack {
            AckMode::StatusRegister => self.regs.write_word(Offset::ISR, Mask::ISR_IRQ),
            AckMode::FramePointer => {
                let iar = self.regs.read_word(Offset::IAR);
                self.regs.write_word(Offset::IAR, iar);
            }
        }
    }

    /// Write the next destination and make sure the interrupt is cleared, whichever register
    /// does that on this hardware.
    pub fn rearm(&self, addr: u32) {
        self.set_target_buffer(addr);
        if self.ack == AckMode::StatusRegister {
            self.acknowledge();
        }
    }

    /// Read all four registers.
    pub fn snapshot(&self) -> ControllerSnapshot {
        ControllerSnapshot {
            control: self.regs.read_word(Offset::CR),
            irq_mask: self.regs.read_word(Offset::IMR),
            irq_status: self.regs.read_word(Offset::ISR),
            frame_pointer: self.regs.read_word(Offset::IAR),
        }
    }
}
