//! Sensor bring-up. `SensorOptions` describes the wanted operating point, `plan` turns it into
//! an ordered list of register steps and `Configurator` runs them over the sensor bus.
//!
//! Step order is fixed: geometry, shutter, binning/skipping, snapshot off, mirroring, pixel
//! clock, optional test pattern and finally chip enable. Chip enable starts the pixel stream,
//! so it must never move ahead of the rest.

use super::bus::{BusError, SensorBus};
use super::regs::{Bits, Register};
use crate::error::Error;
use embedded_hal::blocking::i2c;
use heapless::{consts, Vec};
use rtt_target::rprintln;

/// Combined bin and skip factors for one axis. Bits [5:4] hold the bin factor and bits [2:0]
/// the skip factor; a value of 3 means 4x in both fields.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AddressMode {
    bin: u8,
    skip: u8,
}

impl AddressMode {
    /// Full resolution readout.
    pub const FULL: AddressMode = AddressMode { bin: 0, skip: 0 };

    /// 4x binning with 4x skipping, the mode used for 320x240 output.
    pub const BIN4_SKIP4: AddressMode = AddressMode { bin: 3, skip: 3 };

    /// Returns `None` if `bin > 3` or `skip > 7`.
    pub fn new(bin: u8, skip: u8) -> Option<Self> {
        if bin > 3 || skip > 7 {
            None
        } else {
            Some(AddressMode { bin, skip })
        }
    }

    /// Recover the fields from a register value, ignoring unrelated bits.
    pub fn decode(value: u16) -> Self {
        AddressMode {
            bin: ((value & Bits::BIN_MASK) >> Bits::BIN_POS) as u8,
            skip: ((value & Bits::SKIP_MASK) >> Bits::SKIP_POS) as u8,
        }
    }

    pub fn encode(self) -> u16 {
        (u16::from(self.bin) << Bits::BIN_POS) | (u16::from(self.skip) << Bits::SKIP_POS)
    }

    pub fn bin(self) -> u8 {
        self.bin
    }

    pub fn skip(self) -> u8 {
        self.skip
    }
}

/// Pixel clock divider field. The field holds half the effective division.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u16)]
pub enum PixelClockDivider {
    Off = 0,
    Div2 = 1,
    Div4 = 2,
    Div8 = 4,
    Div16 = 8,
    Div32 = 16,
    Div64 = 32,
    Div128 = 64,
}

/// Patterns the sensor can generate in place of image data.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u16)]
pub enum PatternKind {
    ColorField = 0,
    HorizontalGradient = 1,
    VerticalGradient = 2,
    Diagonal = 3,
    Classic = 4,
    MarchingOnes = 5,
    MonochromeHorizontalBars = 6,
    MonochromeVerticalBars = 7,
    VerticalColorBars = 8,
}

/// Test pattern selection and its colour parameters (12-bit values).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TestPattern {
    pub kind: PatternKind,
    pub red: u16,
    pub green: u16,
    pub blue: u16,
    pub bar_width: u16,
}

impl TestPattern {
    /// Value of the test pattern control register.
    pub fn control(&self) -> u16 {
        Bits::ENABLE_TEST_PATTERN | ((self.kind as u16) << Bits::TEST_PATTERN_POS)
    }
}

impl Default for TestPattern {
    fn default() -> Self {
        TestPattern {
            kind: PatternKind::VerticalColorBars,
            red: 0x080,
            green: 0xFFF,
            blue: 0xA80,
            bar_width: 8,
        }
    }
}

/// Runtime sensor configuration, resolved once per call to `Configurator::configure`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SensorOptions {
    /// Active rows minus one.
    pub row_size: u16,
    /// Active columns minus one.
    pub column_size: u16,
    /// Exposure in row times, split over the lower/upper register pair.
    pub shutter_width: u32,
    pub row_mode: AddressMode,
    pub column_mode: AddressMode,
    pub mirror_row: bool,
    pub mirror_column: bool,
    pub invert_pixel_clock: bool,
    pub pixel_clock_divider: PixelClockDivider,
    pub test_pattern: Option<TestPattern>,
}

impl Default for SensorOptions {
    fn default() -> Self {
        SensorOptions {
            row_size: 1919,
            column_size: 2559,
            shutter_width: 3,
            row_mode: AddressMode::BIN4_SKIP4,
            column_mode: AddressMode::BIN4_SKIP4,
            mirror_row: false,
            mirror_column: false,
            invert_pixel_clock: true,
            pixel_clock_divider: PixelClockDivider::Off,
            test_pattern: None,
        }
    }
}

impl SensorOptions {
    pub fn with_geometry(mut self, row_size: u16, column_size: u16) -> Self {
        self.row_size = row_size;
        self.column_size = column_size;
        self
    }

    pub fn with_shutter_width(mut self, width: u32) -> Self {
        self.shutter_width = width;
        self
    }

    pub fn with_address_modes(mut self, row: AddressMode, column: AddressMode) -> Self {
        self.row_mode = row;
        self.column_mode = column;
        self
    }

    pub fn with_mirroring(mut self, row: bool, column: bool) -> Self {
        self.mirror_row = row;
        self.mirror_column = column;
        self
    }

    pub fn with_pixel_clock(mut self, invert: bool, divider: PixelClockDivider) -> Self {
        self.invert_pixel_clock = invert;
        self.pixel_clock_divider = divider;
        self
    }

    pub fn with_test_pattern(mut self, pattern: TestPattern) -> Self {
        self.test_pattern = Some(pattern);
        self
    }

    fn pixel_clock_control(&self) -> u16 {
        let invert = if self.invert_pixel_clock {
            Bits::INVERT_PIXCLK
        } else {
            0
        };
        invert | ((self.pixel_clock_divider as u16) << Bits::DIVIDE_PIXCLK_POS)
    }

    fn read_mode_2_bits(&self) -> u16 {
        let mut set = 0;
        if self.mirror_row {
            set |= Bits::MIRROR_ROW;
        }
        if self.mirror_column {
            set |= Bits::MIRROR_COLUMN;
        }
        set
    }

    /// Ordered register steps implementing these options.
    pub fn plan(&self) -> Plan {
        let mut plan = Plan::new();

        plan.write(Register::ROW_SIZE, self.row_size);
        plan.write(Register::COLUMN_SIZE, self.column_size);

        // Lower half first
        plan.write(Register::SHUTTER_WIDTH_LOWER, self.shutter_width as u16);
        plan.write(Register::SHUTTER_WIDTH_UPPER, (self.shutter_width >> 16) as u16);

        plan.write(Register::ROW_ADDRESS_MODE, self.row_mode.encode());
        plan.write(Register::COLUMN_ADDRESS_MODE, self.column_mode.encode());

        // Free running capture
        plan.modify(Register::READ_MODE_1, Bits::SNAPSHOT, 0);

        plan.modify(
            Register::READ_MODE_2,
            Bits::MIRROR_ROW | Bits::MIRROR_COLUMN,
            self.read_mode_2_bits(),
        );

        plan.write(Register::PIXEL_CLOCK_CONTROL, self.pixel_clock_control());

        if let Some(pattern) = &self.test_pattern {
            plan.write(Register::TEST_PATTERN_CONTROL, pattern.control());
            plan.write(Register::TEST_PATTERN_RED, pattern.red);
            plan.write(Register::TEST_PATTERN_GREEN, pattern.green);
            plan.write(Register::TEST_PATTERN_BLUE, pattern.blue);
            plan.write(Register::TEST_PATTERN_BAR_WIDTH, pattern.bar_width);
        }

        plan.modify(Register::OUTPUT_CONTROL, 0, Bits::CHIP_ENABLE);

        plan
    }
}

/// One register operation of the bring-up sequence.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Step {
    /// Plain write, the value depends only on the options.
    Write { reg: u8, value: u16 },
    /// Read the register, clear `clear`, set `set` and write it back.
    Modify { reg: u8, clear: u16, set: u16 },
}

impl Step {
    pub fn register(&self) -> u8 {
        match self {
            Step::Write { reg, .. } | Step::Modify { reg, .. } => *reg,
        }
    }
}

/// Ordered bring-up steps. The longest sequence is 15 steps (with a test pattern).
#[derive(Clone, Debug, Default)]
pub struct Plan {
    steps: Vec<Step, consts::U16>,
}

impl Plan {
    fn new() -> Self {
        Plan { steps: Vec::new() }
    }

    fn push(&mut self, step: Step) {
        debug_assert!(Register::is_documented(step.register()));
        // Capacity covers the longest sequence `plan` can produce
        let pushed = self.steps.push(step).is_ok();
        debug_assert!(pushed, "plan capacity exceeded");
    }

    fn write(&mut self, reg: u8, value: u16) {
        self.push(Step::Write { reg, value });
    }

    fn modify(&mut self, reg: u8, clear: u16, set: u16) {
        self.push(Step::Modify { reg, clear, set });
    }

    pub fn iter(&self) -> impl Iterator<Item = &Step> {
        self.steps.iter()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn last(&self) -> Option<&Step> {
        self.steps.last()
    }
}

/// Runs a bring-up plan against the sensor.
pub struct Configurator<'a, I2C> {
    bus: &'a SensorBus<I2C>,
}

impl<'a, I2C, E> Configurator<'a, I2C>
where
    I2C: i2c::Write<Error = E> + i2c::WriteRead<Error = E>,
{
    pub fn new(bus: &'a SensorBus<I2C>) -> Self {
        Configurator { bus }
    }

    /// Apply `options`. Stops at the first failing register; nothing after it is written.
    /// Must not run while a capture session is active.
    pub fn configure(&self, i2c: &mut I2C, options: &SensorOptions) -> Result<(), Error<E>> {
        self.run(i2c, &options.plan())
    }

    /// Execute an already resolved plan.
    pub fn run(&self, i2c: &mut I2C, plan: &Plan) -> Result<(), Error<E>> {
        for step in plan.iter() {
            if let Err(e) = self.apply(i2c, step) {
                rprintln!("Sensor setup failed at register {:#04X}", step.register());
                return Err(e);
            }
        }

        rprintln!("Sensor setup complete ({} steps)", plan.len());
        Ok(())
    }

    fn apply(&self, i2c: &mut I2C, step: &Step) -> Result<(), Error<E>> {
        match *step {
            Step::Write { reg, value } => self
                .bus
                .write_register(i2c, reg, value)
                .map_err(Error::BusTransfer),
            Step::Modify { reg, clear, set } => self
                .bus
                .modify_register(i2c, reg, clear, set)
                .map(|_| ())
                .map_err(|e| match e {
                    // Never assume a baseline: without the read the preserved bits are garbage
                    BusError::I2cRead { .. } => Error::Configuration(e),
                    BusError::I2cWrite { .. } => Error::BusTransfer(e),
                }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::{SimError, SimSensor};
    use proptest::prelude::*;

    fn configure(sim: &mut SimSensor, options: &SensorOptions) -> Result<(), Error<SimError>> {
        let bus = SensorBus::new(&*sim);
        Configurator::new(&bus).configure(sim, options)
    }

    #[test]
    fn address_mode_encoding() {
        for bin in 0..=3 {
            for skip in 0..=7 {
                let mode = AddressMode::new(bin, skip).unwrap();
                let value = mode.encode();
                assert_eq!(value, (u16::from(bin) << 4) | u16::from(skip));
                assert_eq!(AddressMode::decode(value), mode);
            }
        }
        assert_eq!(AddressMode::new(4, 0), None);
        assert_eq!(AddressMode::new(0, 8), None);
        assert_eq!(AddressMode::BIN4_SKIP4.encode(), 0x33);
    }

    proptest! {
        #[test]
        fn address_mode_decode_ignores_unrelated_bits(value in any::<u16>()) {
            let mode = AddressMode::decode(value);
            prop_assert_eq!(mode.bin(), ((value >> 4) & 0b11) as u8);
            prop_assert_eq!(mode.skip(), (value & 0b111) as u8);
            prop_assert_eq!(AddressMode::decode(mode.encode()), mode);
        }
    }

    #[test]
    fn default_plan_matches_reference_bring_up() {
        let plan = SensorOptions::default().plan();
        let steps: std::vec::Vec<Step> = plan.iter().copied().collect();
        assert_eq!(
            steps,
            std::vec![
                Step::Write {
                    reg: Register::ROW_SIZE,
                    value: 1919,
                },
                Step::Write {
                    reg: Register::COLUMN_SIZE,
                    value: 2559,
                },
                Step::Write {
                    reg: Register::SHUTTER_WIDTH_LOWER,
                    value: 3,
                },
                Step::Write {
                    reg: Register::SHUTTER_WIDTH_UPPER,
                    value: 0,
                },
                Step::Write {
                    reg: Register::ROW_ADDRESS_MODE,
                    value: 0x33,
                },
                Step::Write {
                    reg: Register::COLUMN_ADDRESS_MODE,
                    value: 0x33,
                },
                Step::Modify {
                    reg: Register::READ_MODE_1,
                    clear: Bits::SNAPSHOT,
                    set: 0,
                },
                Step::Modify {
                    reg: Register::READ_MODE_2,
                    clear: Bits::MIRROR_ROW | Bits::MIRROR_COLUMN,
                    set: 0,
                },
                Step::Write {
                    reg: Register::PIXEL_CLOCK_CONTROL,
                    value: 0x8000,
                },
                Step::Modify {
                    reg: Register::OUTPUT_CONTROL,
                    clear: 0,
                    set: Bits::CHIP_ENABLE,
                },
            ]
        );
    }

    #[test]
    fn chip_enable_is_always_last() {
        // Every optional step enabled: the longest plan there is
        let options = SensorOptions::default()
            .with_mirroring(true, true)
            .with_test_pattern(TestPattern::default());
        let plan = options.plan();
        assert_eq!(plan.len(), 15);
        assert_eq!(
            plan.last(),
            Some(&Step::Modify {
                reg: Register::OUTPUT_CONTROL,
                clear: 0,
                set: Bits::CHIP_ENABLE,
            })
        );
    }

    #[test]
    fn shutter_width_is_split_lower_first() {
        let plan = SensorOptions::default().with_shutter_width(0x0001_2345).plan();
        let shutter: std::vec::Vec<Step> = plan
            .iter()
            .filter(|s| {
                s.register() == Register::SHUTTER_WIDTH_LOWER
                    || s.register() == Register::SHUTTER_WIDTH_UPPER
            })
            .copied()
            .collect();
        assert_eq!(
            shutter,
            std::vec![
                Step::Write { reg: Register::SHUTTER_WIDTH_LOWER, value: 0x2345 },
                Step::Write { reg: Register::SHUTTER_WIDTH_UPPER, value: 0x0001 },
            ]
        );
    }

    #[test]
    fn chip_enable_preserves_unrelated_bits() {
        for &initial in &[0x0000_u16, 0xFFFF, 0x1F80, 0x5A5A] {
            let mut sim = SimSensor::new();
            sim.set_register(Register::OUTPUT_CONTROL, initial);
            configure(&mut sim, &SensorOptions::default()).unwrap();
            let after = sim.register(Register::OUTPUT_CONTROL);
            assert_eq!(after, initial | Bits::CHIP_ENABLE);
            assert_eq!((after ^ initial) & !Bits::CHIP_ENABLE, 0);
        }
    }

    #[test]
    fn snapshot_cleared_and_mirroring_applied_over_read_values() {
        let mut sim = SimSensor::new();
        sim.set_register(Register::READ_MODE_1, 0x4106);
        sim.set_register(Register::READ_MODE_2, 0x4007);
        let options = SensorOptions::default().with_mirroring(true, false);
        configure(&mut sim, &options).unwrap();
        assert_eq!(sim.register(Register::READ_MODE_1), 0x4006);
        assert_eq!(sim.register(Register::READ_MODE_2), 0x8007);
    }

    #[test]
    fn pixel_clock_combines_invert_and_divider() {
        let mut sim = SimSensor::new();
        let options = SensorOptions::default().with_pixel_clock(true, PixelClockDivider::Div8);
        configure(&mut sim, &options).unwrap();
        assert_eq!(sim.register(Register::PIXEL_CLOCK_CONTROL), 0x8004);

        let options = SensorOptions::default().with_pixel_clock(false, PixelClockDivider::Div128);
        configure(&mut sim, &options).unwrap();
        assert_eq!(sim.register(Register::PIXEL_CLOCK_CONTROL), 0x0040);
    }

    #[test]
    fn no_test_pattern_registers_touched_when_disabled() {
        let mut sim = SimSensor::new();
        configure(&mut sim, &SensorOptions::default()).unwrap();
        assert!(sim
            .writes()
            .iter()
            .all(|(reg, _)| *reg < Register::TEST_PATTERN_CONTROL));
    }

    #[test]
    fn failed_baseline_read_aborts_with_configuration_error() {
        let mut sim = SimSensor::new();
        sim.fail_reads_of(Register::READ_MODE_2);
        let err = configure(&mut sim, &SensorOptions::default()).unwrap_err();
        match err {
            Error::Configuration(e) => assert_eq!(e.register(), Register::READ_MODE_2),
            other => panic!("unexpected error {:?}", other),
        }
        // Nothing past the failure, in particular no chip enable
        let last = sim.writes().last().copied().unwrap();
        assert_eq!(last.0, Register::READ_MODE_1);
        assert!(sim.writes().iter().all(|(reg, _)| *reg != Register::OUTPUT_CONTROL));
    }

    #[test]
    fn failed_write_reports_first_register() {
        let mut sim = SimSensor::new();
        sim.fail_writes_of(Register::COLUMN_ADDRESS_MODE);
        let err = configure(&mut sim, &SensorOptions::default()).unwrap_err();
        match err {
            Error::BusTransfer(e) => assert_eq!(e.register(), Register::COLUMN_ADDRESS_MODE),
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(sim.writes().len(), 5);
    }

    #[test]
    fn failed_write_back_is_a_bus_error() {
        let mut sim = SimSensor::new();
        sim.fail_writes_of(Register::OUTPUT_CONTROL);
        let err = configure(&mut sim, &SensorOptions::default()).unwrap_err();
        match err {
            Error::BusTransfer(e) => assert_eq!(e.register(), Register::OUTPUT_CONTROL),
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(sim.register(Register::OUTPUT_CONTROL), 0x1F82);
    }
}
