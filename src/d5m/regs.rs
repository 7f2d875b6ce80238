//! Register map of the MT9P031 sensor on the TRDB-D5M camera board. Registers are addressed
//! with an 8-bit identifier and hold 16-bit values.

/// Device register addresses.
pub struct Register;

impl Register {
    pub const CHIP_VERSION: u8 = 0x00;
    pub const ROW_START: u8 = 0x01;
    pub const COLUMN_START: u8 = 0x02;
    pub const ROW_SIZE: u8 = 0x03;
    pub const COLUMN_SIZE: u8 = 0x04;
    pub const HORIZONTAL_BLANK: u8 = 0x05;
    pub const VERTICAL_BLANK: u8 = 0x06;
    pub const OUTPUT_CONTROL: u8 = 0x07;
    pub const SHUTTER_WIDTH_UPPER: u8 = 0x08;
    pub const SHUTTER_WIDTH_LOWER: u8 = 0x09;
    pub const PIXEL_CLOCK_CONTROL: u8 = 0x0A;
    pub const RESTART: u8 = 0x0B;
    pub const SHUTTER_DELAY: u8 = 0x0C;
    pub const RESET: u8 = 0x0D;
    pub const PLL_CONTROL: u8 = 0x10;
    pub const PLL_CONFIG_1: u8 = 0x11;
    pub const PLL_CONFIG_2: u8 = 0x12;
    pub const READ_MODE_1: u8 = 0x1E;
    pub const READ_MODE_2: u8 = 0x20;
    pub const ROW_ADDRESS_MODE: u8 = 0x22;
    pub const COLUMN_ADDRESS_MODE: u8 = 0x23;
    pub const GREEN1_GAIN: u8 = 0x2B;
    pub const BLUE_GAIN: u8 = 0x2C;
    pub const RED_GAIN: u8 = 0x2D;
    pub const GREEN2_GAIN: u8 = 0x2E;
    pub const GLOBAL_GAIN: u8 = 0x35;
    pub const ROW_BLACK_TARGET: u8 = 0x49;
    pub const ROW_BLACK_DEFAULT_OFFSET: u8 = 0x4B;
    pub const TEST_PATTERN_CONTROL: u8 = 0xA0;
    pub const TEST_PATTERN_GREEN: u8 = 0xA1;
    pub const TEST_PATTERN_RED: u8 = 0xA2;
    pub const TEST_PATTERN_BLUE: u8 = 0xA3;
    pub const TEST_PATTERN_BAR_WIDTH: u8 = 0xA4;
    pub const CHIP_VERSION_ALT: u8 = 0xFF;

    /// Look up the documentation entry for a register identifier.
    pub fn info(id: u8) -> Option<&'static RegisterInfo> {
        DOCUMENTED.iter().find(|info| info.id == id)
    }

    /// Human readable name, as printed in the diagnostic dump.
    pub fn name(id: u8) -> Option<&'static str> {
        Self::info(id).map(|info| info.name)
    }

    /// Power-on value according to the datasheet.
    pub fn default_value(id: u8) -> Option<u16> {
        Self::info(id).map(|info| info.default)
    }

    /// Whether the configurator is allowed to touch this identifier at all.
    pub fn is_documented(id: u8) -> bool {
        Self::info(id).is_some()
    }
}

/// Identifier, name and power-on default of one documented register.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RegisterInfo {
    pub id: u8,
    pub name: &'static str,
    pub default: u16,
}

const fn reg(id: u8, name: &'static str, default: u16) -> RegisterInfo {
    RegisterInfo { id, name, default }
}

/// Every register this driver knows about, in address order.
pub const DOCUMENTED: [RegisterInfo; 34] = [
    reg(Register::CHIP_VERSION, "CHIP_VERSION", 0x1801),
    reg(Register::ROW_START, "ROW_START", 0x0036),
    reg(Register::COLUMN_START, "COLUMN_START", 0x0010),
    reg(Register::ROW_SIZE, "ROW_SIZE", 0x0797),
    reg(Register::COLUMN_SIZE, "COLUMN_SIZE", 0x0A1F),
    reg(Register::HORIZONTAL_BLANK, "HORIZONTAL_BLANK", 0x0000),
    reg(Register::VERTICAL_BLANK, "VERTICAL_BLANK", 0x0019),
    reg(Register::OUTPUT_CONTROL, "OUTPUT_CONTROL", 0x1F82),
    reg(Register::SHUTTER_WIDTH_UPPER, "SHUTTER_WIDTH_UPPER", 0x0000),
    reg(Register::SHUTTER_WIDTH_LOWER, "SHUTTER_WIDTH_LOWER", 0x0797),
    reg(Register::PIXEL_CLOCK_CONTROL, "PIXEL_CLOCK_CONTROL", 0x0000),
    reg(Register::RESTART, "RESTART", 0x0000),
    reg(Register::SHUTTER_DELAY, "SHUTTER_DELAY", 0x0000),
    reg(Register::RESET, "RESET", 0x0000),
    reg(Register::PLL_CONTROL, "PLL_CONTROL", 0x0050),
    reg(Register::PLL_CONFIG_1, "PLL_CONFIG_1", 0x6404),
    reg(Register::PLL_CONFIG_2, "PLL_CONFIG_2", 0x0000),
    reg(Register::READ_MODE_1, "READ_MODE_1", 0x4006),
    reg(Register::READ_MODE_2, "READ_MODE_2", 0x0007),
    reg(Register::ROW_ADDRESS_MODE, "ROW_ADDRESS_MODE", 0x8000),
    reg(Register::COLUMN_ADDRESS_MODE, "COLUMN_ADDRESS_MODE", 0x0007),
    reg(Register::GREEN1_GAIN, "GREEN1_GAIN", 0x0007),
    reg(Register::BLUE_GAIN, "BLUE_GAIN", 0x0004),
    reg(Register::RED_GAIN, "RED_GAIN", 0x0001),
    reg(Register::GREEN2_GAIN, "GREEN2_GAIN", 0x005A),
    reg(Register::GLOBAL_GAIN, "GLOBAL_GAIN", 0x231D),
    reg(Register::ROW_BLACK_TARGET, "ROW_BLACK_TARGET", 0xA700),
    reg(Register::ROW_BLACK_DEFAULT_OFFSET, "ROW_BLACK_DEFAULT_OFFSET", 0x0C00),
    reg(Register::TEST_PATTERN_CONTROL, "TEST_PATTERN_CONTROL", 0x0000),
    reg(Register::TEST_PATTERN_GREEN, "TEST_PATTERN_GREEN", 0x0000),
    reg(Register::TEST_PATTERN_RED, "TEST_PATTERN_RED", 0x0000),
    reg(Register::TEST_PATTERN_BLUE, "TEST_PATTERN_BLUE", 0x0000),
    reg(Register::TEST_PATTERN_BAR_WIDTH, "TEST_PATTERN_BAR_WIDTH", 0x0000),
    reg(Register::CHIP_VERSION_ALT, "CHIP_VERSION_ALT", 0x1801),
];

/// Bit masks and field positions.
pub struct Bits;

impl Bits {
    // OUTPUT_CONTROL
    pub const CHIP_ENABLE: u16 = 1 << 1;

    // READ_MODE_1
    pub const SNAPSHOT: u16 = 1 << 8;

    // READ_MODE_2
    pub const MIRROR_ROW: u16 = 1 << 15;
    pub const MIRROR_COLUMN: u16 = 1 << 14;

    // PIXEL_CLOCK_CONTROL
    pub const INVERT_PIXCLK: u16 = 1 << 15;
    pub const DIVIDE_PIXCLK_POS: u16 = 0;

    // ROW_ADDRESS_MODE / COLUMN_ADDRESS_MODE
    pub const BIN_POS: u16 = 4;
    pub const BIN_MASK: u16 = 0b11 << Self::BIN_POS;
    pub const SKIP_POS: u16 = 0;
    pub const SKIP_MASK: u16 = 0b111 << Self::SKIP_POS;

    // TEST_PATTERN_CONTROL
    pub const ENABLE_TEST_PATTERN: u16 = 1 << 0;
    pub const TEST_PATTERN_POS: u16 = 3;
}
