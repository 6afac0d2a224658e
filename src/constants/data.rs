use crate::display_constants::{HEIGHT, WIDTH};

/// VCOM, VGH/VGL and source voltages for the V2 panel, ordered as the
/// vendor examples index them
const VOLTAGE_FRAME: [u8; 7] = [0x06, 0x3F, 0x3F, 0x11, 0x24, 0x07, 0x17];

pub(super) const POWER_SETTING_DATA: [u8; 5] = [
    0x17, // internal power
    VOLTAGE_FRAME[6], // VGH & VGL
    VOLTAGE_FRAME[1], // VSH
    VOLTAGE_FRAME[2], // VSL
    VOLTAGE_FRAME[3], // VSHR
];
pub(super) const VCM_DC_SETTING_DATA: [u8; 1] = [VOLTAGE_FRAME[0]];
pub(super) const BOOSTER_SOFT_START_DATA: [u8; 4] = [0x27, 0x27, 0x2F, 0x17];
// 0b0110 = 50Hz
pub(super) const PLL_CONTROL_DATA: [u8; 1] = [VOLTAGE_FRAME[0]];
// LUT from OTP, K/W mode
pub(super) const PANEL_SETTING_DATA: [u8; 1] = [0x1F];
pub(super) const TCON_RESOLUTION_DATA: [u8; 4] = [
    (WIDTH >> 8) as u8,
    (WIDTH & 0xFF) as u8,
    (HEIGHT >> 8) as u8,
    (HEIGHT & 0xFF) as u8,
];
pub(super) const DUAL_SPI_DATA: [u8; 1] = [0x00];
pub(super) const VCOM_AND_DATA_INTERVAL_DATA: [u8; 2] = [0x10, 0x07];
pub(super) const TCON_SETTING_DATA: [u8; 1] = [0x22];
pub(super) const GATE_SOURCE_START_DATA: [u8; 4] = [0x00, 0x00, 0x00, 0x00];

pub(super) const DEEP_SLEEP_DATA: [u8; 1] = [0xA5];
