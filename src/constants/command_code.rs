use crate::constants::data::*;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandCode {
    PanelSetting = 0x00,
    PowerSetting = 0x01,
    PowerOff = 0x02,
    PowerOn = 0x04,
    BoosterSoftStart = 0x06,
    DeepSleep = 0x07,
    /// "old" plane
    DataStartTransmission1 = 0x10,
    DataStop = 0x11,
    DisplayRefresh = 0x12,
    /// "new" plane, the one shown in K/W mode
    DataStartTransmission2 = 0x13,
    DualSpi = 0x15,
    PllControl = 0x30,
    VcomAndDataInterval = 0x50,
    TconSetting = 0x60,
    TconResolution = 0x61,
    GateSourceStart = 0x65,
    VcmDcSetting = 0x82,
}

impl CommandCode {
    pub fn cmd(self) -> u8 {
        self as u8
    }

    pub fn data<'a>(&self) -> Option<&'a [u8]> {
        match self {
            CommandCode::PanelSetting => Some(&PANEL_SETTING_DATA),
            CommandCode::PowerSetting => Some(&POWER_SETTING_DATA),
            CommandCode::PowerOff => None,
            CommandCode::PowerOn => None,
            CommandCode::BoosterSoftStart => Some(&BOOSTER_SOFT_START_DATA),
            CommandCode::DeepSleep => Some(&DEEP_SLEEP_DATA),
            CommandCode::DataStartTransmission1 => None, // the payload is the frame itself
            CommandCode::DataStop => None,
            CommandCode::DisplayRefresh => None,
            CommandCode::DataStartTransmission2 => None, // the payload is the frame itself
            CommandCode::DualSpi => Some(&DUAL_SPI_DATA),
            CommandCode::PllControl => Some(&PLL_CONTROL_DATA),
            CommandCode::VcomAndDataInterval => Some(&VCOM_AND_DATA_INTERVAL_DATA),
            CommandCode::TconSetting => Some(&TCON_SETTING_DATA),
            CommandCode::TconResolution => Some(&TCON_RESOLUTION_DATA),
            CommandCode::GateSourceStart => Some(&GATE_SOURCE_START_DATA),
            CommandCode::VcmDcSetting => Some(&VCM_DC_SETTING_DATA),
        }
    }
}
