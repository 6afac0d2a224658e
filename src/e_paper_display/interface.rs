use crate::config::PanelConfig;
use crate::constants::known_pin::Level::{High, Low};
use crate::constants::known_pin::{KnownPin, Level};
use crate::e_paper_display::EpdError;
use embedded_hal::spi::SpiDevice;
use linux_embedded_hal::spidev::{SpiModeFlags, SpidevOptions};
use linux_embedded_hal::sysfs_gpio::Pin;
use linux_embedded_hal::SpidevDevice;
use tracing::debug;

/// spidev rejects single transfers above its buffer size
const SPI_BLOCK_SIZE: usize = 4096;

/// The wire-level half of the panel protocol: command/data framing on the
/// serial bus plus the reset and busy lines.
pub trait PanelInterface {
    fn send_command(&mut self, command: u8) -> Result<(), EpdError>;
    fn send_data(&mut self, data: &[u8]) -> Result<(), EpdError>;
    fn set_reset(&mut self, level: Level) -> Result<(), EpdError>;
    fn is_busy(&mut self) -> Result<bool, EpdError>;
}

#[derive(Debug, Copy, Clone, PartialEq)]
enum SendMode {
    Command,
    Data,
}

/// `/dev/spidev*` bus plus four sysfs GPIO lines.
pub struct SpidevInterface {
    spi: SpidevDevice,
    data_or_cmd_pin: Pin,
    chip_select_pin: Pin,
    reset_pin: Pin,
    busy_pin: Pin,
    send_mode: SendMode,
}

impl SpidevInterface {
    pub fn open(config: &PanelConfig) -> Result<SpidevInterface, EpdError> {
        let data_or_cmd_pin = KnownPin::DataCommandPin.export(config.dc_pin)?;
        let chip_select_pin = KnownPin::SerialSelectPin.export(config.cs_pin)?;
        let reset_pin = KnownPin::ResetPin.export(config.rst_pin)?;
        let busy_pin = KnownPin::BusyPin.export(config.busy_pin)?;

        let mut spi = SpidevDevice::open(&config.spi_device)?;
        let options = SpidevOptions::new()
            .bits_per_word(8)
            .max_speed_hz(config.spi_hz)
            .mode(SpiModeFlags::SPI_MODE_0)
            .build();
        spi.configure(&options)?;
        debug!(
            "opened {} at {}Hz (dc {}, cs {}, rst {}, busy {})",
            config.spi_device.display(),
            config.spi_hz,
            config.dc_pin,
            config.cs_pin,
            config.rst_pin,
            config.busy_pin
        );

        Ok(SpidevInterface {
            spi,
            data_or_cmd_pin,
            chip_select_pin,
            reset_pin,
            busy_pin,
            send_mode: SendMode::Command,
        })
    }

    fn set_send_mode(&mut self, send_mode: SendMode) -> Result<(), EpdError> {
        if send_mode == self.send_mode {
            return Ok(());
        }
        let level = match send_mode {
            SendMode::Command => Low,
            SendMode::Data => High,
        };
        self.data_or_cmd_pin.set_value(level.into())?;
        self.send_mode = send_mode;
        Ok(())
    }

    fn write_selected(&mut self, bytes: &[u8]) -> Result<(), EpdError> {
        self.chip_select_pin.set_value(Low.into())?;
        let written = bytes
            .chunks(SPI_BLOCK_SIZE)
            .try_for_each(|block| self.spi.write(block));
        self.chip_select_pin.set_value(High.into())?;
        Ok(written?)
    }
}

impl PanelInterface for SpidevInterface {
    fn send_command(&mut self, command: u8) -> Result<(), EpdError> {
        self.set_send_mode(SendMode::Command)?;
        self.write_selected(&[command])
    }

    fn send_data(&mut self, data: &[u8]) -> Result<(), EpdError> {
        self.set_send_mode(SendMode::Data)?;
        self.write_selected(data)
    }

    fn set_reset(&mut self, level: Level) -> Result<(), EpdError> {
        self.reset_pin.set_value(level.into())?;
        Ok(())
    }

    fn is_busy(&mut self) -> Result<bool, EpdError> {
        Ok(Level::from(self.busy_pin.get_value()?) == Low)
    }
}

impl Drop for SpidevInterface {
    fn drop(&mut self) {
        // we're going to ignore errors here...
        let _ = self.chip_select_pin.set_value(Low.into());
        let _ = self.data_or_cmd_pin.set_value(Low.into());
        let _ = self.reset_pin.set_value(Low.into());
    }
}
