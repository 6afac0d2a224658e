use linux_embedded_hal::sysfs_gpio::{Direction, Error as GpioError, Pin};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum Level {
    Low = 0x00,
    High = 0x01,
}

impl From<Level> for u8 {
    fn from(value: Level) -> Self {
        value as u8
    }
}

impl From<u8> for Level {
    fn from(value: u8) -> Self {
        if value == 0 {
            Level::Low
        } else {
            Level::High
        }
    }
}

/// BCM numbering of the Waveshare e-Paper HAT
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum KnownPin {
    /// Data/command control signal, write command (Command) when the level is low; write data (Data/parameter) when the level is high
    DataCommandPin = 25,
    /// Serial communication chip select
    SerialSelectPin = 8,
    /// Reset, active low
    ResetPin = 17,
    /// This pin indicates the driver status. Low while the controller is busy.
    BusyPin = 24,
}

impl From<KnownPin> for u64 {
    fn from(known_pin: KnownPin) -> Self {
        known_pin as u64
    }
}

impl KnownPin {
    pub fn direction(self) -> Direction {
        match self {
            KnownPin::BusyPin => Direction::In,
            _ => Direction::Low,
        }
    }

    /// Exports `number` through sysfs and configures it for this pin's role.
    /// Outputs start low.
    pub fn export(self, number: u64) -> Result<Pin, GpioError> {
        let pin = Pin::new(number);
        pin.export()?;
        pin.set_direction(self.direction())?;
        Ok(pin)
    }
}
