pub mod monochrome_map;

/// Whether a light pixel is sent as a set bit. Tuned against the V2 panel:
/// after initialization an all-zero plane renders white.
pub const LIGHT_BIT: bool = false;

/// Tone used for padding and for every pixel outside the source image.
pub const BACKGROUND: Tone = Tone::Light;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Tone {
    Dark = 0x00,
    Light = 0x01,
}

impl Tone {
    pub fn bit(self) -> bool {
        match self {
            Tone::Light => LIGHT_BIT,
            Tone::Dark => !LIGHT_BIT,
        }
    }

    pub fn from_bit(bit: bool) -> Self {
        if bit == LIGHT_BIT {
            Tone::Light
        } else {
            Tone::Dark
        }
    }

    /// A byte of eight pixels of this tone
    pub fn fill_byte(self) -> u8 {
        if self.bit() {
            0xFF
        } else {
            0x00
        }
    }
}

impl From<usize> for Tone {
    fn from(value: usize) -> Self {
        match value {
            0 => Tone::Dark,
            _ => Tone::Light,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_round_trips_for_both_tones() {
        for tone in [Tone::Dark, Tone::Light] {
            assert_eq!(Tone::from_bit(tone.bit()), tone);
        }
        assert_ne!(Tone::Dark.bit(), Tone::Light.bit());
    }

    #[test]
    fn background_clears_to_zero_bytes() {
        assert_eq!(BACKGROUND.fill_byte(), 0x00);
        assert_eq!(Tone::Dark.fill_byte(), 0xFF);
    }
}
