use crate::color::monochrome_map::MonochromeMap;
use crate::color::{Tone, BACKGROUND};
use crate::display_constants::row_bytes;
use image::{GenericImageView, Rgba};

/// A packed 1-bit-per-pixel bitmap in panel byte order: rows top to bottom,
/// eight horizontal pixels per byte, most significant bit first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: usize,
    height: usize,
    bytes: Vec<u8>,
}

impl Frame {
    pub fn filled(tone: Tone, width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            bytes: vec![tone.fill_byte(); row_bytes(width) * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn row_bytes(&self) -> usize {
        row_bytes(self.width)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Reads back one bit. `x` may address the padding bits past `width`.
    pub fn tone_at(&self, x: usize, y: usize) -> Tone {
        let byte = self.bytes[y * self.row_bytes() + x / 8];
        Tone::from_bit(byte & (0x80 >> (x % 8)) != 0)
    }
}

/// Maps `image` onto a `width` x `height` panel without scaling: pixels past
/// the image bounds, and the padding bits of the last byte in each row, take
/// the background tone.
pub fn convert<I>(image: &I, width: usize, height: usize) -> Frame
where
    I: GenericImageView<Pixel = Rgba<u8>>,
{
    let map = MonochromeMap::new();
    let (image_width, image_height) = image.dimensions();
    let row_bytes = row_bytes(width);
    let mut bytes = Vec::with_capacity(row_bytes * height);

    for y in 0..height {
        for byte_index in 0..row_bytes {
            let mut byte_to_send = 0u8;
            for bit in 0..8 {
                let x = byte_index * 8 + bit;
                let tone = if x < width && x < image_width as usize && y < image_height as usize {
                    map.tone_of(&image.get_pixel(x as u32, y as u32))
                } else {
                    BACKGROUND
                };
                if tone.bit() {
                    byte_to_send |= 0x80 >> bit;
                }
            }
            bytes.push(byte_to_send);
        }
    }

    Frame {
        width,
        height,
        bytes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display_constants::{FRAME_BYTES, HEIGHT, WIDTH};
    use image::{DynamicImage, RgbaImage};
    use proptest::prelude::*;

    const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);
    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

    fn tone_color(dark: bool) -> Rgba<u8> {
        if dark {
            BLACK
        } else {
            WHITE
        }
    }

    #[test]
    fn small_light_image_on_full_panel_is_all_background() {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(3, 1, WHITE));
        let frame = convert(&image, WIDTH, HEIGHT);

        assert_eq!(frame.row_bytes(), 100);
        assert_eq!(frame.len(), 48_000);
        assert_eq!(frame.len(), FRAME_BYTES);
        for x in 0..WIDTH {
            assert_eq!(frame.tone_at(x, 0), BACKGROUND);
        }
        assert!(frame.as_bytes().iter().all(|b| *b == BACKGROUND.fill_byte()));
    }

    #[test]
    fn dark_pixels_pack_msb_first() {
        let mut image = RgbaImage::from_pixel(16, 2, WHITE);
        image.put_pixel(0, 0, BLACK);
        image.put_pixel(9, 1, BLACK);
        let frame = convert(&image, 16, 2);

        let dark = Tone::Dark.bit();
        let expect = |mask: u8| if dark { mask } else { !mask };
        assert_eq!(frame.as_bytes(), &[expect(0x80), expect(0x00), expect(0x00), expect(0x40)]);
    }

    #[test]
    fn partial_last_byte_is_padded_with_background() {
        let image = RgbaImage::from_pixel(10, 1, BLACK);
        let frame = convert(&image, 10, 1);

        assert_eq!(frame.len(), 2);
        for x in 0..10 {
            assert_eq!(frame.tone_at(x, 0), Tone::Dark);
        }
        for x in 10..16 {
            assert_eq!(frame.tone_at(x, 0), BACKGROUND);
        }
    }

    #[test]
    fn oversized_image_is_truncated() {
        let mut image = RgbaImage::from_pixel(20, 5, WHITE);
        image.put_pixel(19, 4, BLACK);
        image.put_pixel(7, 1, BLACK);
        let frame = convert(&image, 8, 2);

        assert_eq!(frame.len(), 2);
        assert_eq!(frame.tone_at(7, 1), Tone::Dark);
        assert_eq!(frame.tone_at(0, 0), Tone::Light);
    }

    #[test]
    fn filled_frame_has_uniform_tone() {
        let frame = Frame::filled(Tone::Dark, 12, 3);
        assert_eq!(frame.len(), 6);
        assert_eq!(frame.tone_at(11, 2), Tone::Dark);
    }

    proptest! {
        #[test]
        fn row_bytes_is_ceil_of_width_over_eight(width in 0usize..4096) {
            prop_assert_eq!(row_bytes(width), (width + 7) / 8);
        }

        #[test]
        fn frame_length_depends_only_on_panel_size(
            width in 1usize..64,
            height in 1usize..16,
            image_width in 1u32..80,
            image_height in 1u32..20,
        ) {
            let image = RgbaImage::from_pixel(image_width, image_height, BLACK);
            let frame = convert(&image, width, height);
            prop_assert_eq!(frame.len(), row_bytes(width) * height);
        }

        #[test]
        fn covering_image_is_quantized_bit_exact(
            width in 1usize..40,
            height in 1usize..12,
            pixels in proptest::collection::vec(any::<bool>(), 40 * 12),
        ) {
            let image = RgbaImage::from_fn(width as u32, height as u32, |x, y| {
                tone_color(pixels[y as usize * 40 + x as usize])
            });
            let frame = convert(&image, width, height);
            for y in 0..height {
                for x in 0..width {
                    let expected = if pixels[y * 40 + x] { Tone::Dark } else { Tone::Light };
                    prop_assert_eq!(frame.tone_at(x, y), expected);
                }
            }
        }

        #[test]
        fn pixels_outside_a_small_image_are_background(
            width in 8usize..48,
            height in 2usize..12,
            image_width in 1u32..8,
            image_height in 1u32..12,
            pixels in proptest::collection::vec(any::<bool>(), 8 * 12),
        ) {
            let image = RgbaImage::from_fn(image_width, image_height, |x, y| {
                tone_color(pixels[y as usize * 8 + x as usize])
            });
            let frame = convert(&image, width, height);
            for y in 0..height {
                for x in 0..frame.row_bytes() * 8 {
                    if x >= image_width as usize || y >= image_height as usize {
                        prop_assert_eq!(frame.tone_at(x, y), BACKGROUND);
                    } else {
                        let expected = if pixels[y * 8 + x] { Tone::Dark } else { Tone::Light };
                        prop_assert_eq!(frame.tone_at(x, y), expected);
                    }
                }
            }
        }

        #[test]
        fn conversion_is_deterministic(seed in any::<u64>()) {
            let image = RgbaImage::from_fn(13, 7, |x, y| {
                let v = (seed.rotate_left(x + y * 13) & 0xFF) as u8;
                Rgba([v, v.wrapping_mul(3), v.wrapping_add(90), 255])
            });
            prop_assert_eq!(convert(&image, 16, 8), convert(&image, 16, 8));
        }
    }
}
