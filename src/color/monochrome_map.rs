use crate::color::Tone;
use image::imageops::ColorMap;
use image::Rgba;

const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);
const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Nearest-tone lookup against the two colors the panel can show.
///
/// Distance is the squared difference over premultiplied RGBA, so a fully
/// transparent pixel counts as black and saturated colors land on black.
/// Ties go to dark.
pub struct MonochromeMap {
    colormap: [(Tone, Rgba<u8>); 2],
}

impl MonochromeMap {
    pub fn new() -> Self {
        Self {
            colormap: [(Tone::Dark, BLACK), (Tone::Light, WHITE)],
        }
    }

    pub fn tone_of(&self, color: &Rgba<u8>) -> Tone {
        Tone::from(self.index_of(color))
    }
}

impl Default for MonochromeMap {
    fn default() -> Self {
        Self::new()
    }
}

fn premultiply(color: &Rgba<u8>) -> Rgba<u8> {
    let [r, g, b, a] = color.0;
    let scale = |channel: u8| ((channel as u16 * a as u16 + 127) / 255) as u8;
    Rgba([scale(r), scale(g), scale(b), a])
}

fn squared_distance(left: &Rgba<u8>, right: &Rgba<u8>) -> u32 {
    left.0
        .iter()
        .zip(right.0.iter())
        .map(|(l, r)| {
            let diff = l.abs_diff(*r) as u32;
            diff * diff
        })
        .sum()
}

impl ColorMap for MonochromeMap {
    type Color = Rgba<u8>;

    fn index_of(&self, color: &Self::Color) -> usize {
        let color = premultiply(color);
        let [(dark_tone, dark), (light_tone, light)] = self.colormap;
        let tone = if squared_distance(&light, &color) < squared_distance(&dark, &color) {
            light_tone
        } else {
            dark_tone
        };
        tone as usize
    }

    fn lookup(&self, index: usize) -> Option<Self::Color> {
        let tone = Tone::from(index);
        self.colormap
            .iter()
            .find(|(entry, _)| *entry == tone)
            .map(|(_, color)| *color)
    }

    fn has_lookup(&self) -> bool {
        true
    }

    fn map_color(&self, color: &mut Self::Color) {
        if let Some(new_color) = self.lookup(self.index_of(color)) {
            *color = new_color;
        }
    }
}
