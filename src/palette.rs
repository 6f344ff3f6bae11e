//! Map color classification and shading.
//!
//! Every block carries a `MapColor` class. A class is rendered at one of four
//! brightness levels ("shade ids"); the shade permutation maps a normalized
//! rank (0 = lightest, 3 = darkest) onto those ids.

use image::Rgba;

/// Brightness multipliers (out of 255) indexed by shade id.
const SHADE_MULTIPLIERS: [u32; 4] = [180, 220, 255, 135];

/// Shade permutation: rank 0..3 (lightest..darkest) → shade id.
pub const SHADE_PERMUTATION: [u8; 4] = [2, 1, 0, 3];

/// Rank of the lightest entry in the shade permutation
pub const LIGHTEST_RANK: usize = 0;

/// Rank of the darkest entry in the shade permutation
pub const DARKEST_RANK: usize = 3;

/// Strength of the floor color blended over shallow liquids
pub const FLOOR_BLEND_STRENGTH: f64 = 0.25;

/// Reserved pixel marking a column that was rendered and found empty.
///
/// Alpha is neither 0 nor 255, so ordinary compositing (always opaque) and
/// untouched tile pixels (fully transparent) can never produce it.
pub const SENTINEL: Rgba<u8> = Rgba([255, 0, 255, 1]);

/// Fully transparent pixel; a column no pass has written yet
pub const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Map color class of a block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct MapColor(pub u8);

impl MapColor {
    pub const CLEAR: MapColor = MapColor(0);
    pub const GRASS: MapColor = MapColor(1);
    pub const SAND: MapColor = MapColor(2);
    pub const WOOL: MapColor = MapColor(3);
    pub const FIRE: MapColor = MapColor(4);
    pub const ICE: MapColor = MapColor(5);
    pub const METAL: MapColor = MapColor(6);
    pub const PLANT: MapColor = MapColor(7);
    pub const SNOW: MapColor = MapColor(8);
    pub const CLAY: MapColor = MapColor(9);
    pub const DIRT: MapColor = MapColor(10);
    pub const STONE: MapColor = MapColor(11);
    pub const WATER: MapColor = MapColor(12);
    pub const WOOD: MapColor = MapColor(13);
    pub const QUARTZ: MapColor = MapColor(14);
    pub const LAVA: MapColor = MapColor(15);
    pub const GRAVEL: MapColor = MapColor(16);
    pub const DEEPSLATE: MapColor = MapColor(17);

    /// Base color of each class, indexed by id
    const BASE_COLORS: [[u8; 3]; 18] = [
        [0, 0, 0],       // clear
        [127, 178, 56],  // grass
        [247, 233, 163], // sand
        [199, 199, 199], // wool
        [255, 0, 0],     // fire
        [160, 160, 255], // ice
        [167, 167, 167], // metal
        [0, 124, 0],     // plant
        [255, 255, 255], // snow
        [164, 168, 184], // clay
        [151, 109, 77],  // dirt
        [112, 112, 112], // stone
        [64, 64, 255],   // water
        [143, 119, 72],  // wood
        [255, 252, 245], // quartz
        [216, 127, 51],  // lava
        [136, 136, 120], // gravel
        [100, 100, 100], // deepslate
    ];

    pub fn is_clear(&self) -> bool {
        *self == MapColor::CLEAR
    }

    /// Unshaded base color; unknown ids render as clear
    pub fn base(&self) -> [u8; 3] {
        Self::BASE_COLORS
            .get(self.0 as usize)
            .copied()
            .unwrap_or(Self::BASE_COLORS[0])
    }

    /// Color of this class at a renderer shade id (0..=3)
    pub fn render(&self, shade_id: u8) -> [u8; 3] {
        let mul = SHADE_MULTIPLIERS[(shade_id & 3) as usize];
        let [r, g, b] = self.base();
        [
            (r as u32 * mul / 255) as u8,
            (g as u32 * mul / 255) as u8,
            (b as u32 * mul / 255) as u8,
        ]
    }
}

/// Shade id at a normalized rank (0 lightest .. 3 darkest)
pub fn shade_at(rank: usize) -> u8 {
    SHADE_PERMUTATION[rank.min(DARKEST_RANK)]
}

/// Half-up rounding: a fractional part of 0.5 or more rounds towards +∞.
///
/// Only meaningful for non-negative inputs.
pub fn round_half_up(val: f64) -> usize {
    let floor = val.floor();
    if val - floor >= 0.5 {
        floor as usize + 1
    } else {
        floor as usize
    }
}

/// Add a scaled overlay onto a base color, saturating each channel.
pub fn blend(base: [u8; 3], overlay: [u8; 3], strength: f64) -> [u8; 3] {
    let mut out = [0u8; 3];
    for i in 0..3 {
        let add = (strength * overlay[i] as f64) as i32;
        out[i] = (base[i] as i32 + add).clamp(0, 255) as u8;
    }
    out
}

/// Opaque pixel from an RGB triple
pub fn opaque(rgb: [u8; 3]) -> Rgba<u8> {
    Rgba([rgb[0], rgb[1], rgb[2], 255])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_half_up() {
        assert_eq!(round_half_up(2.5), 3);
        assert_eq!(round_half_up(2.4), 2);
        assert_eq!(round_half_up(0.0), 0);
        assert_eq!(round_half_up(1.5), 2);
        assert_eq!(round_half_up(2.9999), 3);
    }

    #[test]
    fn test_shade_ranks_order_light_to_dark() {
        let brightness = |rank| MapColor::SNOW.render(shade_at(rank))[0];
        assert!(brightness(LIGHTEST_RANK) > brightness(1));
        assert!(brightness(1) > brightness(2));
        assert!(brightness(2) > brightness(DARKEST_RANK));
        assert_eq!(MapColor::SNOW.render(shade_at(LIGHTEST_RANK)), [255, 255, 255]);
    }

    #[test]
    fn test_blend_saturates() {
        assert_eq!(blend([250, 10, 0], [255, 40, 3], FLOOR_BLEND_STRENGTH), [255, 20, 0]);
        assert_eq!(blend([1, 2, 3], [0, 0, 0], FLOOR_BLEND_STRENGTH), [1, 2, 3]);
    }

    #[test]
    fn test_sentinel_is_distinguishable() {
        assert_ne!(SENTINEL[3], 255);
        assert_ne!(SENTINEL, TRANSPARENT);
        assert_eq!(opaque(MapColor::CLEAR.render(0))[3], 255);
    }

    #[test]
    fn test_unknown_class_renders_clear_color() {
        assert_eq!(MapColor(200).base(), [0, 0, 0]);
    }
}
