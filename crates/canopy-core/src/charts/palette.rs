//! Colour maps used by the charts.

use plotters::style::RGBColor;

/// A colour map given by evenly spaced stops, interpolated linearly.
#[derive(Debug, Clone, Copy)]
pub struct ColorMap(&'static [(u8, u8, u8)]);

pub const REDS: ColorMap = ColorMap(&[
    (255, 245, 240),
    (254, 224, 210),
    (252, 187, 161),
    (252, 146, 114),
    (251, 106, 74),
    (239, 59, 44),
    (203, 24, 29),
    (165, 15, 21),
    (103, 0, 13),
]);

pub const GREENS: ColorMap = ColorMap(&[
    (247, 252, 245),
    (229, 245, 224),
    (199, 233, 192),
    (161, 217, 155),
    (116, 196, 118),
    (65, 171, 93),
    (35, 139, 69),
    (0, 109, 44),
    (0, 68, 27),
]);

pub const COOLWARM: ColorMap = ColorMap(&[
    (59, 76, 192),
    (124, 159, 249),
    (221, 221, 221),
    (244, 154, 123),
    (180, 4, 38),
]);

pub const TAB20: [RGBColor; 20] = [
    RGBColor(0x1f, 0x77, 0xb4),
    RGBColor(0xae, 0xc7, 0xe8),
    RGBColor(0xff, 0x7f, 0x0e),
    RGBColor(0xff, 0xbb, 0x78),
    RGBColor(0x2c, 0xa0, 0x2c),
    RGBColor(0x98, 0xdf, 0x8a),
    RGBColor(0xd6, 0x27, 0x28),
    RGBColor(0xff, 0x98, 0x96),
    RGBColor(0x94, 0x67, 0xbd),
    RGBColor(0xc5, 0xb0, 0xd5),
    RGBColor(0x8c, 0x56, 0x4b),
    RGBColor(0xc4, 0x9c, 0x94),
    RGBColor(0xe3, 0x77, 0xc2),
    RGBColor(0xf7, 0xb6, 0xd2),
    RGBColor(0x7f, 0x7f, 0x7f),
    RGBColor(0xc7, 0xc7, 0xc7),
    RGBColor(0xbc, 0xbd, 0x22),
    RGBColor(0xdb, 0xdb, 0x8d),
    RGBColor(0x17, 0xbe, 0xcf),
    RGBColor(0x9e, 0xda, 0xe5),
];

pub const ORANGE: RGBColor = RGBColor(255, 165, 0);

/// Fill for cells with no defined value.
pub const UNDEFINED: RGBColor = RGBColor(0xf0, 0xf0, 0xf0);

impl ColorMap {
    /// Colour at `t` in `[0, 1]`; out-of-range and NaN values clamp.
    pub fn at(&self, t: f64) -> RGBColor {
        let stops = self.0;
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        let pos = t * (stops.len() - 1) as f64;
        let i = (pos.floor() as usize).min(stops.len() - 2);
        let f = pos - i as f64;
        let lerp = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * f).round() as u8;
        let (a, b) = (stops[i], stops[i + 1]);
        RGBColor(lerp(a.0, b.0), lerp(a.1, b.1), lerp(a.2, b.2))
    }

    /// `n` discrete colours from the interior of the map, like a
    /// categorical palette drawn from it. `reversed` starts at the dark end.
    pub fn sample(&self, n: usize, reversed: bool) -> Vec<RGBColor> {
        (1..=n)
            .map(|k| {
                let t = k as f64 / (n + 1) as f64;
                self.at(if reversed { 1.0 - t } else { t })
            })
            .collect()
    }
}

/// Categorical colour `i`, cycling.
pub fn tab20(i: usize) -> RGBColor {
    TAB20[i % TAB20.len()]
}
