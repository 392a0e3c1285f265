//! render/colormap.rs — scalar → color lookup by piecewise-linear anchors.

use std::str::FromStr;

use plotters::style::RGBColor;

use crate::error::Error;

const VIRIDIS: &[(u8, u8, u8)] = &[
    (68, 1, 84),
    (71, 44, 122),
    (59, 82, 139),
    (44, 113, 142),
    (33, 145, 140),
    (39, 173, 129),
    (92, 200, 99),
    (170, 220, 50),
    (253, 231, 37),
];

const RDBU: &[(u8, u8, u8)] = &[
    (103, 0, 31),
    (178, 24, 43),
    (214, 96, 77),
    (244, 165, 130),
    (253, 219, 199),
    (247, 247, 247),
    (209, 229, 240),
    (146, 197, 222),
    (67, 147, 195),
    (33, 102, 172),
    (5, 48, 97),
];

pub const NAN_COLOR: RGBColor = RGBColor(200, 200, 200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Colormap {
    anchors: &'static [(u8, u8, u8)],
    reversed: bool,
}

impl FromStr for Colormap {
    type Err = Error;

    /// `viridis`, `RdBu`, each optionally suffixed with `_r`.
    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let (base, reversed) = match name.strip_suffix("_r") {
            Some(base) => (base, true),
            None => (name, false),
        };
        let anchors = match base.to_ascii_lowercase().as_str() {
            "viridis" => VIRIDIS,
            "rdbu" => RDBU,
            _ => return Err(Error::Config(format!("unknown colormap {name:?}"))),
        };
        Ok(Self { anchors, reversed })
    }
}

impl Colormap {
    /// Color at `t` in `[0, 1]` (clamped).
    pub fn at(&self, t: f64) -> RGBColor {
        let t = t.clamp(0.0, 1.0);
        let t = if self.reversed { 1.0 - t } else { t };
        let last = self.anchors.len() - 1;
        let pos = t * last as f64;
        let i = (pos.floor() as usize).min(last - 1);
        let frac = pos - i as f64;
        let (a, b) = (self.anchors[i], self.anchors[i + 1]);
        let lerp = |x: u8, y: u8| (x as f64 + (y as f64 - x as f64) * frac).round() as u8;
        RGBColor(lerp(a.0, b.0), lerp(a.1, b.1), lerp(a.2, b.2))
    }

    /// Color of `value` on the range `[vmin, vmax]`; NaN maps to `NAN_COLOR`.
    pub fn map(&self, value: f64, vmin: f64, vmax: f64) -> RGBColor {
        if value.is_nan() {
            return NAN_COLOR;
        }
        let span = vmax - vmin;
        let t = if span > 0.0 { (value - vmin) / span } else { 0.5 };
        self.at(t)
    }
}

/// Finite min and max of `values`, or `(-1, 1)` when there are none.
pub fn finite_range(values: &[f64]) -> (f64, f64) {
    let (lo, hi) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if lo.is_finite() { (lo, hi) } else { (-1.0, 1.0) }
}
