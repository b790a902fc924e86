// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use serde::{Deserialize, Serialize};

use super::easing::lerp_u8;

/// An RGB color as written to fixture channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

pub const BLACK: Color = Color { r: 0, g: 0, b: 0 };
pub const WHITE: Color = Color {
    r: 255,
    g: 255,
    b: 255,
};

impl Color {
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Converts an HSV color to RGB. Hue is in degrees, saturation and value
    /// are in [0, 1].
    pub fn from_hsv(h: f64, s: f64, v: f64) -> Self {
        let h = h.rem_euclid(360.0);
        let c = v * s;
        let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
        let m = v - c;

        let (r, g, b) = if h < 60.0 {
            (c, x, 0.0)
        } else if h < 120.0 {
            (x, c, 0.0)
        } else if h < 180.0 {
            (0.0, c, x)
        } else if h < 240.0 {
            (0.0, x, c)
        } else if h < 300.0 {
            (x, 0.0, c)
        } else {
            (c, 0.0, x)
        };

        Self {
            r: ((r + m) * 255.0) as u8,
            g: ((g + m) * 255.0) as u8,
            b: ((b + m) * 255.0) as u8,
        }
    }

    /// Interpolates between two colors per channel. The caller is expected to
    /// have already eased `t`.
    pub fn lerp(a: Color, b: Color, t: f64) -> Color {
        Color {
            r: lerp_u8(a.r, b.r, t),
            g: lerp_u8(a.g, b.g, t),
            b: lerp_u8(a.b, b.b, t),
        }
    }

    /// Scales the color by a brightness factor in [0, 1].
    pub fn scale(&self, factor: f64) -> Color {
        let factor = factor.clamp(0.0, 1.0);
        Color {
            r: (f64::from(self.r) * factor).round() as u8,
            g: (f64::from(self.g) * factor).round() as u8,
            b: (f64::from(self.b) * factor).round() as u8,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_from_hsv_primaries() {
        assert_eq!(Color::from_hsv(0.0, 1.0, 1.0), Color::new(255, 0, 0));
        assert_eq!(Color::from_hsv(120.0, 1.0, 1.0), Color::new(0, 255, 0));
        assert_eq!(Color::from_hsv(240.0, 1.0, 1.0), Color::new(0, 0, 255));
    }

    #[test]
    fn test_from_hsv_wraps_hue() {
        assert_eq!(Color::from_hsv(360.0, 1.0, 1.0), Color::from_hsv(0.0, 1.0, 1.0));
        assert_eq!(Color::from_hsv(-120.0, 1.0, 1.0), Color::from_hsv(240.0, 1.0, 1.0));
    }

    #[test]
    fn test_lerp_endpoints_and_midpoint() {
        let a = BLACK;
        let b = WHITE;
        assert_eq!(Color::lerp(a, b, 0.0), a);
        assert_eq!(Color::lerp(a, b, 1.0), b);
        // Round half away from zero: 127.5 rounds up.
        assert_eq!(Color::lerp(a, b, 0.5), Color::new(128, 128, 128));
    }

    #[test]
    fn test_scale() {
        let c = Color::new(200, 100, 50);
        assert_eq!(c.scale(0.5), Color::new(100, 50, 25));
        assert_eq!(c.scale(0.0), BLACK);
        assert_eq!(c.scale(1.5), c);
    }
}
