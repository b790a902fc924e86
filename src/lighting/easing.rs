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

/// The easing curve applied to a keyframe segment's progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Easing {
    #[default]
    Linear,
    EaseIn,
    EaseOut,
    EaseInOut,
}

/// Reshapes a linear progress value `t` in [0, 1] according to the easing
/// curve. Input is clamped; output stays within [0, 1] with ease(0) == 0 and
/// ease(1) == 1 for every curve.
pub fn ease(t: f64, easing: Easing) -> f64 {
    let t = t.clamp(0.0, 1.0);
    match easing {
        Easing::Linear => t,
        Easing::EaseIn => t * t,
        Easing::EaseOut => t * (2.0 - t),
        Easing::EaseInOut => {
            if t < 0.5 {
                2.0 * t * t
            } else {
                -1.0 + (4.0 - 2.0 * t) * t
            }
        }
    }
}

/// Linear interpolation between two scalars.
pub fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

/// Linear interpolation between two channel bytes, rounding half away from
/// zero (so a midpoint between 0 and 255 yields 128).
pub fn lerp_u8(a: u8, b: u8, t: f64) -> u8 {
    lerp(f64::from(a), f64::from(b), t).round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod test {
    use super::*;

    const ALL: [Easing; 4] = [
        Easing::Linear,
        Easing::EaseIn,
        Easing::EaseOut,
        Easing::EaseInOut,
    ];

    #[test]
    fn test_endpoints() {
        for easing in ALL {
            assert_eq!(ease(0.0, easing), 0.0, "{:?}", easing);
            assert_eq!(ease(1.0, easing), 1.0, "{:?}", easing);
        }
    }

    #[test]
    fn test_output_stays_in_unit_interval() {
        for easing in ALL {
            for i in 0..=100 {
                let t = f64::from(i) / 100.0;
                let eased = ease(t, easing);
                assert!((0.0..=1.0).contains(&eased), "{:?} at {}", easing, t);
            }
        }
    }

    #[test]
    fn test_known_values() {
        assert_eq!(ease(0.5, Easing::Linear), 0.5);
        assert_eq!(ease(0.5, Easing::EaseIn), 0.25);
        assert_eq!(ease(0.5, Easing::EaseOut), 0.75);
        assert_eq!(ease(0.5, Easing::EaseInOut), 0.5);
        assert_eq!(ease(0.25, Easing::EaseInOut), 0.125);
        assert_eq!(ease(0.75, Easing::EaseInOut), 0.875);
    }

    #[test]
    fn test_input_clamped() {
        for easing in ALL {
            assert_eq!(ease(-1.0, easing), 0.0);
            assert_eq!(ease(2.0, easing), 1.0);
        }
    }

    #[test]
    fn test_lerp_u8_rounding() {
        // Documented rounding: half away from zero.
        assert_eq!(lerp_u8(0, 255, 0.5), 128);
        assert_eq!(lerp_u8(0, 255, 1.0 / 3.0), 85);
        assert_eq!(lerp_u8(255, 0, 1.0 / 3.0), 170);
    }
}
