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

use super::color::Color;
use super::error::LightingError;
use crate::lighting::effects::keyframe::Keyframe;

pub mod generator;
pub mod keyframe;

/// An effect kind with its strongly typed parameters. The serialized form is
/// tagged by `type`, matching the stored effect definitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EffectKind {
    /// Square wave at `frequency` Hz with a 50% duty cycle.
    Strobe { frequency: f64 },
    /// A full HSV hue sweep every `1/speed` seconds.
    Rainbow { speed: f64 },
    /// Exactly one target device lit at a time, advancing every `1/speed`
    /// seconds.
    Chase { speed: f64, color: Color },
    /// Brightness follows a sine wave, scaled into [min_brightness, 255].
    Pulse { speed: f64, min_brightness: u8 },
    /// Crossfades through a list of colors, one segment per `1/speed` seconds.
    ColorFade { colors: Vec<Color>, speed: f64 },
    /// Stochastic warm flicker.
    Fire { speed: f64, intensity: f64 },
    /// Bursts of white flashes separated by random dark gaps.
    Lightning { min_delay: f64, max_delay: f64 },
    /// A light bar sweeping back and forth across `range` of the strip.
    Scanner { speed: f64, range: f64, color: Color },
    /// Periodic strip patterns.
    Matrix { speed: f64, pattern: MatrixPattern },
    /// Random pixels briefly lighting up, `density` of them on average.
    Twinkle { speed: f64, density: f64 },
    /// A keyframe-driven timeline over `duration` seconds, looping.
    Custom { duration: f64, keyframes: Vec<Keyframe> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatrixPattern {
    Wave,
    Circle,
    Checkerboard,
}

impl EffectKind {
    /// The tick cadence for this kind. Fast square waves need more ticks to
    /// hold their duty cycle; slow ambient generators get by with fewer.
    pub fn tick_rate(&self) -> f64 {
        match self {
            EffectKind::Strobe { frequency } => (frequency * 4.0).clamp(40.0, 120.0),
            EffectKind::Fire { .. } | EffectKind::Twinkle { .. } | EffectKind::Lightning { .. } => {
                30.0
            }
            _ => 40.0,
        }
    }

    /// Validates parameter ranges. Invalid definitions are rejected here and
    /// never reach the scheduler.
    pub fn validate(&self) -> Result<(), LightingError> {
        let invalid = |message: &str| Err(LightingError::InvalidEffect(message.to_string()));
        match self {
            EffectKind::Strobe { frequency } => {
                if !(0.1..=50.0).contains(frequency) {
                    return invalid("strobe frequency must be within 0.1-50 Hz");
                }
            }
            EffectKind::Rainbow { speed }
            | EffectKind::Chase { speed, .. }
            | EffectKind::Pulse { speed, .. }
            | EffectKind::Scanner { speed, .. }
            | EffectKind::Matrix { speed, .. }
            | EffectKind::Twinkle { speed, .. }
            | EffectKind::Fire { speed, .. } => {
                if *speed <= 0.0 {
                    return invalid("speed must be positive");
                }
            }
            EffectKind::ColorFade { colors, speed } => {
                if *speed <= 0.0 {
                    return invalid("speed must be positive");
                }
                if colors.len() < 2 {
                    return invalid("color fade needs at least 2 colors");
                }
            }
            EffectKind::Lightning {
                min_delay,
                max_delay,
            } => {
                if *min_delay <= 0.0 || max_delay < min_delay {
                    return invalid("lightning delays must be positive with min <= max");
                }
            }
            EffectKind::Custom {
                duration,
                keyframes,
            } => {
                if *duration <= 0.0 {
                    return invalid("custom effect duration must be positive");
                }
                if keyframes.len() < 2 {
                    return invalid("custom effect needs at least 2 keyframes");
                }
                for keyframe in keyframes {
                    if !(0.0..=100.0).contains(&keyframe.time) {
                        return invalid("keyframe time must be within 0-100");
                    }
                    if !(0.0..=100.0).contains(&keyframe.intensity) {
                        return invalid("keyframe intensity must be within 0-100");
                    }
                }
            }
        }
        Ok(())
    }
}

/// Which frequency band of the pushed audio features drives a sound-reactive
/// effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoundBand {
    Bass,
    Mid,
    High,
    Overall,
}

/// The parameter a sound-reactive effect modulates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoundTarget {
    /// The band level scales output brightness.
    Brightness,
    /// The band level selects a hue.
    Hue,
    /// Band peaks above a threshold trigger a short white flash.
    Flash,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SoundConfig {
    pub band: SoundBand,
    pub sensitivity: f64,
    pub target: SoundTarget,
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::lighting::easing::Easing;
    use crate::lighting::effects::keyframe::{FrameValue, Pattern};

    #[test]
    fn test_effect_kind_from_json() {
        let kind: EffectKind =
            serde_json::from_str(r#"{"type": "strobe", "frequency": 5.0}"#).unwrap();
        assert!(matches!(kind, EffectKind::Strobe { frequency } if frequency == 5.0));

        let kind: EffectKind = serde_json::from_str(
            r#"{
                "type": "custom",
                "duration": 4.0,
                "keyframes": [
                    {"time": 0, "easing": "ease-in", "intensity": 100,
                     "value": {"spot": {"color": {"r": 255, "g": 0, "b": 0}}}},
                    {"time": 100, "easing": "linear", "intensity": 50,
                     "value": {"spot": {"color": {"r": 0, "g": 0, "b": 255}}}}
                ]
            }"#,
        )
        .unwrap();
        let EffectKind::Custom {
            duration,
            keyframes,
        } = kind
        else {
            panic!("expected custom effect");
        };
        assert_eq!(duration, 4.0);
        assert_eq!(keyframes.len(), 2);
        assert_eq!(keyframes[0].easing, Easing::EaseIn);
        assert!(matches!(keyframes[0].value, FrameValue::Spot { .. }));
    }

    #[test]
    fn test_validate_rejects_bad_parameters() {
        assert!(EffectKind::Strobe { frequency: 0.0 }.validate().is_err());
        assert!(EffectKind::Rainbow { speed: -1.0 }.validate().is_err());
        assert!(EffectKind::Lightning {
            min_delay: 2.0,
            max_delay: 1.0
        }
        .validate()
        .is_err());
        assert!(EffectKind::ColorFade {
            colors: vec![Color::new(255, 0, 0)],
            speed: 1.0
        }
        .validate()
        .is_err());
    }

    #[test]
    fn test_validate_requires_two_keyframes() {
        let keyframe = Keyframe {
            time: 0.0,
            easing: Easing::Linear,
            intensity: 100.0,
            value: FrameValue::Strip {
                pattern: Pattern::Solid {
                    color: Color::new(255, 0, 0),
                },
            },
        };
        let kind = EffectKind::Custom {
            duration: 2.0,
            keyframes: vec![keyframe.clone()],
        };
        assert!(kind.validate().is_err());

        let kind = EffectKind::Custom {
            duration: 2.0,
            keyframes: vec![keyframe.clone(), keyframe],
        };
        assert!(kind.validate().is_ok());
    }
}
