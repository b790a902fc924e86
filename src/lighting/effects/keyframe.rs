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

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::lighting::color::{Color, BLACK};
use crate::lighting::easing::{ease, lerp, Easing};

/// A control point on a custom effect's timeline.
///
/// `time` is a percentage (0-100) of the effect's duration. Keyframes need not
/// be stored sorted; sampling sorts a view by time at read time, keeping the
/// stored order for equal times.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Keyframe {
    pub time: f64,
    #[serde(default)]
    pub easing: Easing,
    /// A master level (0-100) applied after color interpolation.
    pub intensity: f64,
    pub value: FrameValue,
}

/// The mode-specific payload of a keyframe.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameValue {
    /// A single color for spot fixtures.
    Spot { color: Color },
    /// A pattern descriptor for pixel strips.
    Strip { pattern: Pattern },
}

/// A strip pattern. Every variant is self-contained, so keyframes can be
/// deleted or reordered without corrupting a neighbor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pattern {
    Solid {
        color: Color,
    },
    /// A spatial gradient across the strip. Both endpoint colors live on this
    /// keyframe; temporal blending happens between two gradient keyframes.
    Gradient {
        start_color: Color,
        end_color: Color,
    },
    Wave {
        color: Color,
        wavelength: f64,
        amplitude: f64,
    },
    /// A lit window of `width` pixels sweeping across the strip once per
    /// keyframe segment.
    Chase {
        color: Color,
        width: u16,
    },
}

impl FrameValue {
    /// The representative color when a spot fixture samples this keyframe.
    fn spot_color(&self) -> Color {
        match self {
            FrameValue::Spot { color } => *color,
            FrameValue::Strip { pattern } => pattern.primary_color(),
        }
    }

    fn pattern(&self) -> Pattern {
        match self {
            FrameValue::Spot { color } => Pattern::Solid { color: *color },
            FrameValue::Strip { pattern } => pattern.clone(),
        }
    }
}

impl Pattern {
    fn primary_color(&self) -> Color {
        match self {
            Pattern::Solid { color }
            | Pattern::Wave { color, .. }
            | Pattern::Chase { color, .. } => *color,
            Pattern::Gradient { start_color, .. } => *start_color,
        }
    }

    /// Parameter-wise interpolation between two patterns of the same variant.
    /// Returns `None` on a variant mismatch; the caller crossfades rendered
    /// frames instead.
    fn interpolate(a: &Pattern, b: &Pattern, t: f64) -> Option<Pattern> {
        match (a, b) {
            (Pattern::Solid { color: ca }, Pattern::Solid { color: cb }) => Some(Pattern::Solid {
                color: Color::lerp(*ca, *cb, t),
            }),
            (
                Pattern::Gradient {
                    start_color: sa,
                    end_color: ea,
                },
                Pattern::Gradient {
                    start_color: sb,
                    end_color: eb,
                },
            ) => Some(Pattern::Gradient {
                start_color: Color::lerp(*sa, *sb, t),
                end_color: Color::lerp(*ea, *eb, t),
            }),
            (
                Pattern::Wave {
                    color: ca,
                    wavelength: wa,
                    amplitude: aa,
                },
                Pattern::Wave {
                    color: cb,
                    wavelength: wb,
                    amplitude: ab,
                },
            ) => Some(Pattern::Wave {
                color: Color::lerp(*ca, *cb, t),
                wavelength: lerp(*wa, *wb, t),
                amplitude: lerp(*aa, *ab, t),
            }),
            (
                Pattern::Chase {
                    color: ca,
                    width: wa,
                },
                Pattern::Chase {
                    color: cb,
                    width: wb,
                },
            ) => Some(Pattern::Chase {
                color: Color::lerp(*ca, *cb, t),
                width: lerp(f64::from(*wa), f64::from(*wb), t).round() as u16,
            }),
            _ => None,
        }
    }

    /// Renders this pattern across `num_pixels`, with `t` driving the motion
    /// of time-dependent patterns (wave phase, chase position).
    fn render(&self, t: f64, num_pixels: usize) -> Vec<Color> {
        match self {
            Pattern::Solid { color } => vec![*color; num_pixels],
            Pattern::Gradient {
                start_color,
                end_color,
            } => (0..num_pixels)
                .map(|p| {
                    let position = if num_pixels > 1 {
                        p as f64 / (num_pixels - 1) as f64
                    } else {
                        0.0
                    };
                    Color::lerp(*start_color, *end_color, position)
                })
                .collect(),
            Pattern::Wave {
                color,
                wavelength,
                amplitude,
            } => {
                let wavelength = wavelength.max(1.0);
                // One full wavelength of travel per keyframe segment.
                let phase = t * wavelength;
                (0..num_pixels)
                    .map(|p| {
                        let angle = (p as f64 + phase) * std::f64::consts::TAU / wavelength;
                        let factor = (angle.sin() + 1.0) / 2.0 * (amplitude / 255.0);
                        color.scale(factor)
                    })
                    .collect()
            }
            Pattern::Chase { color, width } => {
                let position = t * num_pixels as f64;
                let half = f64::from(*width).max(1.0) / 2.0;
                (0..num_pixels)
                    .map(|p| {
                        let distance = (p as f64 + 0.5 - position).abs();
                        if distance <= half {
                            color.scale(1.0 - distance / (half + 0.5))
                        } else {
                            BLACK
                        }
                    })
                    .collect()
            }
        }
    }
}

/// A sorted view of the keyframes. Stable, so keyframes sharing a time keep
/// their stored order.
fn sorted(keyframes: &[Keyframe]) -> Vec<&Keyframe> {
    let mut view: Vec<&Keyframe> = keyframes.iter().collect();
    view.sort_by(|a, b| a.time.partial_cmp(&b.time).unwrap_or(Ordering::Equal));
    view
}

/// Finds the keyframe pair bracketing `progress` and the eased segment
/// progress between them. Progress outside the keyframe range clamps to the
/// nearest keyframe.
fn bracket<'a>(view: &[&'a Keyframe], progress: f64) -> (&'a Keyframe, &'a Keyframe, f64) {
    let first = view[0];
    let last = view[view.len() - 1];
    if progress <= first.time {
        return (first, first, 0.0);
    }
    if progress >= last.time {
        return (last, last, 0.0);
    }

    let index = view.partition_point(|keyframe| keyframe.time <= progress);
    let before = view[index - 1];
    let after = view[index];
    let span = after.time - before.time;
    let t = if span > f64::EPSILON {
        (progress - before.time) / span
    } else {
        0.0
    };
    (before, after, ease(t, before.easing))
}

fn intensity_factor(before: &Keyframe, after: &Keyframe, t: f64) -> f64 {
    lerp(before.intensity, after.intensity, t).clamp(0.0, 100.0) / 100.0
}

/// Samples a spot color at `progress` (0-100). Requires a non-empty keyframe
/// list; validation guarantees at least two.
pub fn sample_spot(keyframes: &[Keyframe], progress: f64) -> Color {
    let view = sorted(keyframes);
    if view.is_empty() {
        return BLACK;
    }
    let (before, after, t) = bracket(&view, progress);
    let color = Color::lerp(before.value.spot_color(), after.value.spot_color(), t);
    color.scale(intensity_factor(before, after, t))
}

/// Samples per-pixel strip colors at `progress` (0-100). Patterns of the same
/// kind interpolate parameter-wise; mismatched kinds crossfade their rendered
/// frames.
pub fn sample_strip(keyframes: &[Keyframe], progress: f64, num_pixels: usize) -> Vec<Color> {
    let view = sorted(keyframes);
    if view.is_empty() {
        return vec![BLACK; num_pixels];
    }
    let (before, after, t) = bracket(&view, progress);
    let pattern_before = before.value.pattern();
    let pattern_after = after.value.pattern();

    let mut pixels = match Pattern::interpolate(&pattern_before, &pattern_after, t) {
        Some(pattern) => pattern.render(t, num_pixels),
        None => {
            let from = pattern_before.render(t, num_pixels);
            let to = pattern_after.render(t, num_pixels);
            from.into_iter()
                .zip(to)
                .map(|(a, b)| Color::lerp(a, b, t))
                .collect()
        }
    };

    let intensity = intensity_factor(before, after, t);
    for pixel in &mut pixels {
        *pixel = pixel.scale(intensity);
    }
    pixels
}

/// Maps elapsed seconds onto the looping 0-100 timeline position.
pub fn progress(elapsed: f64, duration: f64) -> f64 {
    if duration <= 0.0 {
        return 0.0;
    }
    (elapsed % duration) / duration * 100.0
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::lighting::color::WHITE;

    fn spot(time: f64, easing: Easing, color: Color) -> Keyframe {
        Keyframe {
            time,
            easing,
            intensity: 100.0,
            value: FrameValue::Spot { color },
        }
    }

    fn strip(time: f64, pattern: Pattern) -> Keyframe {
        Keyframe {
            time,
            easing: Easing::Linear,
            intensity: 100.0,
            value: FrameValue::Strip { pattern },
        }
    }

    #[test]
    fn test_spot_linear_midpoint() {
        let keyframes = vec![
            spot(0.0, Easing::Linear, BLACK),
            spot(100.0, Easing::Linear, WHITE),
        ];
        assert_eq!(sample_spot(&keyframes, 50.0), Color::new(128, 128, 128));
    }

    #[test]
    fn test_spot_uses_leading_keyframe_easing() {
        let keyframes = vec![
            spot(0.0, Easing::EaseIn, BLACK),
            spot(100.0, Easing::Linear, WHITE),
        ];
        // Eased t at progress 50 is 0.25.
        assert_eq!(sample_spot(&keyframes, 50.0), Color::new(64, 64, 64));
    }

    #[test]
    fn test_spot_clamps_outside_keyframe_range() {
        let red = Color::new(255, 0, 0);
        let blue = Color::new(0, 0, 255);
        let keyframes = vec![
            spot(20.0, Easing::Linear, red),
            spot(80.0, Easing::Linear, blue),
        ];
        assert_eq!(sample_spot(&keyframes, 0.0), red);
        assert_eq!(sample_spot(&keyframes, 100.0), blue);
    }

    #[test]
    fn test_spot_sorts_at_read_time() {
        let keyframes = vec![
            spot(100.0, Easing::Linear, WHITE),
            spot(0.0, Easing::Linear, BLACK),
        ];
        assert_eq!(sample_spot(&keyframes, 0.0), BLACK);
        assert_eq!(sample_spot(&keyframes, 100.0), WHITE);
    }

    #[test]
    fn test_spot_intensity_scales_output() {
        let mut keyframes = vec![
            spot(0.0, Easing::Linear, WHITE),
            spot(100.0, Easing::Linear, WHITE),
        ];
        keyframes[0].intensity = 50.0;
        keyframes[1].intensity = 50.0;
        assert_eq!(sample_spot(&keyframes, 50.0), Color::new(128, 128, 128));
    }

    #[test]
    fn test_gradient_is_spatial() {
        let gradient = Pattern::Gradient {
            start_color: Color::new(255, 0, 0),
            end_color: Color::new(0, 0, 255),
        };
        let keyframes = vec![strip(0.0, gradient.clone()), strip(100.0, gradient)];
        let pixels = sample_strip(&keyframes, 50.0, 4);
        assert_eq!(
            pixels,
            vec![
                Color::new(255, 0, 0),
                Color::new(170, 0, 85),
                Color::new(85, 0, 170),
                Color::new(0, 0, 255),
            ]
        );
    }

    #[test]
    fn test_solid_interpolates_temporally() {
        let keyframes = vec![
            strip(0.0, Pattern::Solid { color: BLACK }),
            strip(100.0, Pattern::Solid { color: WHITE }),
        ];
        let pixels = sample_strip(&keyframes, 50.0, 3);
        assert_eq!(pixels, vec![Color::new(128, 128, 128); 3]);
    }

    #[test]
    fn test_wave_amplitude_bounds_output() {
        let keyframes = vec![
            strip(
                0.0,
                Pattern::Wave {
                    color: WHITE,
                    wavelength: 8.0,
                    amplitude: 0.0,
                },
            ),
            strip(
                100.0,
                Pattern::Wave {
                    color: WHITE,
                    wavelength: 8.0,
                    amplitude: 0.0,
                },
            ),
        ];
        // Zero amplitude renders black everywhere.
        assert_eq!(sample_strip(&keyframes, 37.0, 8), vec![BLACK; 8]);
    }

    #[test]
    fn test_chase_window_lights_near_position() {
        let chase = Pattern::Chase {
            color: WHITE,
            width: 2,
        };
        let keyframes = vec![strip(0.0, chase.clone()), strip(100.0, chase)];
        // At progress 50 the window is centered mid-strip.
        let pixels = sample_strip(&keyframes, 50.0, 10);
        assert_eq!(pixels[0], BLACK);
        assert_eq!(pixels[9], BLACK);
        assert_ne!(pixels[4], BLACK);
    }

    #[test]
    fn test_mismatched_patterns_crossfade() {
        let keyframes = vec![
            strip(
                0.0,
                Pattern::Solid {
                    color: Color::new(200, 0, 0),
                },
            ),
            strip(
                100.0,
                Pattern::Gradient {
                    start_color: BLACK,
                    end_color: BLACK,
                },
            ),
        ];
        // At the segment start the solid frame dominates entirely.
        assert_eq!(
            sample_strip(&keyframes, 0.0, 2),
            vec![Color::new(200, 0, 0); 2]
        );
        // Mid-segment the solid color has faded halfway toward black.
        assert_eq!(
            sample_strip(&keyframes, 50.0, 2),
            vec![Color::new(100, 0, 0); 2]
        );
    }

    #[test]
    fn test_equal_times_keep_insertion_order() {
        let keyframes = vec![
            spot(0.0, Easing::Linear, BLACK),
            spot(50.0, Easing::Linear, Color::new(10, 0, 0)),
            spot(50.0, Easing::Linear, Color::new(20, 0, 0)),
            spot(100.0, Easing::Linear, WHITE),
        ];
        // Approaching 50 from below interpolates toward the first of the tied
        // pair; at exactly 50 the later one takes over as the leading frame.
        assert_eq!(sample_spot(&keyframes, 45.0), Color::new(9, 0, 0));
        assert_eq!(sample_spot(&keyframes, 50.0), Color::new(20, 0, 0));
    }

    #[test]
    fn test_progress_wraps_by_duration() {
        assert_eq!(progress(0.0, 4.0), 0.0);
        assert_eq!(progress(1.0, 4.0), 25.0);
        assert_eq!(progress(5.0, 4.0), 25.0);
    }
}
