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

use std::f64::consts::TAU;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::fixture::{Device, DeviceWrite};
use crate::lighting::audio::AudioLevels;
use crate::lighting::color::{Color, BLACK, WHITE};
use crate::lighting::effects::keyframe;
use crate::lighting::effects::{EffectKind, MatrixPattern, SoundConfig, SoundTarget};

/// How long a single lightning flash stays lit or dark within a burst.
const FLASH_SECONDS: f64 = 0.05;

/// Minimum spacing between sound-triggered flashes.
const FLASH_RETRIGGER_SECONDS: f64 = 0.1;

#[derive(Debug, Clone, Copy)]
enum LightningPhase {
    Waiting { until: f64 },
    Flashing { flashes_left: u8, until: f64, on: bool },
}

/// Mutable per-instance generator state. Stochastic kinds draw from their own
/// RNG so two instances of the same effect do not flicker in lockstep.
pub struct EffectState {
    rng: SmallRng,
    lightning: LightningPhase,
    last_flash: f64,
}

impl Default for EffectState {
    fn default() -> Self {
        Self::new()
    }
}

impl EffectState {
    pub fn new() -> Self {
        Self {
            rng: SmallRng::from_entropy(),
            lightning: LightningPhase::Waiting { until: 0.0 },
            last_flash: f64::NEG_INFINITY,
        }
    }
}

/// Renders one frame of the effect: elapsed seconds and parameters in, one
/// channel write per target device out.
pub fn render(
    kind: &EffectKind,
    state: &mut EffectState,
    elapsed: f64,
    devices: &[Device],
) -> Vec<DeviceWrite> {
    match kind {
        EffectKind::Strobe { frequency } => {
            let on = (elapsed * frequency).fract() < 0.5;
            paint_all(devices, if on { WHITE } else { BLACK }, if on { 1.0 } else { 0.0 })
        }
        EffectKind::Rainbow { speed } => {
            let hue = (elapsed * speed * 360.0) % 360.0;
            paint_all(devices, Color::from_hsv(hue, 1.0, 1.0), 1.0)
        }
        EffectKind::Chase { speed, color } => {
            if devices.is_empty() {
                return Vec::new();
            }
            let lit = (elapsed * speed) as usize % devices.len();
            devices
                .iter()
                .enumerate()
                .map(|(i, device)| DeviceWrite {
                    device_id: device.id.clone(),
                    values: if i == lit {
                        device.paint_color(*color, 1.0)
                    } else {
                        device.fill(0)
                    },
                })
                .collect()
        }
        EffectKind::Pulse {
            speed,
            min_brightness,
        } => {
            let factor = ((TAU * speed * elapsed).sin() + 1.0) / 2.0;
            let level = f64::from(*min_brightness) + factor * (255.0 - f64::from(*min_brightness));
            paint_all(devices, WHITE, level / 255.0)
        }
        EffectKind::ColorFade { colors, speed } => {
            if colors.is_empty() {
                return Vec::new();
            }
            let segment = elapsed * speed;
            let index = segment as usize % colors.len();
            let next = (index + 1) % colors.len();
            let color = Color::lerp(colors[index], colors[next], segment.fract());
            paint_all(devices, color, 1.0)
        }
        EffectKind::Fire { speed, intensity } => devices
            .iter()
            .map(|device| {
                let values = if device.pixel_count() > 0 {
                    let pixels: Vec<Color> = (0..device.pixel_count())
                        .map(|_| flame_color(state, elapsed, *speed, *intensity))
                        .collect();
                    device.paint_pixels(&pixels)
                } else {
                    device.paint_color(flame_color(state, elapsed, *speed, *intensity), 1.0)
                };
                DeviceWrite {
                    device_id: device.id.clone(),
                    values,
                }
            })
            .collect(),
        EffectKind::Lightning {
            min_delay,
            max_delay,
        } => {
            let on = lightning_step(state, elapsed, *min_delay, *max_delay);
            paint_all(devices, if on { WHITE } else { BLACK }, if on { 1.0 } else { 0.0 })
        }
        EffectKind::Scanner {
            speed,
            range,
            color,
        } => {
            // Triangle sweep, one full out-and-back per 1/speed seconds.
            let phase = (elapsed * speed).fract();
            let sweep = 1.0 - (2.0 * phase - 1.0).abs();
            devices
                .iter()
                .map(|device| {
                    let values = if device.pixel_count() > 0 {
                        let pixels = scanner_pixels(device.pixel_count(), sweep, *range, *color);
                        device.paint_pixels(&pixels)
                    } else {
                        device.paint_color(*color, sweep)
                    };
                    DeviceWrite {
                        device_id: device.id.clone(),
                        values,
                    }
                })
                .collect()
        }
        EffectKind::Matrix { speed, pattern } => devices
            .iter()
            .map(|device| {
                let pixels = matrix_pixels(device.pixel_count(), elapsed * speed, *pattern);
                DeviceWrite {
                    device_id: device.id.clone(),
                    values: if device.pixel_count() > 0 {
                        device.paint_pixels(&pixels)
                    } else {
                        device.paint_color(MATRIX_GREEN, ((elapsed * speed * TAU).sin() + 1.0) / 2.0)
                    },
                }
            })
            .collect(),
        EffectKind::Twinkle { speed, density } => {
            let probability = (density * speed / 20.0).clamp(0.0, 0.5);
            devices
                .iter()
                .map(|device| {
                    let values = if device.pixel_count() > 0 {
                        let pixels: Vec<Color> = (0..device.pixel_count())
                            .map(|_| twinkle_color(state, probability))
                            .collect();
                        device.paint_pixels(&pixels)
                    } else {
                        device.paint_color(twinkle_color(state, probability), 1.0)
                    };
                    DeviceWrite {
                        device_id: device.id.clone(),
                        values,
                    }
                })
                .collect()
        }
        EffectKind::Custom {
            duration,
            keyframes,
        } => {
            let progress = keyframe::progress(elapsed, *duration);
            devices
                .iter()
                .map(|device| {
                    let values = if device.pixel_count() > 0 {
                        let pixels =
                            keyframe::sample_strip(keyframes, progress, device.pixel_count());
                        device.paint_pixels(&pixels)
                    } else {
                        device.paint_color(keyframe::sample_spot(keyframes, progress), 1.0)
                    };
                    DeviceWrite {
                        device_id: device.id.clone(),
                        values,
                    }
                })
                .collect()
        }
    }
}

/// Remaps the pushed audio levels into the frame per the sound config. Called
/// after `render` so the base frame is already laid out.
pub fn apply_sound(
    config: &SoundConfig,
    levels: AudioLevels,
    elapsed: f64,
    state: &mut EffectState,
    devices: &[Device],
    writes: &mut Vec<DeviceWrite>,
) {
    let raw = levels.band(config.band);
    let level = (raw * config.sensitivity).clamp(0.0, 1.0);
    match config.target {
        SoundTarget::Brightness => {
            for write in writes.iter_mut() {
                for value in &mut write.values {
                    *value = (f64::from(*value) * level).round() as u8;
                }
            }
        }
        SoundTarget::Hue => {
            let color = Color::from_hsv(level * 270.0, 1.0, 1.0);
            *writes = paint_all(devices, color, 1.0);
        }
        SoundTarget::Flash => {
            let threshold = 0.7 / config.sensitivity.max(0.1);
            if raw > threshold && elapsed - state.last_flash >= FLASH_RETRIGGER_SECONDS {
                state.last_flash = elapsed;
                *writes = paint_all(devices, WHITE, 1.0);
            }
        }
    }
}

const MATRIX_GREEN: Color = Color {
    r: 0,
    g: 255,
    b: 70,
};

fn paint_all(devices: &[Device], color: Color, brightness: f64) -> Vec<DeviceWrite> {
    devices
        .iter()
        .map(|device| DeviceWrite {
            device_id: device.id.clone(),
            values: device.paint_color(color, brightness),
        })
        .collect()
}

fn flame_color(state: &mut EffectState, elapsed: f64, speed: f64, intensity: f64) -> Color {
    // Two incommensurate sine terms give the slow roll, the RNG the crackle.
    let base = ((elapsed * speed * 7.0).sin() + (elapsed * speed * 13.0).sin()) / 4.0 + 0.5;
    let jitter = state.rng.gen_range(-0.15..0.15);
    let value = ((base + jitter) * intensity.clamp(0.0, 1.0)).clamp(0.0, 1.0);
    let hue = state.rng.gen_range(0.0..40.0);
    Color::from_hsv(hue, 1.0, value)
}

fn twinkle_color(state: &mut EffectState, probability: f64) -> Color {
    if state.rng.gen::<f64>() < probability {
        WHITE.scale(state.rng.gen_range(0.5..1.0))
    } else {
        BLACK
    }
}

fn scanner_pixels(num_pixels: usize, sweep: f64, range: f64, color: Color) -> Vec<Color> {
    let span = (num_pixels.saturating_sub(1)) as f64 * range.clamp(0.0, 1.0);
    let position = sweep * span;
    (0..num_pixels)
        .map(|p| {
            let distance = (p as f64 - position).abs();
            if distance <= 1.5 {
                color.scale(1.0 - distance / 2.0)
            } else {
                BLACK
            }
        })
        .collect()
}

fn matrix_pixels(num_pixels: usize, phase: f64, pattern: MatrixPattern) -> Vec<Color> {
    (0..num_pixels)
        .map(|p| {
            let factor = match pattern {
                MatrixPattern::Wave => ((p as f64 * 0.8 - phase * TAU).sin() + 1.0) / 2.0,
                MatrixPattern::Circle => {
                    let center = (num_pixels as f64 - 1.0) / 2.0;
                    let distance = (p as f64 - center).abs();
                    ((distance - phase * TAU).sin() + 1.0) / 2.0
                }
                MatrixPattern::Checkerboard => {
                    if (p + phase as usize) % 2 == 0 {
                        1.0
                    } else {
                        0.0
                    }
                }
            };
            MATRIX_GREEN.scale(factor)
        })
        .collect()
}

/// Advances the lightning state machine to `elapsed` and reports whether the
/// flash is currently lit. Bursts carry 1-3 flashes separated by short gaps.
fn lightning_step(state: &mut EffectState, elapsed: f64, min_delay: f64, max_delay: f64) -> bool {
    loop {
        match state.lightning {
            LightningPhase::Waiting { until } => {
                if elapsed < until {
                    return false;
                }
                state.lightning = LightningPhase::Flashing {
                    flashes_left: state.rng.gen_range(1..=3),
                    until: elapsed + FLASH_SECONDS,
                    on: true,
                };
            }
            LightningPhase::Flashing {
                flashes_left,
                until,
                on,
            } => {
                if elapsed < until {
                    return on;
                }
                if on {
                    state.lightning = LightningPhase::Flashing {
                        flashes_left,
                        until: until + FLASH_SECONDS,
                        on: false,
                    };
                } else if flashes_left > 1 {
                    state.lightning = LightningPhase::Flashing {
                        flashes_left: flashes_left - 1,
                        until: until + FLASH_SECONDS,
                        on: true,
                    };
                } else {
                    let delay = if max_delay > min_delay {
                        state.rng.gen_range(min_delay..max_delay)
                    } else {
                        min_delay
                    };
                    state.lightning = LightningPhase::Waiting {
                        until: until + delay,
                    };
                }
            }
        }
    }
}
