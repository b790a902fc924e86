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

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::lighting::color::Color;

/// The number of channels a single strip pixel occupies (RGB).
pub const CHANNELS_PER_PIXEL: usize = 3;

/// The role of a single channel within a fixture's layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelRole {
    Dimmer,
    Red,
    Green,
    Blue,
    White,
    /// A pixel-strip channel. Pixel roles repeat in groups of
    /// [`CHANNELS_PER_PIXEL`], one group per addressable pixel.
    Pixel,
}

/// A physical fixture addressed by IP, universe and channel range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    /// Opaque unique identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// The IP address Art-Net packets for this fixture are sent to.
    pub ip: IpAddr,
    /// The DMX universe (0-15).
    pub universe: u8,
    /// The first DMX channel occupied by this fixture (1-512).
    pub start_channel: u16,
    /// The ordered channel role layout. Its length is the channel count.
    pub layout: Vec<ChannelRole>,
}

impl Device {
    /// The number of channels this fixture occupies.
    pub fn channel_count(&self) -> usize {
        self.layout.len()
    }

    /// The zero-based index of the first channel within the universe array.
    pub fn channel_offset(&self) -> usize {
        usize::from(self.start_channel) - 1
    }

    /// The number of addressable pixels, for strip fixtures.
    pub fn pixel_count(&self) -> usize {
        self.layout
            .iter()
            .filter(|role| **role == ChannelRole::Pixel)
            .count()
            / CHANNELS_PER_PIXEL
    }

    /// The position of the dimmer channel, if the fixture has one.
    pub fn dimmer_index(&self) -> Option<usize> {
        self.layout
            .iter()
            .position(|role| *role == ChannelRole::Dimmer)
    }

    fn has_dimmer(&self) -> bool {
        self.dimmer_index().is_some()
    }

    /// Sets every channel to the same raw value.
    pub fn fill(&self, value: u8) -> Vec<u8> {
        vec![value; self.layout.len()]
    }

    /// Maps a color and a brightness in [0, 1] onto this fixture's channels.
    /// Fixtures with a dedicated dimmer get the color unscaled and the
    /// brightness on the dimmer channel; RGB-only fixtures get the color
    /// scaled so the brightness is preserved.
    pub fn paint_color(&self, color: Color, brightness: f64) -> Vec<u8> {
        let brightness = brightness.clamp(0.0, 1.0);
        let rgb = if self.has_dimmer() {
            color
        } else {
            color.scale(brightness)
        };

        let mut pixel_channel = 0;
        self.layout
            .iter()
            .map(|role| match role {
                ChannelRole::Dimmer => (brightness * 255.0).round() as u8,
                ChannelRole::Red => rgb.r,
                ChannelRole::Green => rgb.g,
                ChannelRole::Blue => rgb.b,
                ChannelRole::White => 0,
                ChannelRole::Pixel => {
                    let byte = match pixel_channel % CHANNELS_PER_PIXEL {
                        0 => rgb.r,
                        1 => rgb.g,
                        _ => rgb.b,
                    };
                    pixel_channel += 1;
                    byte
                }
            })
            .collect()
    }

    /// Maps per-pixel colors onto a strip fixture's channels. Dimmer roles are
    /// driven to full so the pixels are visible; missing pixels are off.
    pub fn paint_pixels(&self, pixels: &[Color]) -> Vec<u8> {
        let mut pixel_channel = 0;
        self.layout
            .iter()
            .map(|role| match role {
                ChannelRole::Dimmer => 255,
                ChannelRole::Pixel => {
                    let pixel = pixels.get(pixel_channel / CHANNELS_PER_PIXEL);
                    let byte = match (pixel, pixel_channel % CHANNELS_PER_PIXEL) {
                        (Some(color), 0) => color.r,
                        (Some(color), 1) => color.g,
                        (Some(color), _) => color.b,
                        (None, _) => 0,
                    };
                    pixel_channel += 1;
                    byte
                }
                _ => 0,
            })
            .collect()
    }
}

/// A single device's channel values produced by one effect frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceWrite {
    pub device_id: String,
    pub values: Vec<u8>,
}
