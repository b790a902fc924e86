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

use parking_lot::RwLock;

use crate::fixture::Device;

/// A DMX universe is 512 channels.
pub const UNIVERSE_SIZE: usize = 512;

/// The number of universes this controller addresses (0-15).
pub const UNIVERSE_COUNT: usize = 16;

/// The authoritative per-channel DMX state for every universe.
///
/// Each universe is a 512-byte array behind its own lock, so writers to
/// disjoint universes never contend, and a snapshot of one universe is always
/// internally consistent. Concurrent writers to the same channel resolve
/// last-writer-wins per write; two effects targeting the same fixture will
/// visibly flicker, which is accepted behavior rather than a defect.
pub struct ChannelStore {
    universes: Vec<RwLock<[u8; UNIVERSE_SIZE]>>,
}

impl Default for ChannelStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelStore {
    pub fn new() -> Self {
        Self {
            universes: (0..UNIVERSE_COUNT)
                .map(|_| RwLock::new([0u8; UNIVERSE_SIZE]))
                .collect(),
        }
    }

    fn universe(&self, universe: u8) -> Option<&RwLock<[u8; UNIVERSE_SIZE]>> {
        self.universes.get(usize::from(universe))
    }

    /// Writes a single channel value, clamped to [0, 255]. Out-of-range
    /// universes and channels are ignored.
    pub fn write(&self, universe: u8, channel: u16, value: i32) {
        let Some(lock) = self.universe(universe) else {
            return;
        };
        let channel = usize::from(channel);
        if channel >= UNIVERSE_SIZE {
            return;
        }
        lock.write()[channel] = value.clamp(0, 255) as u8;
    }

    /// Writes a device's full channel slice under a single lock acquisition,
    /// so a reader never observes a partially applied frame for one device.
    /// Values beyond the end of the universe are dropped.
    pub fn write_device(&self, device: &Device, values: &[u8]) {
        let Some(lock) = self.universe(device.universe) else {
            return;
        };
        let offset = device.channel_offset();
        let mut universe = lock.write();
        for (i, value) in values.iter().enumerate() {
            if let Some(slot) = universe.get_mut(offset + i) {
                *slot = *value;
            }
        }
    }

    /// Returns a consistent full copy of one universe.
    pub fn snapshot(&self, universe: u8) -> [u8; UNIVERSE_SIZE] {
        self.universe(universe)
            .map(|lock| *lock.read())
            .unwrap_or([0u8; UNIVERSE_SIZE])
    }

    /// Returns the current values of one device's channel slice.
    pub fn device_values(&self, device: &Device) -> Vec<u8> {
        let snapshot = self.snapshot(device.universe);
        let offset = device.channel_offset();
        let end = (offset + device.channel_count()).min(UNIVERSE_SIZE);
        snapshot[offset.min(UNIVERSE_SIZE)..end].to_vec()
    }

    /// Zeroes every channel in every universe.
    pub fn blackout(&self) {
        for lock in &self.universes {
            *lock.write() = [0u8; UNIVERSE_SIZE];
        }
    }
}
