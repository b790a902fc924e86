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

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::effects::SoundBand;

/// Normalized audio feature levels pushed in from the analysis layer. All
/// bands are in [0, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioLevels {
    pub bass: f64,
    pub mid: f64,
    pub high: f64,
    pub overall: f64,
}

impl AudioLevels {
    pub fn band(&self, band: SoundBand) -> f64 {
        match band {
            SoundBand::Bass => self.bass,
            SoundBand::Mid => self.mid,
            SoundBand::High => self.high,
            SoundBand::Overall => self.overall,
        }
    }

    fn clamped(self) -> Self {
        Self {
            bass: self.bass.clamp(0.0, 1.0),
            mid: self.mid.clamp(0.0, 1.0),
            high: self.high.clamp(0.0, 1.0),
            overall: self.overall.clamp(0.0, 1.0),
        }
    }
}

/// Shared holder for the most recent audio frame. Effect ticks read the
/// current frame; there is no history.
#[derive(Clone, Default)]
pub struct AudioFeed {
    levels: Arc<RwLock<AudioLevels>>,
}

impl AudioFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the current frame, clamping bands into [0, 1].
    pub fn push(&self, levels: AudioLevels) {
        *self.levels.write() = levels.clamped();
    }

    pub fn current(&self) -> AudioLevels {
        *self.levels.read()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_push_clamps_bands() {
        let feed = AudioFeed::new();
        feed.push(AudioLevels {
            bass: 1.5,
            mid: -0.2,
            high: 0.5,
            overall: 0.9,
        });
        let levels = feed.current();
        assert_eq!(levels.bass, 1.0);
        assert_eq!(levels.mid, 0.0);
        assert_eq!(levels.high, 0.5);
        assert_eq!(levels.overall, 0.9);
    }

    #[test]
    fn test_band_selection() {
        let levels = AudioLevels {
            bass: 0.1,
            mid: 0.2,
            high: 0.3,
            overall: 0.4,
        };
        assert_eq!(levels.band(SoundBand::Bass), 0.1);
        assert_eq!(levels.band(SoundBand::Overall), 0.4);
    }
}
