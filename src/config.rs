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

use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};
use duration_string::DurationString;
use serde::Deserialize;

mod error;

pub use error::ConfigError;

/// The default Art-Net output rate. Full DMX refresh is ~44 Hz.
const DEFAULT_TRANSMIT_RATE_HZ: f64 = 44.0;

/// Engine settings, loaded from an optional file with environment variable
/// overrides (prefix `DMXCTL_`).
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// The Art-Net transmit rate in Hz.
    pub transmit_rate_hz: f64,

    /// How long to keep transmitting after the shutdown blackout so the zero
    /// frame reaches the fixtures (e.g. "250ms").
    shutdown_grace: Option<String>,
}

impl Settings {
    /// Loads settings, layering the optional file over defaults and the
    /// environment over both.
    pub fn load(path: Option<&Path>) -> Result<Settings, ConfigError> {
        let mut builder = Config::builder()
            .set_default("transmit_rate_hz", DEFAULT_TRANSMIT_RATE_HZ)?;
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        Ok(builder
            .add_source(Environment::with_prefix("DMXCTL"))
            .build()?
            .try_deserialize()?)
    }

    pub fn shutdown_grace(&self) -> Result<Duration, ConfigError> {
        match &self.shutdown_grace {
            Some(grace) => Ok(DurationString::from_string(grace.clone())
                .map_err(|err| ConfigError::Duration(err.to_string()))?
                .into()),
            None => Ok(Duration::from_millis(250)),
        }
    }
}
