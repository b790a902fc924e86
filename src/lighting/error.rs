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

/// Errors returned by lighting control operations.
#[derive(Debug, thiserror::Error)]
pub enum LightingError {
    #[error("Too many running effects (limit {limit})")]
    ResourceExhausted { limit: usize },

    #[error("Too many running sequences (limit {limit})")]
    SequenceCeiling { limit: usize },

    #[error("Unknown effect: {0}")]
    UnknownEffect(String),

    #[error("Unknown scene: {0}")]
    UnknownScene(String),

    #[error("Unknown sequence: {0}")]
    UnknownSequence(String),

    #[error("Unknown device: {0}")]
    UnknownDevice(String),

    #[error("Unknown group: {0}")]
    UnknownGroup(String),

    #[error("Invalid effect definition: {0}")]
    InvalidEffect(String),
}
