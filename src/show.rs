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

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::dmx::store::{UNIVERSE_COUNT, UNIVERSE_SIZE};
use crate::fixture::Device;
use crate::lighting::effects::{EffectKind, SoundConfig};
use crate::lighting::scene::Scene;
use crate::lighting::scheduler::EffectInstance;
use crate::lighting::sequence::{Sequence, Step};

#[derive(Debug, thiserror::Error)]
pub enum ShowError {
    #[error("Show load error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Show parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid show: {0}")]
    Invalid(String),
}

/// A named group of devices addressable as one target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub name: String,
    pub device_ids: Vec<String>,
}

/// A stored effect definition: parameters plus target devices and groups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectDef {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub device_ids: Vec<String>,
    #[serde(default)]
    pub group_ids: Vec<String>,
    #[serde(flatten)]
    pub kind: EffectKind,
    #[serde(default)]
    pub sound: Option<SoundConfig>,
}

impl EffectDef {
    /// Builds a runnable instance. Group targets are not expanded here; the
    /// system resolves them against its group registry.
    pub fn to_instance(&self) -> EffectInstance {
        EffectInstance {
            id: self.id.clone(),
            kind: self.kind.clone(),
            device_ids: self.device_ids.clone(),
            sound: self.sound,
        }
    }
}

/// Everything the engine consumes from the persistence layer: devices,
/// groups, scenes, effect definitions and sequences.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Show {
    #[serde(default)]
    pub devices: Vec<Device>,
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub scenes: Vec<Scene>,
    #[serde(default)]
    pub effects: Vec<EffectDef>,
    #[serde(default)]
    pub sequences: Vec<Sequence>,
}

/// Loads and validates a show from a JSON file.
pub fn load_show(path: &Path) -> Result<Show, ShowError> {
    let show: Show = serde_json::from_str(&fs::read_to_string(path)?)?;
    show.validate()?;
    Ok(show)
}

fn unique_ids<'a>(
    kind: &str,
    ids: impl Iterator<Item = &'a String>,
) -> Result<HashSet<&'a str>, ShowError> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id.as_str()) {
            return Err(ShowError::Invalid(format!("duplicate {kind} id: {id}")));
        }
    }
    Ok(seen)
}

impl Show {
    /// Validates the show. Anything rejected here never reaches the engine.
    pub fn validate(&self) -> Result<(), ShowError> {
        let device_ids = unique_ids("device", self.devices.iter().map(|d| &d.id))?;
        let group_ids = unique_ids("group", self.groups.iter().map(|g| &g.id))?;
        let scene_ids = unique_ids("scene", self.scenes.iter().map(|s| &s.id))?;
        let effect_ids = unique_ids("effect", self.effects.iter().map(|e| &e.id))?;
        unique_ids("sequence", self.sequences.iter().map(|s| &s.id))?;

        // Channel ranges must fit their universe and not overlap.
        let mut ranges: HashMap<u8, Vec<(usize, usize, &str)>> = HashMap::new();
        for device in &self.devices {
            if usize::from(device.universe) >= UNIVERSE_COUNT {
                return Err(ShowError::Invalid(format!(
                    "device {}: universe {} out of range",
                    device.id, device.universe
                )));
            }
            if device.layout.is_empty() {
                return Err(ShowError::Invalid(format!(
                    "device {}: empty channel layout",
                    device.id
                )));
            }
            let start = usize::from(device.start_channel);
            let end = start + device.channel_count() - 1;
            if start < 1 || end > UNIVERSE_SIZE {
                return Err(ShowError::Invalid(format!(
                    "device {}: channels {}-{} outside 1-{}",
                    device.id, start, end, UNIVERSE_SIZE
                )));
            }
            ranges
                .entry(device.universe)
                .or_default()
                .push((start, end, &device.id));
        }
        for ranges in ranges.values_mut() {
            ranges.sort();
            for pair in ranges.windows(2) {
                if pair[1].0 <= pair[0].1 {
                    return Err(ShowError::Invalid(format!(
                        "devices {} and {} overlap on universe channels",
                        pair[0].2, pair[1].2
                    )));
                }
            }
        }

        for group in &self.groups {
            for device_id in &group.device_ids {
                if !device_ids.contains(device_id.as_str()) {
                    return Err(ShowError::Invalid(format!(
                        "group {}: unknown device {device_id}",
                        group.id
                    )));
                }
            }
        }

        for effect in &self.effects {
            if effect.device_ids.is_empty() && effect.group_ids.is_empty() {
                return Err(ShowError::Invalid(format!(
                    "effect {}: no target devices or groups",
                    effect.id
                )));
            }
            for device_id in &effect.device_ids {
                if !device_ids.contains(device_id.as_str()) {
                    return Err(ShowError::Invalid(format!(
                        "effect {}: unknown device {device_id}",
                        effect.id
                    )));
                }
            }
            for group_id in &effect.group_ids {
                if !group_ids.contains(group_id.as_str()) {
                    return Err(ShowError::Invalid(format!(
                        "effect {}: unknown group {group_id}",
                        effect.id
                    )));
                }
            }
            effect
                .kind
                .validate()
                .map_err(|err| ShowError::Invalid(format!("effect {}: {err}", effect.id)))?;
        }

        for scene in &self.scenes {
            for device_id in scene.values.keys() {
                if !device_ids.contains(device_id.as_str()) {
                    return Err(ShowError::Invalid(format!(
                        "scene {}: unknown device {device_id}",
                        scene.id
                    )));
                }
            }
        }

        for sequence in &self.sequences {
            for step in &sequence.steps {
                match step {
                    Step::Scene { scene_id, .. } => {
                        if !scene_ids.contains(scene_id.as_str()) {
                            return Err(ShowError::Invalid(format!(
                                "sequence {}: unknown scene {scene_id}",
                                sequence.id
                            )));
                        }
                    }
                    Step::Effect { effect_id, .. } => {
                        if !effect_ids.contains(effect_id.as_str()) {
                            return Err(ShowError::Invalid(format!(
                                "sequence {}: unknown effect {effect_id}",
                                sequence.id
                            )));
                        }
                    }
                    Step::Wait { .. } => {}
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::fixture::test::rgbw_device;
    use std::io::Write;

    const SHOW_JSON: &str = r##"{
        "devices": [
            {
                "id": "par-1",
                "name": "Par Left",
                "ip": "10.0.0.21",
                "universe": 0,
                "start_channel": 1,
                "layout": ["dimmer", "red", "green", "blue"]
            },
            {
                "id": "par-2",
                "name": "Par Right",
                "ip": "10.0.0.22",
                "universe": 0,
                "start_channel": 5,
                "layout": ["dimmer", "red", "green", "blue"]
            }
        ],
        "groups": [
            {"id": "pars", "name": "All Pars", "device_ids": ["par-1", "par-2"]}
        ],
        "scenes": [
            {
                "id": "warm",
                "name": "Warm Wash",
                "color": "#ff8800",
                "values": {"par-1": [255, 255, 120, 0], "par-2": [255, 255, 120, 0]}
            }
        ],
        "effects": [
            {
                "id": "blinder",
                "name": "Blinder",
                "device_ids": ["par-1", "par-2"],
                "type": "strobe",
                "frequency": 10.0
            }
        ],
        "sequences": [
            {
                "id": "opener",
                "name": "Opener",
                "loop": true,
                "steps": [
                    {"type": "scene", "scene_id": "warm", "duration": 4.0},
                    {"type": "effect", "effect_id": "blinder", "duration": 2.0},
                    {"type": "wait", "duration": 1.0}
                ]
            }
        ]
    }"##;

    #[test]
    fn test_parse_and_validate_full_show() {
        let show: Show = serde_json::from_str(SHOW_JSON).unwrap();
        show.validate().unwrap();
        assert_eq!(show.devices.len(), 2);
        assert!(matches!(
            show.effects[0].kind,
            EffectKind::Strobe { frequency } if frequency == 10.0
        ));
        assert!(show.sequences[0].looped);
    }

    #[test]
    fn test_load_show_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SHOW_JSON.as_bytes()).unwrap();
        let show = load_show(file.path()).unwrap();
        assert_eq!(show.scenes.len(), 1);
    }

    #[test]
    fn test_overlapping_devices_rejected() {
        let mut show: Show = serde_json::from_str(SHOW_JSON).unwrap();
        show.devices[1].start_channel = 3;
        assert!(matches!(show.validate(), Err(ShowError::Invalid(_))));
    }

    #[test]
    fn test_channel_range_past_universe_end_rejected() {
        let mut show: Show = serde_json::from_str(SHOW_JSON).unwrap();
        show.devices[1].start_channel = 510;
        assert!(show.validate().is_err());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let mut show: Show = serde_json::from_str(SHOW_JSON).unwrap();
        show.devices[1].id = "par-1".to_string();
        assert!(show.validate().is_err());
    }

    #[test]
    fn test_unknown_references_rejected() {
        let mut show: Show = serde_json::from_str(SHOW_JSON).unwrap();
        show.effects[0].device_ids.push("ghost".to_string());
        assert!(show.validate().is_err());

        let mut show: Show = serde_json::from_str(SHOW_JSON).unwrap();
        show.sequences[0].steps[0] = Step::Scene {
            scene_id: "ghost".to_string(),
            duration: 1.0,
        };
        assert!(show.validate().is_err());
    }

    #[test]
    fn test_effect_group_targets_validated() {
        let mut show: Show = serde_json::from_str(SHOW_JSON).unwrap();
        show.effects[0].group_ids.push("pars".to_string());
        show.validate().unwrap();

        show.effects[0].group_ids.push("ghost".to_string());
        assert!(show.validate().is_err());
    }

    #[test]
    fn test_invalid_effect_parameters_rejected() {
        let mut show: Show = serde_json::from_str(SHOW_JSON).unwrap();
        show.effects[0].kind = EffectKind::Strobe { frequency: 500.0 };
        assert!(show.validate().is_err());
    }

    #[test]
    fn test_universe_out_of_range_rejected() {
        let show = Show {
            devices: vec![Device {
                universe: 16,
                ..rgbw_device("par", 0, 1)
            }],
            ..Show::default()
        };
        assert!(show.validate().is_err());
    }
}
