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

use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{broadcast, watch};
use tracing::info;

use super::audio::{AudioFeed, AudioLevels};
use super::color::Color;
use super::error::LightingError;
use super::scene::{Scene, SceneFader};
use super::scheduler::{DeviceUpdate, Scheduler};
use super::sequence::{Sequence, SequencePlayer};
use crate::dmx::artnet::Transmitter;
use crate::dmx::store::ChannelStore;
use crate::fixture::Device;
use crate::lighting::scheduler::EffectInstance;
use crate::show::Show;

/// The facade the API layer drives. Owns the channel store, the registries
/// and the engine components, and translates ids into engine calls.
pub struct LightingSystem {
    store: Arc<ChannelStore>,
    devices: Arc<RwLock<HashMap<String, Device>>>,
    groups: RwLock<HashMap<String, Vec<String>>>,
    scenes: Arc<RwLock<HashMap<String, Scene>>>,
    effects: Arc<RwLock<HashMap<String, EffectInstance>>>,
    sequences: RwLock<HashMap<String, Sequence>>,
    scheduler: Arc<Scheduler>,
    fader: Arc<SceneFader>,
    player: SequencePlayer,
    audio: AudioFeed,
    updates: broadcast::Sender<DeviceUpdate>,
}

impl Default for LightingSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl LightingSystem {
    pub fn new() -> Self {
        let store = Arc::new(ChannelStore::new());
        let devices = Arc::new(RwLock::new(HashMap::new()));
        let scenes = Arc::new(RwLock::new(HashMap::new()));
        let effects = Arc::new(RwLock::new(HashMap::new()));
        let audio = AudioFeed::new();
        let (updates, _) = broadcast::channel(256);

        let scheduler = Arc::new(Scheduler::new(
            store.clone(),
            devices.clone(),
            audio.clone(),
            updates.clone(),
        ));
        let fader = Arc::new(SceneFader::new(
            store.clone(),
            devices.clone(),
            updates.clone(),
        ));
        let player = SequencePlayer::new(
            scheduler.clone(),
            fader.clone(),
            scenes.clone(),
            effects.clone(),
        );

        Self {
            store,
            devices,
            groups: RwLock::new(HashMap::new()),
            scenes,
            effects,
            sequences: RwLock::new(HashMap::new()),
            scheduler,
            fader,
            player,
            audio,
            updates,
        }
    }

    /// Replaces the registries with a validated show's contents. Running
    /// effects and sequences keep going; their targets resolve against the
    /// new device registry on their next tick.
    pub fn load(&self, show: &Show) {
        *self.devices.write() = show
            .devices
            .iter()
            .map(|device| (device.id.clone(), device.clone()))
            .collect();
        *self.groups.write() = show
            .groups
            .iter()
            .map(|group| (group.id.clone(), group.device_ids.clone()))
            .collect();
        *self.scenes.write() = show
            .scenes
            .iter()
            .map(|scene| (scene.id.clone(), scene.clone()))
            .collect();
        let group_devices: HashMap<&str, &Vec<String>> = show
            .groups
            .iter()
            .map(|group| (group.id.as_str(), &group.device_ids))
            .collect();
        *self.effects.write() = show
            .effects
            .iter()
            .map(|effect| {
                let mut instance = effect.to_instance();
                // Group targets expand to their devices, deduplicated.
                for group_id in &effect.group_ids {
                    for device_id in group_devices.get(group_id.as_str()).copied().into_iter().flatten() {
                        if !instance.device_ids.contains(device_id) {
                            instance.device_ids.push(device_id.clone());
                        }
                    }
                }
                (effect.id.clone(), instance)
            })
            .collect();
        *self.sequences.write() = show
            .sequences
            .iter()
            .map(|sequence| (sequence.id.clone(), sequence.clone()))
            .collect();
        info!(
            devices = show.devices.len(),
            scenes = show.scenes.len(),
            effects = show.effects.len(),
            sequences = show.sequences.len(),
            "Loaded show."
        );
    }

    /// Subscribes to per-device channel value changes for UI broadcast.
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceUpdate> {
        self.updates.subscribe()
    }

    /// Pushes a normalized audio feature frame for sound-reactive effects.
    pub fn on_audio_frame(&self, levels: AudioLevels) {
        self.audio.push(levels);
    }

    pub fn start_effect(&self, effect_id: &str) -> Result<(), LightingError> {
        let Some(instance) = self.effects.read().get(effect_id).cloned() else {
            return Err(LightingError::UnknownEffect(effect_id.to_string()));
        };
        self.scheduler.start(instance)
    }

    pub fn stop_effect(&self, effect_id: &str) -> Result<(), LightingError> {
        self.scheduler.stop(effect_id)
    }

    pub fn activate_scene(&self, scene_id: &str) -> Result<(), LightingError> {
        let Some(scene) = self.scenes.read().get(scene_id).cloned() else {
            return Err(LightingError::UnknownScene(scene_id.to_string()));
        };
        self.fader.activate(&scene);
        Ok(())
    }

    pub fn play_sequence(&self, sequence_id: &str) -> Result<(), LightingError> {
        let Some(sequence) = self.sequences.read().get(sequence_id).cloned() else {
            return Err(LightingError::UnknownSequence(sequence_id.to_string()));
        };
        self.player.play(sequence)
    }

    pub fn stop_sequence(&self, sequence_id: &str) -> Result<(), LightingError> {
        self.player.stop(sequence_id)
    }

    /// Direct manual override of one channel: a one-shot write, no task.
    pub fn set_device_channel(
        &self,
        device_id: &str,
        channel_index: u16,
        value: u8,
    ) -> Result<(), LightingError> {
        let Some(device) = self.devices.read().get(device_id).cloned() else {
            return Err(LightingError::UnknownDevice(device_id.to_string()));
        };
        // Indexes past the fixture's channel range are ignored, same as the
        // store's out-of-range policy.
        if usize::from(channel_index) >= device.channel_count() {
            return Ok(());
        }
        self.store.write(
            device.universe,
            device.channel_offset() as u16 + channel_index,
            i32::from(value),
        );
        let _ = self.updates.send(DeviceUpdate {
            device_id: device.id.clone(),
            values: self.store.device_values(&device),
        });
        Ok(())
    }

    /// Sets every device in a group to a brightness level in [0, 1],
    /// preserving each fixture's current color.
    pub fn set_group_intensity(
        &self,
        group_id: &str,
        intensity: f64,
    ) -> Result<(), LightingError> {
        let intensity = intensity.clamp(0.0, 1.0);
        self.with_group(group_id, |device, store| {
            let mut values = store.device_values(device);
            match device.dimmer_index().filter(|i| *i < values.len()) {
                Some(index) => values[index] = (intensity * 255.0).round() as u8,
                None => {
                    for value in &mut values {
                        *value = (f64::from(*value) * intensity).round() as u8;
                    }
                }
            }
            values
        })
    }

    /// Paints every device in a group with a color at full brightness.
    pub fn set_group_color(&self, group_id: &str, color: Color) -> Result<(), LightingError> {
        self.with_group(group_id, |device, _| device.paint_color(color, 1.0))
    }

    fn with_group(
        &self,
        group_id: &str,
        frame: impl Fn(&Device, &ChannelStore) -> Vec<u8>,
    ) -> Result<(), LightingError> {
        let Some(device_ids) = self.groups.read().get(group_id).cloned() else {
            return Err(LightingError::UnknownGroup(group_id.to_string()));
        };
        let registry = self.devices.read();
        for device_id in &device_ids {
            let Some(device) = registry.get(device_id) else {
                continue;
            };
            let values = frame(device, &self.store);
            self.store.write_device(device, &values);
            let _ = self.updates.send(DeviceUpdate {
                device_id: device.id.clone(),
                values,
            });
        }
        Ok(())
    }

    /// Stops every effect, sequence and in-flight scene fade and zeroes all
    /// channels.
    pub fn blackout(&self) {
        self.player.stop_all();
        self.scheduler.stop_all();
        self.fader.stop_all();
        self.store.blackout();
        let registry = self.devices.read();
        for device in registry.values() {
            let _ = self.updates.send(DeviceUpdate {
                device_id: device.id.clone(),
                values: vec![0; device.channel_count()],
            });
        }
        info!("Blackout.");
    }

    /// Spawns the Art-Net transmit loop. Returns the cancel handle.
    pub async fn start_transmitter(&self, rate_hz: f64) -> io::Result<watch::Sender<bool>> {
        let transmitter = Transmitter::new(self.store.clone(), self.devices.clone()).await?;
        let (cancel_tx, cancel_rx) = watch::channel(false);
        tokio::spawn(transmitter.run(rate_hz, cancel_rx));
        Ok(cancel_tx)
    }
}
