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
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::audio::AudioFeed;
use super::effects::generator::{self, EffectState};
use super::effects::{EffectKind, SoundConfig};
use super::error::LightingError;
use crate::dmx::store::ChannelStore;
use crate::fixture::Device;

/// The hard ceiling on concurrently running effect instances. `start` fails
/// fast at the ceiling; nothing is queued.
pub const MAX_RUNNING_EFFECTS: usize = 20;

/// A notification that a device's channel values changed, for UI broadcast.
#[derive(Debug, Clone)]
pub struct DeviceUpdate {
    pub device_id: String,
    pub values: Vec<u8>,
}

/// An effect definition resolved and ready to run.
#[derive(Debug, Clone)]
pub struct EffectInstance {
    pub id: String,
    pub kind: EffectKind,
    pub device_ids: Vec<String>,
    pub sound: Option<SoundConfig>,
}

struct RunningEffect {
    cancel: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Runs effect instances as independently clocked tasks writing into the
/// shared channel store.
///
/// Each instance gets its own tick interval at the effect's natural cadence.
/// Ticks resolve target devices by id at tick time, so a deleted device is
/// silently skipped while the rest of the instance keeps running. A tick
/// failure in one instance never reaches another.
pub struct Scheduler {
    store: Arc<ChannelStore>,
    devices: Arc<RwLock<HashMap<String, Device>>>,
    audio: AudioFeed,
    updates: broadcast::Sender<DeviceUpdate>,
    running: Mutex<HashMap<String, RunningEffect>>,
}

impl Scheduler {
    pub fn new(
        store: Arc<ChannelStore>,
        devices: Arc<RwLock<HashMap<String, Device>>>,
        audio: AudioFeed,
        updates: broadcast::Sender<DeviceUpdate>,
    ) -> Self {
        Self {
            store,
            devices,
            audio,
            updates,
            running: Mutex::new(HashMap::new()),
        }
    }

    pub fn running_count(&self) -> usize {
        self.running.lock().len()
    }

    pub fn is_running(&self, effect_id: &str) -> bool {
        self.running.lock().contains_key(effect_id)
    }

    /// Starts an effect instance. Restarting a running id stops the old run
    /// first, so elapsed time starts over from zero.
    pub fn start(&self, instance: EffectInstance) -> Result<(), LightingError> {
        instance.kind.validate()?;

        let mut running = self.running.lock();
        if let Some(existing) = running.remove(&instance.id) {
            let _ = existing.cancel.send(true);
            existing.handle.abort();
        }
        if running.len() >= MAX_RUNNING_EFFECTS {
            return Err(LightingError::ResourceExhausted {
                limit: MAX_RUNNING_EFFECTS,
            });
        }

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let handle = tokio::spawn(run_instance(
            instance.clone(),
            self.store.clone(),
            self.devices.clone(),
            self.audio.clone(),
            self.updates.clone(),
            cancel_rx,
        ));
        info!(effect = instance.id, "Started effect.");
        running.insert(
            instance.id,
            RunningEffect {
                cancel: cancel_tx,
                handle,
            },
        );
        Ok(())
    }

    /// Stops a running instance. The in-flight tick completes; no further
    /// ticks occur. Channel values stay at their last written state.
    pub fn stop(&self, effect_id: &str) -> Result<(), LightingError> {
        let Some(existing) = self.running.lock().remove(effect_id) else {
            return Err(LightingError::UnknownEffect(effect_id.to_string()));
        };
        let _ = existing.cancel.send(true);
        info!(effect = effect_id, "Stopped effect.");
        Ok(())
    }

    /// Stops every running instance.
    pub fn stop_all(&self) {
        let mut running = self.running.lock();
        for (effect_id, existing) in running.drain() {
            let _ = existing.cancel.send(true);
            debug!(effect = effect_id, "Stopped effect.");
        }
    }
}

async fn run_instance(
    instance: EffectInstance,
    store: Arc<ChannelStore>,
    devices: Arc<RwLock<HashMap<String, Device>>>,
    audio: AudioFeed,
    updates: broadcast::Sender<DeviceUpdate>,
    mut cancel: watch::Receiver<bool>,
) {
    let mut state = EffectState::new();
    let started = tokio::time::Instant::now();
    let mut interval =
        tokio::time::interval(Duration::from_secs_f64(1.0 / instance.kind.tick_rate()));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            // Cancellation wins over a due tick, so a stop is effective
            // before the next tick boundary.
            biased;
            _ = cancel.changed() => return,
            _ = interval.tick() => {}
        }

        // Resolve targets at tick time; deleted devices are skipped.
        let targets: Vec<Device> = {
            let registry = devices.read();
            instance
                .device_ids
                .iter()
                .filter_map(|id| registry.get(id).cloned())
                .collect()
        };
        if targets.is_empty() {
            continue;
        }

        let elapsed = started.elapsed().as_secs_f64();
        let mut writes = generator::render(&instance.kind, &mut state, elapsed, &targets);
        if let Some(sound) = &instance.sound {
            generator::apply_sound(
                sound,
                audio.current(),
                elapsed,
                &mut state,
                &targets,
                &mut writes,
            );
        }

        for write in writes {
            let Some(device) = targets.iter().find(|device| device.id == write.device_id) else {
                continue;
            };
            store.write_device(device, &write.values);
            let _ = updates.send(DeviceUpdate {
                device_id: write.device_id,
                values: write.values,
            });
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::fixture::test::rgbw_device;
    use crate::lighting::color::WHITE;

    fn test_scheduler() -> (Scheduler, Arc<ChannelStore>) {
        let store = Arc::new(ChannelStore::new());
        let devices = Arc::new(RwLock::new(HashMap::new()));
        devices
            .write()
            .insert("par".to_string(), rgbw_device("par", 0, 1));
        let (updates, _) = broadcast::channel(64);
        let scheduler = Scheduler::new(store.clone(), devices, AudioFeed::new(), updates);
        (scheduler, store)
    }

    fn strobe_instance(id: &str) -> EffectInstance {
        EffectInstance {
            id: id.to_string(),
            kind: EffectKind::Strobe { frequency: 2.0 },
            device_ids: vec!["par".to_string()],
            sound: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_effect_writes_to_store() {
        let (scheduler, store) = test_scheduler();
        scheduler.start(strobe_instance("fx")).unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        // Early in the strobe period the fixture is full on.
        assert_eq!(store.snapshot(0)[0], 255);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ceiling_rejects_twenty_first_effect() {
        let (scheduler, _store) = test_scheduler();
        for i in 0..MAX_RUNNING_EFFECTS {
            scheduler.start(strobe_instance(&format!("fx-{i}"))).unwrap();
        }
        assert_eq!(scheduler.running_count(), MAX_RUNNING_EFFECTS);

        let result = scheduler.start(strobe_instance("one-too-many"));
        assert!(matches!(
            result,
            Err(LightingError::ResourceExhausted { limit: MAX_RUNNING_EFFECTS })
        ));
        // Existing instances are untouched.
        assert_eq!(scheduler.running_count(), MAX_RUNNING_EFFECTS);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_halts_ticks_and_leaves_values() {
        let (scheduler, store) = test_scheduler();
        scheduler.start(strobe_instance("fx")).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.snapshot(0)[0], 255);

        scheduler.stop("fx").unwrap();
        assert_eq!(scheduler.running_count(), 0);

        // No further ticks: values stay where the last tick left them.
        store.write(0, 0, 42);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(store.snapshot(0)[0], 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_unknown_effect_errors() {
        let (scheduler, _store) = test_scheduler();
        assert!(matches!(
            scheduler.stop("nope"),
            Err(LightingError::UnknownEffect(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_replaces_running_instance() {
        let (scheduler, _store) = test_scheduler();
        scheduler.start(strobe_instance("fx")).unwrap();
        scheduler.start(strobe_instance("fx")).unwrap();
        assert_eq!(scheduler.running_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_resets_elapsed_time() {
        let (scheduler, store) = test_scheduler();
        // Slow strobe: on for the first 2 seconds of each 4-second period.
        let instance = EffectInstance {
            kind: EffectKind::Strobe { frequency: 0.25 },
            ..strobe_instance("fx")
        };
        scheduler.start(instance.clone()).unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;
        // 3 seconds in, the strobe is in its off phase.
        assert_eq!(store.snapshot(0)[0], 0);

        // Restarting puts it back at the start of the on phase, so no
        // residual phase carries over.
        scheduler.start(instance).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.snapshot(0)[0], 255);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_device_is_skipped() {
        let (scheduler, store) = test_scheduler();
        let instance = EffectInstance {
            id: "fx".to_string(),
            kind: EffectKind::Chase {
                speed: 1.0,
                color: WHITE,
            },
            device_ids: vec!["gone".to_string()],
            sound: None,
        };
        scheduler.start(instance).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        // The instance keeps running but writes nothing.
        assert!(scheduler.is_running("fx"));
        assert_eq!(store.snapshot(0)[0], 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_effect_rejected_before_running() {
        let (scheduler, _store) = test_scheduler();
        let instance = EffectInstance {
            id: "fx".to_string(),
            kind: EffectKind::Strobe { frequency: 0.0 },
            device_ids: vec!["par".to_string()],
            sound: None,
        };
        assert!(scheduler.start(instance).is_err());
        assert_eq!(scheduler.running_count(), 0);
    }
}
