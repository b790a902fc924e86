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

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::info;

use super::easing::lerp_u8;
use super::scheduler::DeviceUpdate;
use crate::dmx::store::ChannelStore;
use crate::fixture::Device;

/// How long a scene crossfade takes.
pub const FADE_SECONDS: f64 = 2.0;

/// The number of interpolation steps across the fade.
pub const FADE_STEPS: u32 = 50;

/// A full snapshot of device channel values, captured at creation time.
/// Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scene {
    pub id: String,
    pub name: String,
    /// UI color tag; not interpreted by the engine.
    #[serde(default)]
    pub color: String,
    /// Target channel values keyed by device id.
    pub values: HashMap<String, Vec<u8>>,
}

/// Crossfades the store from its current values to a scene snapshot.
///
/// Each activation is a short-lived task that self-stops after the fade. It
/// counts against no concurrency ceiling. Overlapping activations on the same
/// devices resolve last-writer-wins through the store, like any other writer.
/// A blackout calls [`SceneFader::stop_all`] so an in-flight fade cannot write
/// over the zeroed channels.
pub struct SceneFader {
    store: Arc<ChannelStore>,
    devices: Arc<RwLock<HashMap<String, Device>>>,
    updates: broadcast::Sender<DeviceUpdate>,
    cancel: watch::Sender<bool>,
}

/// One device's fade span: the values captured at activation and the target.
struct FadeSpan {
    device: Device,
    from: Vec<u8>,
    to: Vec<u8>,
}

/// Interpolates one frame of a fade at progress `t` in [0, 1]. A captured
/// slice shorter than the target is padded with zeros.
fn fade_frame(from: &[u8], to: &[u8], t: f64) -> Vec<u8> {
    to.iter()
        .enumerate()
        .map(|(i, target)| lerp_u8(from.get(i).copied().unwrap_or(0), *target, t))
        .collect()
}

impl SceneFader {
    pub fn new(
        store: Arc<ChannelStore>,
        devices: Arc<RwLock<HashMap<String, Device>>>,
        updates: broadcast::Sender<DeviceUpdate>,
    ) -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            store,
            devices,
            updates,
            cancel,
        }
    }

    /// Starts fading toward the scene's snapshot. Current values are captured
    /// up front, so the fade is unaffected by the scene activating again
    /// elsewhere. Devices in the scene that no longer exist are skipped.
    pub fn activate(&self, scene: &Scene) -> JoinHandle<()> {
        let spans: Vec<FadeSpan> = {
            let registry = self.devices.read();
            scene
                .values
                .iter()
                .filter_map(|(device_id, target)| {
                    let device = registry.get(device_id)?.clone();
                    let from = self.store.device_values(&device);
                    Some(FadeSpan {
                        device,
                        from,
                        to: target.clone(),
                    })
                })
                .collect()
        };
        info!(scene = scene.id, devices = spans.len(), "Activating scene.");

        let store = self.store.clone();
        let updates = self.updates.clone();
        let mut cancel = self.cancel.subscribe();
        tokio::spawn(async move {
            let step_duration = Duration::from_secs_f64(FADE_SECONDS / f64::from(FADE_STEPS));
            for step in 1..=FADE_STEPS {
                tokio::select! {
                    biased;
                    _ = cancel.changed() => return,
                    _ = tokio::time::sleep(step_duration) => {}
                }
                let t = f64::from(step) / f64::from(FADE_STEPS);
                for span in &spans {
                    let values = fade_frame(&span.from, &span.to, t);
                    store.write_device(&span.device, &values);
                    let _ = updates.send(DeviceUpdate {
                        device_id: span.device.id.clone(),
                        values,
                    });
                }
            }
        })
    }

    /// Cancels every in-flight fade before its next step. Channels stay at
    /// their last written values.
    pub fn stop_all(&self) {
        let _ = self.cancel.send(true);
    }
}
