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
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::error::LightingError;
use super::scene::{Scene, SceneFader};
use super::scheduler::{EffectInstance, Scheduler};

/// The ceiling on concurrently running sequences.
pub const MAX_RUNNING_SEQUENCES: usize = 5;

/// One step of a sequence timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Step {
    /// Activates a scene, then waits `duration` seconds (not the fade time).
    Scene { scene_id: String, duration: f64 },
    /// Starts an effect, waits `duration` seconds, then stops it.
    Effect { effect_id: String, duration: f64 },
    /// Just waits.
    Wait { duration: f64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sequence {
    pub id: String,
    pub name: String,
    #[serde(rename = "loop", default)]
    pub looped: bool,
    pub steps: Vec<Step>,
}

struct RunningSequence {
    cancel: watch::Sender<bool>,
    handle: JoinHandle<()>,
    /// Identifies which run owns the registry entry. A naturally ending task
    /// may only deregister an entry carrying its own generation.
    generation: u64,
}

/// Plays sequences as cancellable tasks, one active step at a time.
///
/// Stopping a sequence aborts the current step's wait immediately rather than
/// letting it run out, and stops the step's effect if one is running.
pub struct SequencePlayer {
    scheduler: Arc<Scheduler>,
    fader: Arc<SceneFader>,
    scenes: Arc<RwLock<HashMap<String, Scene>>>,
    effects: Arc<RwLock<HashMap<String, EffectInstance>>>,
    running: Arc<Mutex<HashMap<String, RunningSequence>>>,
    generations: AtomicU64,
}

impl SequencePlayer {
    pub fn new(
        scheduler: Arc<Scheduler>,
        fader: Arc<SceneFader>,
        scenes: Arc<RwLock<HashMap<String, Scene>>>,
        effects: Arc<RwLock<HashMap<String, EffectInstance>>>,
    ) -> Self {
        Self {
            scheduler,
            fader,
            scenes,
            effects,
            running: Arc::new(Mutex::new(HashMap::new())),
            generations: AtomicU64::new(0),
        }
    }

    pub fn running_count(&self) -> usize {
        self.running.lock().len()
    }

    pub fn is_running(&self, sequence_id: &str) -> bool {
        self.running.lock().contains_key(sequence_id)
    }

    /// Starts playing a sequence. Replaying a running id restarts it from the
    /// first step. Fails fast at the ceiling, leaving existing state alone.
    pub fn play(&self, sequence: Sequence) -> Result<(), LightingError> {
        let mut running = self.running.lock();
        if let Some(existing) = running.remove(&sequence.id) {
            let _ = existing.cancel.send(true);
            existing.handle.abort();
        }
        if running.len() >= MAX_RUNNING_SEQUENCES {
            return Err(LightingError::SequenceCeiling {
                limit: MAX_RUNNING_SEQUENCES,
            });
        }

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let generation = self.generations.fetch_add(1, Ordering::Relaxed);
        let sequence_id = sequence.id.clone();
        let handle = tokio::spawn(run_sequence(
            sequence,
            generation,
            self.scheduler.clone(),
            self.fader.clone(),
            self.scenes.clone(),
            self.effects.clone(),
            self.running.clone(),
            cancel_rx,
        ));
        info!(sequence = sequence_id, "Started sequence.");
        running.insert(
            sequence_id,
            RunningSequence {
                cancel: cancel_tx,
                handle,
                generation,
            },
        );
        Ok(())
    }

    /// Stops a running sequence, aborting its current wait immediately.
    pub fn stop(&self, sequence_id: &str) -> Result<(), LightingError> {
        let Some(existing) = self.running.lock().remove(sequence_id) else {
            return Err(LightingError::UnknownSequence(sequence_id.to_string()));
        };
        let _ = existing.cancel.send(true);
        info!(sequence = sequence_id, "Stopped sequence.");
        Ok(())
    }

    pub fn stop_all(&self) {
        let mut running = self.running.lock();
        for (_, existing) in running.drain() {
            let _ = existing.cancel.send(true);
        }
    }
}

/// Waits out a step duration. Returns true if the sequence was cancelled
/// before the duration elapsed.
async fn cancelled_during(cancel: &mut watch::Receiver<bool>, duration: f64) -> bool {
    tokio::select! {
        biased;
        _ = cancel.changed() => true,
        _ = tokio::time::sleep(Duration::from_secs_f64(duration.max(0.0))) => false,
    }
}

/// Removes a run's registry entry if that run still owns it. A replay can
/// re-register the id before the naturally ending task gets here; the newer
/// run's entry must survive.
fn deregister(
    running: &Mutex<HashMap<String, RunningSequence>>,
    sequence_id: &str,
    generation: u64,
) {
    let mut running = running.lock();
    if running
        .get(sequence_id)
        .is_some_and(|run| run.generation == generation)
    {
        running.remove(sequence_id);
    }
}

async fn run_sequence(
    sequence: Sequence,
    generation: u64,
    scheduler: Arc<Scheduler>,
    fader: Arc<SceneFader>,
    scenes: Arc<RwLock<HashMap<String, Scene>>>,
    effects: Arc<RwLock<HashMap<String, EffectInstance>>>,
    running: Arc<Mutex<HashMap<String, RunningSequence>>>,
    mut cancel: watch::Receiver<bool>,
) {
    loop {
        for step in &sequence.steps {
            match step {
                Step::Scene { scene_id, duration } => {
                    let scene = scenes.read().get(scene_id).cloned();
                    match scene {
                        Some(scene) => {
                            fader.activate(&scene);
                        }
                        None => warn!(
                            sequence = sequence.id,
                            scene = scene_id,
                            "Sequence step references an unknown scene."
                        ),
                    }
                    if cancelled_during(&mut cancel, *duration).await {
                        return;
                    }
                }
                Step::Effect {
                    effect_id,
                    duration,
                } => {
                    let instance = effects.read().get(effect_id).cloned();
                    match instance {
                        Some(instance) => {
                            if let Err(err) = scheduler.start(instance) {
                                warn!(
                                    sequence = sequence.id,
                                    effect = effect_id,
                                    err = err.to_string(),
                                    "Sequence step could not start effect."
                                );
                            }
                        }
                        None => warn!(
                            sequence = sequence.id,
                            effect = effect_id,
                            "Sequence step references an unknown effect."
                        ),
                    }
                    let was_cancelled = cancelled_during(&mut cancel, *duration).await;
                    let _ = scheduler.stop(effect_id);
                    if was_cancelled {
                        return;
                    }
                }
                Step::Wait { duration } => {
                    if cancelled_during(&mut cancel, *duration).await {
                        return;
                    }
                }
            }
        }
        if !sequence.looped {
            break;
        }
    }
    // Natural end: deregister ourselves, unless a replay took over the id.
    deregister(&running, &sequence.id, generation);
}
