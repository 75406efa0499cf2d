//! Runs a [`SimulationEngine`] on a dedicated worker thread.
//!
//! The worker is the engine's only writer. Commands arrive over an unbounded
//! channel and are applied between ticks; each tick publishes a snapshot on a
//! watch channel. `stop` is honoured at the next tick boundary.

use serde::{Deserialize, Serialize};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot, watch};

use crate::engine::simulation::SimulationEngine;
use crate::engine::state::{EngineStatus, MissileSpec, SimulationSnapshot, TargetSpec};
use crate::interface::detection::TargetId;
use crate::prelude::{require_positive, RadarError, RadarResult};
use crate::telemetry::log::LogManager;

pub enum EngineCommand {
    AddTarget(TargetSpec, oneshot::Sender<RadarResult<TargetId>>),
    AddMissile(MissileSpec, oneshot::Sender<RadarResult<TargetId>>),
    RemoveTarget(TargetId, oneshot::Sender<RadarResult<bool>>),
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub dt: f64,
    /// Wall-clock pause after each tick; `None` runs flat out.
    pub tick_interval: Option<Duration>,
    pub max_ticks: Option<u64>,
    /// Detections carried in each published snapshot.
    pub recent_detections: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            dt: 0.1,
            tick_interval: Some(Duration::from_millis(100)),
            max_ticks: None,
            recent_detections: 64,
        }
    }
}

fn host_gone() -> RadarError {
    RadarError::InvalidState("engine host has shut down".into())
}

/// Cloneable client side of a running host.
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::UnboundedSender<EngineCommand>,
    snapshots: watch::Receiver<SimulationSnapshot>,
}

impl EngineHandle {
    fn send(&self, command: EngineCommand) -> RadarResult<()> {
        self.commands.send(command).map_err(|_| host_gone())
    }

    pub async fn add_target(&self, spec: TargetSpec) -> RadarResult<TargetId> {
        let (reply, response) = oneshot::channel();
        self.send(EngineCommand::AddTarget(spec, reply))?;
        response.await.map_err(|_| host_gone())?
    }

    pub async fn add_missile(&self, spec: MissileSpec) -> RadarResult<TargetId> {
        let (reply, response) = oneshot::channel();
        self.send(EngineCommand::AddMissile(spec, reply))?;
        response.await.map_err(|_| host_gone())?
    }

    pub async fn remove_target(&self, id: TargetId) -> RadarResult<bool> {
        let (reply, response) = oneshot::channel();
        self.send(EngineCommand::RemoveTarget(id, reply))?;
        response.await.map_err(|_| host_gone())?
    }

    /// Blocking variants for callers outside an async runtime.
    pub fn blocking_add_target(&self, spec: TargetSpec) -> RadarResult<TargetId> {
        let (reply, response) = oneshot::channel();
        self.send(EngineCommand::AddTarget(spec, reply))?;
        response.blocking_recv().map_err(|_| host_gone())?
    }

    pub fn blocking_add_missile(&self, spec: MissileSpec) -> RadarResult<TargetId> {
        let (reply, response) = oneshot::channel();
        self.send(EngineCommand::AddMissile(spec, reply))?;
        response.blocking_recv().map_err(|_| host_gone())?
    }

    pub fn blocking_remove_target(&self, id: TargetId) -> RadarResult<bool> {
        let (reply, response) = oneshot::channel();
        self.send(EngineCommand::RemoveTarget(id, reply))?;
        response.blocking_recv().map_err(|_| host_gone())?
    }

    /// Requests a stop; a host that already exited is not an error.
    pub fn stop(&self) {
        let _ = self.commands.send(EngineCommand::Stop);
    }

    pub fn latest_snapshot(&self) -> SimulationSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Waits for the next published snapshot.
    pub async fn next_snapshot(&mut self) -> RadarResult<SimulationSnapshot> {
        self.snapshots.changed().await.map_err(|_| host_gone())?;
        Ok(self.snapshots.borrow_and_update().clone())
    }
}

pub struct EngineHost {
    handle: EngineHandle,
    worker: JoinHandle<SimulationEngine>,
}

impl EngineHost {
    pub fn spawn(mut engine: SimulationEngine, config: HostConfig) -> RadarResult<Self> {
        require_positive("dt", config.dt)?;
        engine.start()?;

        let (commands, inbox) = mpsc::unbounded_channel();
        let (publisher, snapshots) =
            watch::channel(engine.snapshot(config.recent_detections));
        let worker = thread::Builder::new()
            .name("radar-engine".into())
            .spawn(move || run_worker(engine, config, inbox, publisher))
            .map_err(|err| RadarError::InvalidState(format!("spawning engine worker: {}", err)))?;

        Ok(Self {
            handle: EngineHandle {
                commands,
                snapshots,
            },
            worker,
        })
    }

    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    pub fn stop(&self) {
        self.handle.stop();
    }

    /// Waits for the worker and returns the stopped engine. Without a tick
    /// limit the worker exits once every handle is dropped or `stop` is sent.
    pub fn join(self) -> RadarResult<SimulationEngine> {
        let EngineHost { handle, worker } = self;
        drop(handle);
        worker
            .join()
            .map_err(|_| RadarError::InvalidState("engine worker panicked".into()))
    }
}

fn apply(engine: &mut SimulationEngine, command: EngineCommand) -> bool {
    match command {
        EngineCommand::AddTarget(spec, reply) => {
            let _ = reply.send(engine.add_target(spec));
        }
        EngineCommand::AddMissile(spec, reply) => {
            let _ = reply.send(engine.add_missile(spec));
        }
        EngineCommand::RemoveTarget(id, reply) => {
            let _ = reply.send(engine.remove_target(id));
        }
        EngineCommand::Stop => return true,
    }
    false
}

fn run_worker(
    mut engine: SimulationEngine,
    config: HostConfig,
    mut inbox: mpsc::UnboundedReceiver<EngineCommand>,
    publisher: watch::Sender<SimulationSnapshot>,
) -> SimulationEngine {
    let logger = LogManager::new("host");
    loop {
        let mut stop_requested = false;
        loop {
            match inbox.try_recv() {
                Ok(command) => stop_requested |= apply(&mut engine, command),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    stop_requested |= config.max_ticks.is_none();
                    break;
                }
            }
        }
        if stop_requested {
            break;
        }
        if config
            .max_ticks
            .is_some_and(|limit| engine.state().tick >= limit)
        {
            break;
        }
        if let Err(err) = engine.advance_tick(config.dt) {
            logger.warn(&format!("tick failed, halting host: {}", err));
            break;
        }
        publisher.send_replace(engine.snapshot(config.recent_detections));
        if let Some(interval) = config.tick_interval {
            thread::sleep(interval);
        }
    }

    engine.stop();
    debug_assert_eq!(engine.status(), EngineStatus::Stopped);
    publisher.send_replace(engine.snapshot(config.recent_detections));
    logger.record(&format!("worker exiting at tick {}", engine.state().tick));
    engine
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::simulation::EngineConfig;
    use crate::physics::radar_equation::RadarParameters;
    use nalgebra::Vector3;
    use std::time::Instant;

    fn engine() -> SimulationEngine {
        SimulationEngine::new(RadarParameters::default(), EngineConfig::default()).unwrap()
    }

    #[test]
    fn bounded_run_stops_by_itself() {
        let host = EngineHost::spawn(
            engine(),
            HostConfig {
                dt: 0.5,
                tick_interval: None,
                max_ticks: Some(8),
                recent_detections: 4,
            },
        )
        .unwrap();
        let handle = host.handle();
        let engine = host.join().unwrap();
        assert_eq!(engine.status(), EngineStatus::Stopped);
        assert_eq!(engine.state().tick, 8);
        assert!((engine.state().timestamp - 4.0).abs() < 1e-12);
        let last = handle.latest_snapshot();
        assert_eq!(last.status, EngineStatus::Stopped);
        assert_eq!(last.tick, 8);
        assert!(matches!(
            handle.blocking_add_target(TargetSpec::new(Vector3::new(1.0, 0.0, 0.0), Vector3::zeros(), 1.0)),
            Err(RadarError::InvalidState(_))
        ));
    }

    #[test]
    fn commands_are_serialised_with_ticks() {
        let host = EngineHost::spawn(
            engine(),
            HostConfig {
                dt: 0.1,
                tick_interval: Some(Duration::from_millis(1)),
                max_ticks: None,
                recent_detections: 16,
            },
        )
        .unwrap();
        let handle = host.handle();
        let id = handle
            .blocking_add_target(TargetSpec::new(Vector3::new(5_000.0, 0.0, 0.0), Vector3::zeros(), 1.0))
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(10);
        while handle.latest_snapshot().detections.len() < 3 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
        assert!(handle.blocking_remove_target(id).unwrap());
        handle.stop();
        let engine = host.join().unwrap();
        assert_eq!(engine.status(), EngineStatus::Stopped);
        assert!(engine.state().targets.is_empty());
        assert!(engine.state().detections.len() >= 3);
        assert!(engine.state().detections.iter().all(|d| d.target == id));
    }

    #[test]
    fn stopped_engine_cannot_be_hosted() {
        let mut engine = engine();
        engine.stop();
        assert!(matches!(
            EngineHost::spawn(engine, HostConfig::default()),
            Err(RadarError::InvalidState(_))
        ));
    }
}
