//! Pulse radar simulation core.
//!
//! Physics (radar equation, gaseous attenuation, Swerling RCS), the signal
//! chain (waveforms, matched filter, Doppler, CFAR), a time-stepped engine that
//! turns moving targets into detections, and multi-sensor fusion.

pub mod engine;
pub mod fusion;
pub mod interface;
pub mod math;
pub mod physics;
pub mod prelude;
pub mod processing;
pub mod telemetry;

pub use prelude::{ProcessingStage, RadarError, RadarResult, StageInput, StageOutput};
