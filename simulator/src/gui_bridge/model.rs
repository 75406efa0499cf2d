use crate::workflow::runner::TrackReport;
use radarcore::engine::SimulationSnapshot;
use radarcore::telemetry::PerformanceReport;
use serde::Serialize;

/// Everything the external display polls for.
#[derive(Debug, Clone, Serialize)]
pub struct VisualizationModel {
    pub snapshot: SimulationSnapshot,
    pub tracks: Vec<TrackReport>,
    pub performance: PerformanceReport,
    pub power_profile: Vec<f64>,
    pub detection_count: usize,
    pub notes: Vec<String>,
}

impl Default for VisualizationModel {
    fn default() -> Self {
        Self {
            snapshot: SimulationSnapshot::empty(),
            tracks: Vec::new(),
            performance: PerformanceReport::default(),
            power_profile: Vec::new(),
            detection_count: 0,
            notes: Vec::new(),
        }
    }
}

impl VisualizationModel {
    pub fn from_tick(snapshot: &SimulationSnapshot, tracks: &[TrackReport]) -> Self {
        Self {
            snapshot: snapshot.clone(),
            tracks: tracks.to_vec(),
            detection_count: snapshot.detections.len(),
            ..Default::default()
        }
    }
}
