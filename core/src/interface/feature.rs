use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::fusion::measurement::FusedTrack;
use crate::interface::detection::Detection;

/// Flat record handed to an external classifier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub position: [f64; 3],
    pub velocity: [f64; 3],
    pub rcs: f64,
    pub snr_db: f64,
}

impl FeatureVector {
    pub const LEN: usize = 8;

    pub fn from_detection(detection: &Detection, radar_position: &Vector3<f64>) -> Self {
        let position = detection.position(radar_position);
        let velocity = detection.radial_velocity_vector();
        Self {
            position: [position.x, position.y, position.z],
            velocity: [velocity.x, velocity.y, velocity.z],
            rcs: detection.rcs,
            snr_db: detection.snr_db,
        }
    }

    /// Tracks carry no reflectivity of their own; the caller supplies the
    /// latest RCS and SNR seen for them.
    pub fn from_track(track: &FusedTrack, rcs: f64, snr_db: f64) -> Self {
        let position = track.position();
        let velocity = track.velocity();
        Self {
            position: [position.x, position.y, position.z],
            velocity: [velocity.x, velocity.y, velocity.z],
            rcs,
            snr_db,
        }
    }

    pub fn to_array(&self) -> [f64; Self::LEN] {
        [
            self.position[0],
            self.position[1],
            self.position[2],
            self.velocity[0],
            self.velocity[1],
            self.velocity[2],
            self.rcs,
            self.snr_db,
        ]
    }
}
