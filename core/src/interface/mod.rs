//! Records the core hands to external collaborators: detections for display
//! and fusion, feature vectors for classification.

pub mod detection;
pub mod feature;

pub use detection::{Detection, MeasurementAccuracy, TargetId};
pub use feature::FeatureVector;
