//! Radar physics: propagation, receiver noise and target reflectivity.

pub mod atmospheric;
pub mod constants;
pub mod radar_equation;
pub mod rcs;

pub use atmospheric::{atmospheric_attenuation, attenuation_for, AtmosphericConditions};
pub use radar_equation::{
    detection_range, doppler_shift, noise_power, received_power, snr, RadarParameters,
};
pub use rcs::{aspect_dependent_rcs, sample_rcs, RcsFluctuation, SwerlingCase, TargetType};
