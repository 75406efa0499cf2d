//! Physical constants in SI units.

pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;
pub const BOLTZMANN_CONSTANT: f64 = 1.380_649e-23;
/// IEEE reference noise temperature (K).
pub const STANDARD_TEMPERATURE: f64 = 290.0;
/// Sea-level pressure (hPa).
pub const STANDARD_PRESSURE: f64 = 1013.25;
pub const EARTH_RADIUS: f64 = 6_371_000.0;
pub const STANDARD_GRAVITY: f64 = 9.806_65;

/// Converts a power ratio in dB to linear scale.
pub fn db_to_linear(db: f64) -> f64 {
    10f64.powf(db / 10.0)
}

/// Converts a linear power ratio to dB.
pub fn linear_to_db(linear: f64) -> f64 {
    10.0 * linear.log10()
}
