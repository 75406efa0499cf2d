//! Gaseous attenuation after the simplified ITU-R P.676 line-shape model.
//!
//! Specific attenuation (dB/km) of dry air and water vapour is evaluated at the
//! surface and integrated along a slant path through exponentially thinning
//! layers. Valid from 1 to 350 GHz.

use serde::{Deserialize, Serialize};

use super::constants::STANDARD_PRESSURE;
use crate::prelude::{require_positive, RadarError, RadarResult};

/// Oxygen equivalent height (km).
const OXYGEN_SCALE_HEIGHT_KM: f64 = 6.0;
/// Water-vapour equivalent height (km).
const WATER_VAPOUR_SCALE_HEIGHT_KM: f64 = 2.0;
/// Upper validity bound of the line-shape fit (GHz).
const MAX_FREQUENCY_GHZ: f64 = 350.0;
/// Peak oxygen absorption of the 60 GHz complex at sea level (dB/km).
const OXYGEN_PEAK_DB_PER_KM: f64 = 15.0;

/// Surface meteorological conditions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AtmosphericConditions {
    /// Pressure (hPa).
    pub pressure: f64,
    /// Temperature (°C).
    pub temperature: f64,
    /// Relative humidity (%).
    pub humidity: f64,
}

impl Default for AtmosphericConditions {
    fn default() -> Self {
        Self {
            pressure: STANDARD_PRESSURE,
            temperature: 15.0,
            humidity: 60.0,
        }
    }
}

/// One-way gaseous attenuation (dB) along a path of `range` metres leaving the
/// surface at `elevation_angle` radians. Negative elevations are treated as a
/// horizontal surface path.
pub fn atmospheric_attenuation(
    frequency: f64,
    range: f64,
    elevation_angle: f64,
    pressure: f64,
    temperature: f64,
    humidity: f64,
) -> RadarResult<f64> {
    require_positive("frequency", frequency)?;
    require_positive("pressure", pressure)?;
    if !range.is_finite() || range < 0.0 {
        return Err(RadarError::InvalidParameter(format!(
            "range must be non-negative, got {}",
            range
        )));
    }
    if !elevation_angle.is_finite() {
        return Err(RadarError::InvalidParameter("elevation must be finite".into()));
    }
    if !temperature.is_finite() || temperature <= -273.15 {
        return Err(RadarError::InvalidParameter(format!(
            "temperature {} °C is below absolute zero",
            temperature
        )));
    }
    if !(0.0..=100.0).contains(&humidity) {
        return Err(RadarError::InvalidParameter(format!(
            "relative humidity must lie in [0, 100], got {}",
            humidity
        )));
    }
    let frequency_ghz = frequency / 1e9;
    if frequency_ghz > MAX_FREQUENCY_GHZ {
        return Err(RadarError::InvalidParameter(format!(
            "frequency {} GHz outside attenuation model",
            frequency_ghz
        )));
    }
    if range == 0.0 {
        return Ok(0.0);
    }

    let rp = pressure / STANDARD_PRESSURE;
    let rt = 288.0 / (273.15 + temperature);
    let density = water_vapour_density(temperature, humidity);

    let gamma_oxygen = oxygen_specific_attenuation(frequency_ghz) * rp * rp * rt.powi(3);
    let gamma_water = water_vapour_specific_attenuation(frequency_ghz, density) * rt;

    let range_km = range / 1_000.0;
    let sin_elevation = elevation_angle.sin().max(0.0);
    Ok(gamma_oxygen * path_length(range_km, sin_elevation, OXYGEN_SCALE_HEIGHT_KM)
        + gamma_water * path_length(range_km, sin_elevation, WATER_VAPOUR_SCALE_HEIGHT_KM))
}

/// Same as [`atmospheric_attenuation`] with the conditions bundled.
pub fn attenuation_for(
    frequency: f64,
    range: f64,
    elevation_angle: f64,
    conditions: &AtmosphericConditions,
) -> RadarResult<f64> {
    atmospheric_attenuation(
        frequency,
        range,
        elevation_angle,
        conditions.pressure,
        conditions.temperature,
        conditions.humidity,
    )
}

/// Equivalent surface path length (km) through a layer with scale height `h`.
fn path_length(range_km: f64, sin_elevation: f64, h: f64) -> f64 {
    let climb = range_km * sin_elevation;
    if climb < 1e-9 {
        return range_km;
    }
    h / sin_elevation * (1.0 - (-climb / h).exp())
}

/// Absolute humidity (g/m³) from temperature (°C) and relative humidity (%).
fn water_vapour_density(temperature: f64, humidity: f64) -> f64 {
    let saturation_hpa = 6.1121 * (17.502 * temperature / (temperature + 240.97)).exp();
    let vapour_hpa = humidity / 100.0 * saturation_hpa;
    216.7 * vapour_hpa / (273.15 + temperature)
}

fn oxygen_specific_attenuation(f: f64) -> f64 {
    if f <= 57.0 {
        oxygen_below_57(f)
    } else if f < 60.0 {
        let low = oxygen_below_57(57.0);
        low + (OXYGEN_PEAK_DB_PER_KM - low) * (f - 57.0) / 3.0
    } else if f < 63.0 {
        let high = oxygen_above_63(63.0);
        OXYGEN_PEAK_DB_PER_KM + (high - OXYGEN_PEAK_DB_PER_KM) * (f - 60.0) / 3.0
    } else {
        oxygen_above_63(f)
    }
}

fn oxygen_below_57(f: f64) -> f64 {
    (7.19e-3 + 6.09 / (f * f + 0.227) + 4.81 / ((f - 57.0).powi(2) + 1.50)) * f * f * 1e-3
}

fn oxygen_above_63(f: f64) -> f64 {
    (3.79e-7 * f + 0.265 / ((f - 63.0).powi(2) + 1.59) + 0.028 / ((f - 118.0).powi(2) + 1.47))
        * (f + 198.0).powi(2)
        * 1e-3
}

fn water_vapour_specific_attenuation(f: f64, density: f64) -> f64 {
    (0.050
        + 0.0021 * density
        + 3.6 / ((f - 22.2).powi(2) + 8.5)
        + 10.6 / ((f - 183.3).powi(2) + 9.0)
        + 8.9 / ((f - 325.4).powi(2) + 26.3))
        * f
        * f
        * density
        * 1e-4
}

#[cfg(test)]
mod tests {
    use super::*;

    fn standard(frequency: f64, range: f64, elevation: f64) -> f64 {
        attenuation_for(frequency, range, elevation, &AtmosphericConditions::default()).unwrap()
    }

    #[test]
    fn zero_range_has_zero_attenuation() {
        for frequency in [1e9, 10e9, 22.2e9, 60e9, 183e9, 300e9] {
            assert_eq!(standard(frequency, 0.0, 0.1), 0.0);
        }
        assert!(standard(10e9, 1.0, 0.0) < 1e-4);
    }

    #[test]
    fn attenuation_grows_with_range() {
        for elevation in [0.0, 0.05, 0.5, 1.2] {
            let mut previous = 0.0;
            for step in 1..=40 {
                let value = standard(35e9, step as f64 * 5_000.0, elevation);
                assert!(value >= previous);
                previous = value;
            }
        }
    }

    #[test]
    fn absorption_lines_stand_out() {
        let range = 10_000.0;
        assert!(standard(60e9, range, 0.0) > standard(45e9, range, 0.0));
        assert!(standard(60e9, range, 0.0) > standard(75e9, range, 0.0));
        assert!(standard(22.2e9, range, 0.0) > standard(15e9, range, 0.0));
        assert!(standard(183.3e9, range, 0.0) > standard(150e9, range, 0.0));
    }

    #[test]
    fn slant_paths_attenuate_less_than_horizontal() {
        assert!(standard(10e9, 100_000.0, 0.5) < standard(10e9, 100_000.0, 0.0));
    }

    #[test]
    fn dry_air_removes_water_vapour_term() {
        let dry = atmospheric_attenuation(22.2e9, 10_000.0, 0.0, 1013.25, 15.0, 0.0).unwrap();
        let humid = atmospheric_attenuation(22.2e9, 10_000.0, 0.0, 1013.25, 15.0, 90.0).unwrap();
        assert!(humid > dry);
    }

    #[test]
    fn rejects_invalid_inputs() {
        assert!(atmospheric_attenuation(0.0, 1_000.0, 0.0, 1013.0, 15.0, 50.0).is_err());
        assert!(atmospheric_attenuation(10e9, -1.0, 0.0, 1013.0, 15.0, 50.0).is_err());
        assert!(atmospheric_attenuation(10e9, 1_000.0, 0.0, 1013.0, 15.0, 150.0).is_err());
        assert!(atmospheric_attenuation(400e9, 1_000.0, 0.0, 1013.0, 15.0, 50.0).is_err());
    }
}
