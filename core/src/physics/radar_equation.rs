//! Monostatic radar equation, receiver noise and Doppler.
//!
//! All gains and losses are carried in dB on [`RadarParameters`] and converted to
//! linear scale exactly once, at the point where they enter a product.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::f64::consts::PI;

use super::constants::{
    db_to_linear, BOLTZMANN_CONSTANT, SPEED_OF_LIGHT, STANDARD_TEMPERATURE,
};
use crate::prelude::{require_positive, RadarError, RadarResult};

/// Immutable description of a pulse radar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadarParameters {
    /// Carrier frequency (Hz).
    pub frequency: f64,
    /// Peak transmit power (W).
    pub peak_power: f64,
    pub antenna_gain_db: f64,
    pub noise_figure_db: f64,
    /// Receiver bandwidth (Hz).
    pub bandwidth: f64,
    /// Pulse width (s).
    pub pulse_width: f64,
    /// Pulse repetition frequency (Hz).
    pub prf: f64,
    /// System losses (dB).
    pub losses_db: f64,
}

impl Default for RadarParameters {
    /// X-band reference radar: 100 kW, 35 dB gain, 1 MHz bandwidth.
    fn default() -> Self {
        Self {
            frequency: 10e9,
            peak_power: 100e3,
            antenna_gain_db: 35.0,
            noise_figure_db: 3.0,
            bandwidth: 1e6,
            pulse_width: 13e-6,
            prf: 1_000.0,
            losses_db: 3.0,
        }
    }
}

impl RadarParameters {
    /// Builds parameters from a structured configuration value.
    ///
    /// Unknown fields are ignored. The antenna gain may be given either in dB
    /// (`antenna_gain_db`) or linear (`antenna_gain`); `losses_db` defaults to 0.
    pub fn from_value(value: &Value) -> RadarResult<Self> {
        let object = value.as_object().ok_or_else(|| {
            RadarError::InvalidParameter("radar parameters must be a mapping".into())
        })?;

        let field = |name: &str| -> RadarResult<Option<f64>> {
            match object.get(name) {
                None | Some(Value::Null) => Ok(None),
                Some(raw) => raw.as_f64().map(Some).ok_or_else(|| {
                    RadarError::InvalidParameter(format!("{} must be numeric", name))
                }),
            }
        };
        let required = |name: &str| -> RadarResult<f64> {
            field(name)?.ok_or_else(|| RadarError::MissingParameter(name.to_string()))
        };

        let antenna_gain_db = match (field("antenna_gain_db")?, field("antenna_gain")?) {
            (Some(db), _) => db,
            (None, Some(linear)) => {
                require_positive("antenna_gain", linear)?;
                10.0 * linear.log10()
            }
            (None, None) => return Err(RadarError::MissingParameter("antenna_gain_db".into())),
        };

        let params = Self {
            frequency: required("frequency")?,
            peak_power: required("peak_power")?,
            antenna_gain_db,
            noise_figure_db: required("noise_figure_db")?,
            bandwidth: required("bandwidth")?,
            pulse_width: required("pulse_width")?,
            prf: required("prf")?,
            losses_db: field("losses_db")?.unwrap_or(0.0),
        };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> RadarResult<()> {
        require_positive("frequency", self.frequency)?;
        require_positive("peak_power", self.peak_power)?;
        require_positive("bandwidth", self.bandwidth)?;
        require_positive("pulse_width", self.pulse_width)?;
        require_positive("prf", self.prf)?;
        if !self.antenna_gain_db.is_finite()
            || !self.noise_figure_db.is_finite()
            || !self.losses_db.is_finite()
        {
            return Err(RadarError::InvalidParameter(
                "gain, noise figure and losses must be finite".into(),
            ));
        }
        if self.noise_figure_db < 0.0 || self.losses_db < 0.0 {
            return Err(RadarError::InvalidParameter(
                "noise figure and losses cannot be negative".into(),
            ));
        }
        Ok(())
    }

    pub fn wavelength(&self) -> f64 {
        SPEED_OF_LIGHT / self.frequency
    }

    pub fn antenna_gain(&self) -> f64 {
        db_to_linear(self.antenna_gain_db)
    }

    /// Range extent of one pulse-compressed resolution cell (m).
    pub fn range_resolution(&self) -> f64 {
        SPEED_OF_LIGHT / (2.0 * self.bandwidth)
    }

    /// Largest range measurable without ambiguity (m).
    pub fn unambiguous_range(&self) -> f64 {
        SPEED_OF_LIGHT / (2.0 * self.prf)
    }
}

/// Received echo power (W) from a target of radar cross-section `rcs` at `range`.
///
/// `atmospheric_loss_db` is the total two-way path attenuation; it is converted to
/// linear and multiplied with the system loss.
pub fn received_power(
    radar: &RadarParameters,
    rcs: f64,
    range: f64,
    atmospheric_loss_db: f64,
) -> RadarResult<f64> {
    radar.validate()?;
    require_positive("range", range)?;
    if !rcs.is_finite() || rcs < 0.0 {
        return Err(RadarError::InvalidParameter(format!(
            "rcs must be non-negative, got {}",
            rcs
        )));
    }
    if !atmospheric_loss_db.is_finite() || atmospheric_loss_db < 0.0 {
        return Err(RadarError::InvalidParameter(format!(
            "atmospheric loss must be non-negative dB, got {}",
            atmospheric_loss_db
        )));
    }

    let gain = radar.antenna_gain();
    let lambda = radar.wavelength();
    let total_loss = db_to_linear(radar.losses_db) * db_to_linear(atmospheric_loss_db);

    let numerator = radar.peak_power * gain * gain * lambda * lambda * rcs;
    let denominator = (4.0 * PI).powi(3) * range.powi(4) * total_loss;
    Ok(numerator / denominator)
}

/// Thermal noise power `k·T·B·F` (W). `temperature` defaults to 290 K.
pub fn noise_power(noise_figure_db: f64, bandwidth: f64, temperature: Option<f64>) -> RadarResult<f64> {
    require_positive("bandwidth", bandwidth)?;
    let temperature = temperature.unwrap_or(STANDARD_TEMPERATURE);
    require_positive("temperature", temperature)?;
    if !noise_figure_db.is_finite() || noise_figure_db < 0.0 {
        return Err(RadarError::InvalidParameter(format!(
            "noise figure must be non-negative dB, got {}",
            noise_figure_db
        )));
    }
    Ok(BOLTZMANN_CONSTANT * temperature * bandwidth * db_to_linear(noise_figure_db))
}

/// Dimensionless signal-to-noise ratio.
pub fn snr(
    received_power: f64,
    noise_figure_db: f64,
    bandwidth: f64,
    temperature: Option<f64>,
) -> RadarResult<f64> {
    if !received_power.is_finite() || received_power < 0.0 {
        return Err(RadarError::InvalidParameter(format!(
            "received power must be non-negative, got {}",
            received_power
        )));
    }
    Ok(received_power / noise_power(noise_figure_db, bandwidth, temperature)?)
}

/// Range (m) at which a target of `rcs` yields exactly `min_snr_db`.
pub fn detection_range(radar: &RadarParameters, rcs: f64, min_snr_db: f64) -> RadarResult<f64> {
    radar.validate()?;
    require_positive("rcs", rcs)?;
    if !min_snr_db.is_finite() {
        return Err(RadarError::InvalidParameter("minimum SNR must be finite".into()));
    }
    let gain = radar.antenna_gain();
    let lambda = radar.wavelength();
    let noise = noise_power(radar.noise_figure_db, radar.bandwidth, None)?;

    let numerator = radar.peak_power * gain * gain * lambda * lambda * rcs;
    let denominator =
        (4.0 * PI).powi(3) * db_to_linear(radar.losses_db) * noise * db_to_linear(min_snr_db);
    Ok((numerator / denominator).powf(0.25))
}

/// Two-way Doppler shift (Hz); positive `radial_velocity` means closing.
pub fn doppler_shift(frequency: f64, radial_velocity: f64) -> RadarResult<f64> {
    require_positive("frequency", frequency)?;
    if !radial_velocity.is_finite() {
        return Err(RadarError::InvalidParameter("radial velocity must be finite".into()));
    }
    Ok(2.0 * radial_velocity * frequency / SPEED_OF_LIGHT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::constants::linear_to_db;
    use approx::assert_relative_eq;
    use serde_json::json;

    #[test]
    fn received_power_falls_with_fourth_power_of_range() {
        let radar = RadarParameters::default();
        let near = received_power(&radar, 1.0, 10_000.0, 0.0).unwrap();
        let far = received_power(&radar, 1.0, 100_000.0, 0.0).unwrap();
        assert_relative_eq!(linear_to_db(near / far), 40.0, epsilon = 1e-9);

        let mut previous = f64::INFINITY;
        for step in 1..50 {
            let power = received_power(&radar, 1.0, step as f64 * 1_000.0, 0.0).unwrap();
            assert!(power < previous);
            previous = power;
        }
    }

    #[test]
    fn received_power_grows_with_rcs() {
        let radar = RadarParameters::default();
        let small = received_power(&radar, 0.5, 20_000.0, 1.0).unwrap();
        let large = received_power(&radar, 5.0, 20_000.0, 1.0).unwrap();
        assert!(large > small);
        assert_relative_eq!(large / small, 10.0, max_relative = 1e-12);
    }

    #[test]
    fn atmospheric_loss_is_applied_linearly() {
        let radar = RadarParameters::default();
        let clear = received_power(&radar, 1.0, 20_000.0, 0.0).unwrap();
        let lossy = received_power(&radar, 1.0, 20_000.0, 10.0).unwrap();
        assert_relative_eq!(clear / lossy, 10.0, max_relative = 1e-12);
    }

    #[test]
    fn reference_radar_sees_one_square_metre_at_ten_kilometres() {
        let radar = RadarParameters::default();
        let power = received_power(&radar, 1.0, 10_000.0, 0.0).unwrap();
        let ratio = snr(power, radar.noise_figure_db, radar.bandwidth, None).unwrap();
        assert!(linear_to_db(ratio) > 30.0);
    }

    #[test]
    fn non_physical_inputs_are_rejected() {
        let radar = RadarParameters::default();
        assert!(matches!(
            received_power(&radar, 1.0, 0.0, 0.0),
            Err(RadarError::InvalidParameter(_))
        ));
        let bad = RadarParameters {
            frequency: -1.0,
            ..RadarParameters::default()
        };
        assert!(matches!(
            received_power(&bad, 1.0, 1_000.0, 0.0),
            Err(RadarError::InvalidParameter(_))
        ));
        assert!(matches!(
            snr(1e-12, 3.0, 0.0, None),
            Err(RadarError::InvalidParameter(_))
        ));
        assert!(matches!(
            doppler_shift(0.0, 10.0),
            Err(RadarError::InvalidParameter(_))
        ));
    }

    #[test]
    fn detection_range_inverts_the_radar_equation() {
        let radar = RadarParameters::default();
        let range = detection_range(&radar, 1.0, 13.0).unwrap();
        let power = received_power(&radar, 1.0, range, 0.0).unwrap();
        let ratio = snr(power, radar.noise_figure_db, radar.bandwidth, None).unwrap();
        assert_relative_eq!(linear_to_db(ratio), 13.0, epsilon = 1e-9);
    }

    #[test]
    fn doppler_shift_is_two_v_f_over_c() {
        let shift = doppler_shift(10e9, 150.0).unwrap();
        assert_relative_eq!(shift, 2.0 * 150.0 * 10e9 / SPEED_OF_LIGHT, max_relative = 1e-12);
        assert!(doppler_shift(10e9, -150.0).unwrap() < 0.0);
    }

    #[test]
    fn from_value_ignores_unknown_fields_and_reports_missing_ones() {
        let value = json!({
            "frequency": 3e9,
            "peak_power": 1e6,
            "antenna_gain": 1000.0,
            "noise_figure_db": 4.0,
            "bandwidth": 2e6,
            "pulse_width": 1e-6,
            "prf": 500.0,
            "colour": "grey"
        });
        let params = RadarParameters::from_value(&value).unwrap();
        assert_relative_eq!(params.antenna_gain_db, 30.0, epsilon = 1e-12);
        assert_eq!(params.losses_db, 0.0);

        let missing = json!({ "frequency": 3e9, "peak_power": 1e6, "antenna_gain_db": 30.0 });
        assert_eq!(
            RadarParameters::from_value(&missing),
            Err(RadarError::MissingParameter("noise_figure_db".into()))
        );

        let negative = json!({
            "frequency": 3e9, "peak_power": 1e6, "antenna_gain_db": 30.0,
            "noise_figure_db": 4.0, "bandwidth": -2e6, "pulse_width": 1e-6, "prf": 500.0
        });
        assert!(matches!(
            RadarParameters::from_value(&negative),
            Err(RadarError::InvalidParameter(_))
        ));
    }
}
