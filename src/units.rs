//! Physical constants and the unit scaling uploaded to the device.
//!
//! The simulation itself runs in scaled units where the gravitational
//! constant is folded into the mass scale (G = 1 by default); the constants
//! here exist so scenarios can be described in physical terms and so the
//! device-side SimulationValues record carries the scaling it was built with.

/// Astronomical unit in meters.
pub const ASTRONOMICAL_UNIT: f64 = 1.496e11;

/// Solar mass in kilograms.
pub const SOLAR_MASS: f64 = 1.989e30;

/// Mean stellar density in kg/m^3.
pub const STELLAR_DENSITY: f64 = 1.408e3;

/// Gravitational constant in m^3 kg^-1 s^-2.
pub const GRAVITATIONAL_CONSTANT: f64 = 6.67430e-11;

/// The unit scaling a simulation runs under.
///
/// `gravitational_constant` is the value the force kernel multiplies into
/// every interaction; the length/mass/time scales describe what one
/// simulation unit means physically.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct UnitSet {
    pub gravitational_constant: f32,
    pub unit_length: f32,
    pub unit_mass: f32,
    pub unit_time: f32,
}

impl UnitSet {
    /// Dimensionless units: G = 1, unit scales of 1.
    pub fn natural() -> Self {
        Self {
            gravitational_constant: 1.0,
            unit_length: 1.0,
            unit_mass: 1.0,
            unit_time: 1.0,
        }
    }

    /// Astronomical scale: lengths in AU, masses in solar masses, time in
    /// years. G follows from the scales.
    pub fn astronomical() -> Self {
        let year = 3.156e7_f64;
        let g = GRAVITATIONAL_CONSTANT * SOLAR_MASS * year * year
            / (ASTRONOMICAL_UNIT * ASTRONOMICAL_UNIT * ASTRONOMICAL_UNIT);
        Self {
            gravitational_constant: g as f32,
            unit_length: ASTRONOMICAL_UNIT as f32,
            unit_mass: SOLAR_MASS as f32,
            unit_time: year as f32,
        }
    }
}

impl Default for UnitSet {
    fn default() -> Self {
        Self::natural()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn astronomical_g_is_about_four_pi_squared() {
        // In AU / solar mass / year units, G = 4 pi^2 for a 1 AU orbit.
        let units = UnitSet::astronomical();
        let four_pi_sq = 4.0 * std::f32::consts::PI * std::f32::consts::PI;
        assert_relative_eq!(
            units.gravitational_constant,
            four_pi_sq,
            max_relative = 0.01
        );
    }
}
