//! Relative altitude from barometric pressure.
//!
//! The first pressure reading after a reset becomes the baseline p0, and
//! every later reading yields an altitude relative to it via the standard
//! barometric formula `44330 * (1 - (p/p0)^0.1903)`. The result is steadier
//! than satellite altitude and well suited to cumulative drop, but it is
//! strictly relative, never an absolute elevation.

const DEFAULT_SMOOTH_ALPHA: f64 = 0.85;

/// Single-pole smoothed relative altimeter fed by pressure readings (hPa).
#[derive(Clone, Debug)]
pub struct BarometricAltimeter {
    smooth_alpha: f64,
    p0: Option<f64>,
    altitude_m: Option<f64>,
}

impl BarometricAltimeter {
    pub fn new() -> Self {
        Self::with_alpha(DEFAULT_SMOOTH_ALPHA)
    }

    /// Higher alpha smooths harder; 0.8 to 0.9 works well.
    pub fn with_alpha(smooth_alpha: f64) -> Self {
        Self {
            smooth_alpha,
            p0: None,
            altitude_m: None,
        }
    }

    /// Drop the baseline and the smoothed value. Call at recording start so
    /// altitudes are relative to where the session began.
    pub fn reset(&mut self) {
        self.p0 = None;
        self.altitude_m = None;
    }

    /// Feed one pressure reading in hPa. Non-positive readings are ignored.
    pub fn offer_pressure(&mut self, pressure_hpa: f64) {
        if !(pressure_hpa > 0.0) {
            return;
        }

        let base = match self.p0 {
            Some(p0) => p0,
            None => {
                self.p0 = Some(pressure_hpa);
                pressure_hpa
            }
        };

        let raw_alt = 44330.0 * (1.0 - (pressure_hpa / base).powf(0.1903));

        self.altitude_m = Some(match self.altitude_m {
            None => raw_alt,
            Some(prev) => self.smooth_alpha * prev + (1.0 - self.smooth_alpha) * raw_alt,
        });
    }

    /// Smoothed altitude in meters relative to the session baseline, or
    /// `None` before the first reading. Callers without a pressure sensor
    /// never see a value and should fall back to satellite altitude.
    pub fn relative_altitude_m(&self) -> Option<f64> {
        self.altitude_m
    }
}

impl Default for BarometricAltimeter {
    fn default() -> Self {
        Self::new()
    }
}
