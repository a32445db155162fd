//! Per-tick machine view and the setpoint types strategies produce.

use crate::error::ControlError;

/// Machine-reported phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MachineState {
    Idle,
    HydraulicActive,
    BandRunning,
    Cutting,
    CutFinished,
    BandRetracting,
    MaterialFeed,
    Unknown(u16),
}

impl MachineState {
    pub const fn from_code(code: u16) -> Self {
        match code {
            0 => Self::Idle,
            1 => Self::HydraulicActive,
            2 => Self::BandRunning,
            3 => Self::Cutting,
            4 => Self::CutFinished,
            5 => Self::BandRetracting,
            6 => Self::MaterialFeed,
            other => Self::Unknown(other),
        }
    }

    pub const fn code(self) -> u16 {
        match self {
            Self::Idle => 0,
            Self::HydraulicActive => 1,
            Self::BandRunning => 2,
            Self::Cutting => 3,
            Self::CutFinished => 4,
            Self::BandRetracting => 5,
            Self::MaterialFeed => 6,
            Self::Unknown(c) => c,
        }
    }
}

/// One decoded poll of the machine. Absent channels read as their safe
/// default through the accessor methods; strategies never mutate it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MachineSnapshot {
    pub band_current: Option<f64>,
    pub band_deflection: Option<f64>,
    pub head_height: Option<f64>,
    pub state_code: Option<u16>,
    pub cutting_speed: Option<f64>,
    pub descent_speed: Option<f64>,
    pub torque_pct: Option<f64>,
    pub band_tension: Option<f64>,
    pub hydraulic_pressure: Option<f64>,
    pub coolant_flow: Option<f64>,
    pub oil_temperature: Option<f64>,
    pub motor_temperature: Option<f64>,
    pub ambient_temperature: Option<f64>,
    pub ambient_humidity: Option<f64>,
    pub vibration_x: Option<f64>,
    pub vibration_y: Option<f64>,
    pub vibration_z: Option<f64>,
    pub vibration_freq_x: Option<f64>,
    pub vibration_freq_y: Option<f64>,
    pub vibration_freq_z: Option<f64>,
    pub alarm_status: Option<u16>,
    pub alarm_code: Option<u16>,
    pub band_motor_rpm: Option<u16>,
    pub cut_count: Option<u16>,
}

#[inline]
fn finite_or(v: Option<f64>, default: f64) -> f64 {
    v.filter(|x| x.is_finite()).unwrap_or(default)
}

impl MachineSnapshot {
    pub fn current(&self) -> f64 {
        finite_or(self.band_current, 0.0)
    }
    pub fn deflection(&self) -> f64 {
        finite_or(self.band_deflection, 0.0)
    }
    pub fn height(&self) -> f64 {
        finite_or(self.head_height, 0.0)
    }
    pub fn state(&self) -> MachineState {
        MachineState::from_code(self.state_code.unwrap_or(0))
    }
    pub fn state_code(&self) -> u16 {
        self.state_code.unwrap_or(0)
    }
    pub fn cutting_speed(&self) -> f64 {
        finite_or(self.cutting_speed, 0.0)
    }
    pub fn descent_speed(&self) -> f64 {
        finite_or(self.descent_speed, 0.0)
    }
    pub fn torque(&self) -> f64 {
        finite_or(self.torque_pct, 0.0)
    }
    /// Highest of the three vibration-frequency axes.
    pub fn max_vibration_freq(&self) -> f64 {
        [
            self.vibration_freq_x,
            self.vibration_freq_y,
            self.vibration_freq_z,
        ]
        .into_iter()
        .map(|v| finite_or(v, 0.0))
        .fold(0.0, f64::max)
    }

    /// Speeds the machine is currently running at.
    pub fn setpoints(&self) -> Setpoints {
        Setpoints {
            cutting_speed: self.cutting_speed(),
            descent_speed: self.descent_speed(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Setpoints {
    /// Band linear speed, m/min
    pub cutting_speed: f64,
    /// Head lowering rate, mm/min
    pub descent_speed: f64,
}

/// Per-axis `[min, max]` bounds every written setpoint must satisfy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedLimits {
    pub cutting_min: f64,
    pub cutting_max: f64,
    pub descent_min: f64,
    pub descent_max: f64,
}

impl Default for SpeedLimits {
    fn default() -> Self {
        Self {
            cutting_min: 65.0,
            cutting_max: 110.0,
            descent_min: 20.0,
            descent_max: 60.0,
        }
    }
}

impl SpeedLimits {
    pub fn new(
        cutting_min: f64,
        cutting_max: f64,
        descent_min: f64,
        descent_max: f64,
    ) -> Result<Self, ControlError> {
        let all = [cutting_min, cutting_max, descent_min, descent_max];
        if all.iter().any(|v| !v.is_finite()) {
            return Err(ControlError::ConfigurationFault(
                "speed limits must be finite".into(),
            ));
        }
        if cutting_min > cutting_max || descent_min > descent_max {
            return Err(ControlError::ConfigurationFault(
                "speed limits require min <= max".into(),
            ));
        }
        Ok(Self {
            cutting_min,
            cutting_max,
            descent_min,
            descent_max,
        })
    }

    /// Clamp into `[min, max]`; NaN maps to `min`.
    #[inline]
    pub fn clamp_cutting(&self, v: f64) -> f64 {
        if v.is_nan() {
            return self.cutting_min;
        }
        v.clamp(self.cutting_min, self.cutting_max)
    }

    /// Clamp into `[min, max]`; NaN maps to `min`.
    #[inline]
    pub fn clamp_descent(&self, v: f64) -> f64 {
        if v.is_nan() {
            return self.descent_min;
        }
        v.clamp(self.descent_min, self.descent_max)
    }

    pub fn clamp(&self, s: Setpoints) -> Setpoints {
        Setpoints {
            cutting_speed: self.clamp_cutting(s.cutting_speed),
            descent_speed: self.clamp_descent(s.descent_speed),
        }
    }

    pub fn contains(&self, s: Setpoints) -> bool {
        (self.cutting_min..=self.cutting_max).contains(&s.cutting_speed)
            && (self.descent_min..=self.descent_max).contains(&s.descent_speed)
    }
}
