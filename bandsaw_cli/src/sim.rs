//! Crude machine model behind the simulated bus, so `run` works on a desk.
//!
//! Every block read advances the model by one poll period: the head approaches,
//! cuts down at the commanded descent speed, reports a finished cut, then
//! returns to the top. Current, torque and deflection rise with feed.

use bandsaw_core::MachineSnapshot;
use bandsaw_core::register_map::{self, decode_descent_speed};
use bandsaw_hardware::{SimState, SimulatedBus};

const TOP_MM: f64 = 120.0;
const FLOOR_MM: f64 = 5.0;
const APPROACH_READS: u32 = 2;
const FINISHED_READS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    Approach(u32),
    Cutting,
    Finished(u32),
}

#[derive(Debug)]
pub struct CutModel {
    base: u16,
    cutting_reg: u16,
    descent_reg: u16,
    dt_s: f64,
    height: f64,
    phase: Phase,
    cuts: u16,
}

impl CutModel {
    pub fn new(cfg: &bandsaw_config::Config) -> Self {
        Self {
            base: cfg.registers.read_base,
            cutting_reg: cfg.registers.cutting_speed,
            descent_reg: cfg.registers.descent_speed,
            dt_s: 1.0 / f64::from(cfg.control.poll_hz.max(1)),
            height: TOP_MM,
            phase: Phase::Approach(APPROACH_READS),
            cuts: 0,
        }
    }

    fn step(&mut self, st: &mut SimState) {
        let cutting = f64::from(st.get(self.cutting_reg));
        let descent = decode_descent_speed(st.get(self.descent_reg));
        let code = match self.phase {
            Phase::Approach(0) => {
                self.phase = Phase::Cutting;
                3
            }
            Phase::Approach(n) => {
                self.phase = Phase::Approach(n - 1);
                2
            }
            Phase::Cutting => {
                self.height -= descent.max(0.0) * self.dt_s / 60.0;
                if self.height <= FLOOR_MM {
                    self.cuts = self.cuts.wrapping_add(1);
                    self.phase = Phase::Finished(FINISHED_READS);
                    4
                } else {
                    3
                }
            }
            Phase::Finished(0) => {
                self.height = TOP_MM;
                self.phase = Phase::Approach(APPROACH_READS);
                5
            }
            Phase::Finished(n) => {
                self.phase = Phase::Finished(n - 1);
                4
            }
        };
        let feeding = code == 3;
        let current = if feeding {
            10.0 + 0.2 * descent + 0.02 * cutting
        } else {
            6.0
        };
        let snap = MachineSnapshot {
            band_current: Some(current),
            band_deflection: Some(if feeding { 0.004 * descent } else { 0.0 }),
            head_height: Some(self.height),
            state_code: Some(code),
            cutting_speed: Some(cutting),
            descent_speed: Some(descent),
            torque_pct: Some(current * 2.2),
            band_tension: Some(21.0),
            hydraulic_pressure: Some(48.0),
            coolant_flow: Some(12.0),
            oil_temperature: Some(38.0),
            motor_temperature: Some(45.0),
            ambient_temperature: Some(22.0),
            ambient_humidity: Some(40.0),
            vibration_x: Some(0.2),
            vibration_y: Some(0.2),
            vibration_z: Some(0.1),
            vibration_freq_x: Some(cutting * 1.2),
            vibration_freq_y: Some(cutting),
            vibration_freq_z: Some(cutting * 0.8),
            alarm_status: Some(0),
            alarm_code: Some(0),
            band_motor_rpm: Some(st.get(self.cutting_reg).saturating_mul(10)),
            cut_count: Some(self.cuts),
        };
        st.set_block(self.base, &register_map::encode_block(&snap));
    }
}

/// Simulated bus seeded with nominal setpoints and driven by a `CutModel`.
pub fn machine(cfg: &bandsaw_config::Config) -> SimulatedBus {
    let mut model = CutModel::new(cfg);
    let bus = SimulatedBus::new();
    {
        let sim = bus.handle();
        let mut st = sim.lock();
        st.set(cfg.registers.cutting_speed, 80);
        st.set(
            cfg.registers.descent_speed,
            register_map::encode_descent_speed(40.0),
        );
    }
    bus.with_read_hook(move |st| model.step(st))
}
