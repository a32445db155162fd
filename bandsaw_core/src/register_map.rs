//! Fixed register contract with the saw controller.
//!
//! Reads: one contiguous block of `BLOCK_LEN` holding registers decoded by a
//! fixed offset table. Writes: one named register per speed axis.
//!
//! Scale factors are per field. Signed fields are 16-bit two's complement.
//! Descent speed is written as hundredths of mm/min in two's complement so
//! the controller sees negative feed exactly as it reports it.

use crate::error::ControlError;
use crate::snapshot::MachineSnapshot;

pub const BLOCK_LEN: usize = 42;

pub mod offset {
    pub const BAND_CURRENT: usize = 0;
    pub const BAND_DEFLECTION: usize = 1;
    pub const HEAD_HEIGHT: usize = 2;
    pub const STATE_CODE: usize = 3;
    pub const CUTTING_SPEED: usize = 4;
    pub const DESCENT_SPEED: usize = 5;
    pub const TORQUE: usize = 6;
    pub const BAND_TENSION: usize = 7;
    pub const HYDRAULIC_PRESSURE: usize = 8;
    pub const COOLANT_FLOW: usize = 9;
    pub const OIL_TEMPERATURE: usize = 10;
    pub const MOTOR_TEMPERATURE: usize = 11;
    pub const AMBIENT_TEMPERATURE: usize = 12;
    pub const AMBIENT_HUMIDITY: usize = 13;
    pub const VIBRATION_X: usize = 14;
    pub const VIBRATION_Y: usize = 15;
    pub const VIBRATION_Z: usize = 16;
    pub const VIBRATION_FREQ_X: usize = 17;
    pub const VIBRATION_FREQ_Y: usize = 18;
    pub const VIBRATION_FREQ_Z: usize = 19;
    pub const ALARM_STATUS: usize = 20;
    pub const ALARM_CODE: usize = 21;
    pub const BAND_MOTOR_RPM: usize = 22;
    pub const CUT_COUNT: usize = 23;
}

#[inline]
fn unsigned(w: u16, div: f64) -> f64 {
    f64::from(w) / div
}

#[inline]
fn signed(w: u16, div: f64) -> f64 {
    f64::from(w as i16) / div
}

/// Decode a raw register block into a snapshot.
pub fn decode(words: &[u16]) -> Result<MachineSnapshot, ControlError> {
    if words.len() < BLOCK_LEN {
        return Err(ControlError::DecodingFault(format!(
            "register block too short: {} < {BLOCK_LEN}",
            words.len()
        )));
    }
    use offset::*;
    let w = |i: usize| words[i];
    Ok(MachineSnapshot {
        band_current: Some(unsigned(w(BAND_CURRENT), 10.0)),
        band_deflection: Some(signed(w(BAND_DEFLECTION), 100.0)),
        head_height: Some(unsigned(w(HEAD_HEIGHT), 10.0)),
        state_code: Some(w(STATE_CODE)),
        cutting_speed: Some(unsigned(w(CUTTING_SPEED), 1.0)),
        descent_speed: Some(decode_descent_speed(w(DESCENT_SPEED))),
        torque_pct: Some(unsigned(w(TORQUE), 10.0)),
        band_tension: Some(unsigned(w(BAND_TENSION), 10.0)),
        hydraulic_pressure: Some(unsigned(w(HYDRAULIC_PRESSURE), 10.0)),
        coolant_flow: Some(unsigned(w(COOLANT_FLOW), 10.0)),
        oil_temperature: Some(signed(w(OIL_TEMPERATURE), 10.0)),
        motor_temperature: Some(signed(w(MOTOR_TEMPERATURE), 10.0)),
        ambient_temperature: Some(signed(w(AMBIENT_TEMPERATURE), 10.0)),
        ambient_humidity: Some(unsigned(w(AMBIENT_HUMIDITY), 10.0)),
        vibration_x: Some(unsigned(w(VIBRATION_X), 1000.0)),
        vibration_y: Some(unsigned(w(VIBRATION_Y), 1000.0)),
        vibration_z: Some(unsigned(w(VIBRATION_Z), 1000.0)),
        vibration_freq_x: Some(unsigned(w(VIBRATION_FREQ_X), 10.0)),
        vibration_freq_y: Some(unsigned(w(VIBRATION_FREQ_Y), 10.0)),
        vibration_freq_z: Some(unsigned(w(VIBRATION_FREQ_Z), 10.0)),
        alarm_status: Some(w(ALARM_STATUS)),
        alarm_code: Some(w(ALARM_CODE)),
        band_motor_rpm: Some(w(BAND_MOTOR_RPM)),
        cut_count: Some(w(CUT_COUNT)),
    })
}

#[inline]
pub fn decode_descent_speed(raw: u16) -> f64 {
    signed(raw, 100.0)
}

/// Cutting speed register value: whole m/min, saturating into `u16`.
pub fn encode_cutting_speed(v: f64) -> u16 {
    encode_unsigned(v, 1.0)
}

/// Descent speed register value: hundredths of mm/min as two's complement.
pub fn encode_descent_speed(v: f64) -> u16 {
    encode_signed(v, 100.0)
}

/// Like `encode_cutting_speed`, but the rounded value never leaves
/// `[lo, hi]`: the bounds round inward to whole m/min. `None` when no whole
/// value fits.
pub fn encode_cutting_speed_within(v: f64, lo: f64, hi: f64) -> Option<u16> {
    round_within(v, 1.0, lo, hi).map(|s| encode_unsigned(s, 1.0))
}

/// Like `encode_descent_speed`, with the bounds rounded inward to 0.01 mm/min.
pub fn encode_descent_speed_within(v: f64, lo: f64, hi: f64) -> Option<u16> {
    round_within(v, 100.0, lo, hi).map(|s| encode_signed(s / 100.0, 100.0))
}

/// Scaled, rounded value clamped into the register steps inside `[lo, hi]`.
fn round_within(v: f64, mul: f64, lo: f64, hi: f64) -> Option<f64> {
    let lo = (lo * mul).ceil();
    let hi = (hi * mul).floor();
    if !v.is_finite() || lo.is_nan() || hi.is_nan() || lo > hi {
        return None;
    }
    Some((v * mul).round().clamp(lo, hi))
}

fn encode_unsigned(v: f64, mul: f64) -> u16 {
    if !v.is_finite() {
        return 0;
    }
    let scaled = (v * mul).round();
    if scaled <= 0.0 {
        0
    } else if scaled >= f64::from(u16::MAX) {
        u16::MAX
    } else {
        scaled as u16
    }
}

fn encode_signed(v: f64, mul: f64) -> u16 {
    if !v.is_finite() {
        return 0;
    }
    let scaled = (v * mul).round();
    let clamped = scaled.clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16;
    clamped as u16
}

/// Inverse of `decode` for fields present in `snap`; absent fields encode as 0.
/// Used by the simulated machine and tests.
pub fn encode_block(snap: &MachineSnapshot) -> [u16; BLOCK_LEN] {
    use offset::*;
    let mut words = [0u16; BLOCK_LEN];
    let u = |v: Option<f64>, mul: f64| encode_unsigned(v.unwrap_or(0.0), mul);
    let s = |v: Option<f64>, mul: f64| encode_signed(v.unwrap_or(0.0), mul);
    words[BAND_CURRENT] = u(snap.band_current, 10.0);
    words[BAND_DEFLECTION] = s(snap.band_deflection, 100.0);
    words[HEAD_HEIGHT] = u(snap.head_height, 10.0);
    words[STATE_CODE] = snap.state_code.unwrap_or(0);
    words[CUTTING_SPEED] = u(snap.cutting_speed, 1.0);
    words[DESCENT_SPEED] = s(snap.descent_speed, 100.0);
    words[TORQUE] = u(snap.torque_pct, 10.0);
    words[BAND_TENSION] = u(snap.band_tension, 10.0);
    words[HYDRAULIC_PRESSURE] = u(snap.hydraulic_pressure, 10.0);
    words[COOLANT_FLOW] = u(snap.coolant_flow, 10.0);
    words[OIL_TEMPERATURE] = s(snap.oil_temperature, 10.0);
    words[MOTOR_TEMPERATURE] = s(snap.motor_temperature, 10.0);
    words[AMBIENT_TEMPERATURE] = s(snap.ambient_temperature, 10.0);
    words[AMBIENT_HUMIDITY] = u(snap.ambient_humidity, 10.0);
    words[VIBRATION_X] = u(snap.vibration_x, 1000.0);
    words[VIBRATION_Y] = u(snap.vibration_y, 1000.0);
    words[VIBRATION_Z] = u(snap.vibration_z, 1000.0);
    words[VIBRATION_FREQ_X] = u(snap.vibration_freq_x, 10.0);
    words[VIBRATION_FREQ_Y] = u(snap.vibration_freq_y, 10.0);
    words[VIBRATION_FREQ_Z] = u(snap.vibration_freq_z, 10.0);
    words[ALARM_STATUS] = snap.alarm_status.unwrap_or(0);
    words[ALARM_CODE] = snap.alarm_code.unwrap_or(0);
    words[BAND_MOTOR_RPM] = snap.band_motor_rpm.unwrap_or(0);
    words[CUT_COUNT] = snap.cut_count.unwrap_or(0);
    words
}
