//! JSON and text rendering of snapshots and run summaries.

use std::collections::BTreeMap;

use bandsaw_core::dispatcher::StrategyStats;
use bandsaw_core::{MachineSnapshot, RunSummary, Setpoints, StatsReport, StrategyKind};
use serde_json::{Value, json};

pub fn snapshot_json(s: &MachineSnapshot) -> Value {
    json!({
        "timestamp": bandsaw_core::util::unix_millis(),
        "state": format!("{:?}", s.state()),
        "band_current": s.band_current,
        "band_deflection": s.band_deflection,
        "head_height": s.head_height,
        "state_code": s.state_code,
        "cutting_speed": s.cutting_speed,
        "descent_speed": s.descent_speed,
        "torque_pct": s.torque_pct,
        "band_tension": s.band_tension,
        "hydraulic_pressure": s.hydraulic_pressure,
        "coolant_flow": s.coolant_flow,
        "oil_temperature": s.oil_temperature,
        "motor_temperature": s.motor_temperature,
        "ambient_temperature": s.ambient_temperature,
        "ambient_humidity": s.ambient_humidity,
        "vibration_x": s.vibration_x,
        "vibration_y": s.vibration_y,
        "vibration_z": s.vibration_z,
        "vibration_freq_x": s.vibration_freq_x,
        "vibration_freq_y": s.vibration_freq_y,
        "vibration_freq_z": s.vibration_freq_z,
        "alarm_status": s.alarm_status,
        "alarm_code": s.alarm_code,
        "band_motor_rpm": s.band_motor_rpm,
        "cut_count": s.cut_count,
    })
}

pub fn snapshot_text(s: &MachineSnapshot) -> String {
    format!(
        "state={:?} height={:.1}mm current={:.1}A deflection={:.2}mm cutting={:.0}m/min descent={:.2}mm/min torque={:.1}%",
        s.state(),
        s.height(),
        s.current(),
        s.deflection(),
        s.cutting_speed(),
        s.descent_speed(),
        s.torque(),
    )
}

fn setpoints_json(p: Option<Setpoints>) -> Value {
    p.map_or(Value::Null, |p| {
        json!({ "cutting_speed": p.cutting_speed, "descent_speed": p.descent_speed })
    })
}

fn avg_us(s: &StrategyStats) -> Option<u64> {
    if s.runs == 0 {
        return None;
    }
    u64::try_from(s.total_time.as_micros() / u128::from(s.runs)).ok()
}

fn strategies_json(stats: &BTreeMap<StrategyKind, StrategyStats>) -> Value {
    let map: serde_json::Map<String, Value> = stats
        .iter()
        .map(|(k, s)| {
            (
                k.name().to_string(),
                json!({ "runs": s.runs, "errors": s.errors, "avg_us": avg_us(s) }),
            )
        })
        .collect();
    Value::Object(map)
}

pub fn run_json(summary: &RunSummary, report: &StatsReport, stopped_by_signal: bool) -> Value {
    json!({
        "timestamp": bandsaw_core::util::unix_millis(),
        "ticks": summary.ticks,
        "missed_reads": summary.missed_reads,
        "adjustments": summary.adjustments,
        "faults": summary.faults,
        "active": report.active.map(StrategyKind::name),
        "link_up": report.link_up,
        "last_applied": setpoints_json(report.last_applied),
        "strategies": strategies_json(&report.strategies),
        "interrupted": stopped_by_signal,
    })
}

pub fn run_text(summary: &RunSummary, report: &StatsReport) -> String {
    let applied = report.last_applied.map_or_else(
        || "none".to_string(),
        |p| format!("{:.0} m/min, {:.2} mm/min", p.cutting_speed, p.descent_speed),
    );
    format!(
        "Run complete: {} ticks, {} adjustments, {} faults, {} missed reads. Last applied: {applied}.",
        summary.ticks, summary.adjustments, summary.faults, summary.missed_reads
    )
}

/// Per-strategy counters to stderr.
pub fn print_stats(report: &StatsReport) {
    eprintln!("\n--- Strategy Stats ---");
    if report.strategies.is_empty() {
        eprintln!("(no strategy ran)");
    }
    for (kind, s) in &report.strategies {
        let avg = avg_us(s).map_or_else(|| "-".to_string(), |v| v.to_string());
        eprintln!(
            "{:<7} runs={:<6} errors={:<4} avg_us={avg}",
            kind.name(),
            s.runs,
            s.errors
        );
    }
    eprintln!("Gate: {:?}", report.phase);
    eprintln!("----------------------\n");
}
