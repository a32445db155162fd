//! Human-readable error descriptions and structured JSON error formatting.

use bandsaw_core::error::{BuildError, ControlError};

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(ce) = err.downcast_ref::<ControlError>() {
        return match ce {
            ControlError::TransportFault(msg) => format!(
                "What happened: The saw controller could not be reached ({msg}).\nLikely causes: Wrong [link] host/port/unit_id, controller powered off, or network cable unplugged.\nHow to fix: Check the controller is on and reachable (ping the host), fix [link] in the config, or set link.mode = \"sim\" to run without a machine."
            ),
            ControlError::DecodingFault(msg) => format!(
                "What happened: The controller answered with an unexpected register block ({msg}).\nLikely causes: Wrong registers.read_base or a controller firmware with a different register map.\nHow to fix: Verify [registers] against the controller documentation."
            ),
            ControlError::ConfigurationFault(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Misspelled strategy name or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun. See etc/bandsaw.toml for a sample."
            ),
            ControlError::StrategyFault { strategy, source } => format!(
                "What happened: The {strategy} strategy failed ({source}).\nLikely causes: Missing model artifact or speed table, or a non-finite sensor reading.\nHow to fix: Check the [{strategy}] section and its files, or pick another strategy with --strategy."
            ),
        };
    }

    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::DuplicateStrategy(name) => format!(
                "What happened: The {name} strategy was registered twice.\nLikely causes: Internal wiring error.\nHow to fix: Report this with the full log (--log-level=debug)."
            ),
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun. See etc/bandsaw.toml for a sample."
            ),
        };
    }

    if err.downcast_ref::<toml::de::Error>().is_some() {
        return format!(
            "What happened: The config file is not valid TOML for this program ({err}).\nLikely causes: Typo in a key or section name, or a value of the wrong type.\nHow to fix: Compare against etc/bandsaw.toml."
        );
    }

    // String-based heuristics for errors coming from config loaders
    let msg = err.to_string();
    let lower = format!("{err:#}").to_ascii_lowercase();

    if lower.contains("speed table csv must have headers") {
        return "Invalid headers in speed table CSV. Expected 'height_mm,cutting_speed,descent_speed'.".to_string();
    }

    if lower.contains("read config") {
        return format!(
            "What happened: Could not read the config file ({err:#}).\nLikely causes: Wrong --config path or missing permissions.\nHow to fix: Pass --config <FILE> pointing at a readable TOML file."
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes per fault kind; anything untyped returns 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if let Some(ce) = err.downcast_ref::<ControlError>() {
        return match ce {
            ControlError::TransportFault(_) => 3,
            ControlError::DecodingFault(_) => 4,
            ControlError::ConfigurationFault(_) => 5,
            ControlError::StrategyFault { .. } => 6,
        };
    }
    if err.downcast_ref::<BuildError>().is_some() || err.downcast_ref::<toml::de::Error>().is_some()
    {
        return 5;
    }
    1
}

pub fn fault_name(err: &eyre::Report) -> &'static str {
    match err.downcast_ref::<ControlError>() {
        Some(ControlError::TransportFault(_)) => "TransportFault",
        Some(ControlError::DecodingFault(_)) => "DecodingFault",
        Some(ControlError::ConfigurationFault(_)) => "ConfigurationFault",
        Some(ControlError::StrategyFault { .. }) => "StrategyFault",
        None if exit_code_for_error(err) == 5 => "ConfigurationFault",
        None => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;
    json!({
        "reason": fault_name(err),
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
    })
    .to_string()
}
