mod cli;
mod error_fmt;
mod report;
mod sim;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bandsaw_config::{Config, LinkMode, Logging};
use bandsaw_core::config::LinkCfg;
use bandsaw_core::{ControlError, HardwareLink, PollLoop, dispatcher_from_config, runner};
use bandsaw_hardware::ModbusTcpBus;
use bandsaw_traits::{MonotonicClock, RegisterBus};
use clap::Parser;
use eyre::{Result, WrapErr};
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};

type Bus = Box<dyn RegisterBus + Send>;

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    let _ = color_eyre::install();

    if let Err(e) = real_main(&cli) {
        tracing::error!(error = %format!("{e:#}"), "command failed");
        if JSON_MODE.get().copied().unwrap_or(false) {
            println!("{}", format_error_json(&e));
        } else {
            eprintln!("{}", humanize(&e));
        }
        std::process::exit(exit_code_for_error(&e));
    }
}

fn load_config(path: &Path) -> Result<Config> {
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("read config {}", path.display()))?;
    let cfg: Config = toml::from_str(&text).wrap_err("parse config")?;
    cfg.validate()
        .map_err(|e| ControlError::ConfigurationFault(e.to_string()))?;
    Ok(cfg)
}

fn init_tracing(cli: &Cli, logging: &Logging) {
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    // stdout is reserved for results
    let console = if cli.json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let file = logging.file.as_deref().map(|file| {
        let path = Path::new(file);
        let dir = path
            .parent()
            .filter(|d| !d.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let name = path
            .file_name()
            .map_or_else(|| "bandsaw.log".into(), |n| n.to_string_lossy().into_owned());
        let appender = match logging.rotation.as_deref() {
            Some("daily") => tracing_appender::rolling::daily(dir, name),
            Some("hourly") => tracing_appender::rolling::hourly(dir, name),
            _ => tracing_appender::rolling::never(dir, name),
        };
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        fmt::layer()
            .json()
            .with_writer(writer)
            .with_filter(EnvFilter::new(logging.level.as_deref().unwrap_or("info")))
    });

    let _ = tracing_subscriber::registry()
        .with(console.with_filter(console_filter))
        .with(file)
        .try_init();
}

fn open_link(cfg: &Config) -> HardwareLink<Bus> {
    let bus: Bus = match cfg.link.mode {
        LinkMode::Tcp => Box::new(ModbusTcpBus::new(
            &cfg.link.host,
            cfg.link.port,
            cfg.link.unit_id,
            Duration::from_millis(cfg.link.timeout_ms),
        )),
        LinkMode::Sim => Box::new(sim::machine(cfg)),
    };
    HardwareLink::new(bus, LinkCfg::from(cfg), Arc::new(MonotonicClock::new()))
}

fn unreachable_fault(cfg: &Config) -> ControlError {
    match cfg.link.mode {
        LinkMode::Tcp => ControlError::TransportFault(format!(
            "no register block from {}:{} (unit {})",
            cfg.link.host, cfg.link.port, cfg.link.unit_id
        )),
        LinkMode::Sim => ControlError::TransportFault("simulated machine unavailable".into()),
    }
}

fn real_main(cli: &Cli) -> Result<()> {
    let cfg = load_config(&cli.config)?;
    init_tracing(cli, &cfg.logging);
    tracing::debug!(config = %cli.config.display(), mode = ?cfg.link.mode, "config loaded");

    match &cli.cmd {
        Commands::Run {
            strategy,
            ticks,
            stats,
        } => run(cli, &cfg, strategy.as_deref(), *ticks, *stats),
        Commands::SelfCheck => {
            let link = open_link(&cfg);
            let snap = link.read_all().ok_or_else(|| unreachable_fault(&cfg))?;
            if cli.json {
                println!(
                    "{}",
                    serde_json::json!({ "ok": true, "state_code": snap.state_code(), "head_height": snap.head_height })
                );
            } else {
                println!("OK: link up, {}", report::snapshot_text(&snap));
            }
            Ok(())
        }
        Commands::Snapshot => {
            let link = open_link(&cfg);
            let snap = link.read_all().ok_or_else(|| unreachable_fault(&cfg))?;
            if cli.json {
                println!("{}", report::snapshot_json(&snap));
            } else {
                println!("{}", report::snapshot_text(&snap));
            }
            Ok(())
        }
        Commands::EmergencyStop => {
            let link = open_link(&cfg);
            if !link.connect() {
                return Err(unreachable_fault(&cfg).into());
            }
            if !runner::emergency_stop(&link) {
                return Err(ControlError::TransportFault(
                    "emergency stop setpoint write failed".into(),
                )
                .into());
            }
            if cli.json {
                println!("{}", serde_json::json!({ "ok": true, "cutting_speed": 0, "descent_speed": 0 }));
            } else {
                println!("Emergency stop: setpoints zeroed.");
            }
            Ok(())
        }
    }
}

fn run(
    cli: &Cli,
    cfg: &Config,
    strategy: Option<&str>,
    ticks: Option<u64>,
    stats: bool,
) -> Result<()> {
    let mut dispatcher = dispatcher_from_config(cfg)?;
    if let Some(name) = strategy {
        dispatcher.select(name).wrap_err("select strategy")?;
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let flag = Arc::clone(&shutdown);
        ctrlc::set_handler(move || {
            flag.store(true, Ordering::Relaxed);
        })
        .wrap_err("install Ctrl-C handler")?;
    }

    let link = Arc::new(open_link(cfg));
    let mut poll = PollLoop::new(
        link,
        dispatcher,
        Arc::new(MonotonicClock::new()),
        cfg.control.poll_hz,
    );
    let summary = poll.run(&shutdown, ticks);
    let report = poll.report();
    let interrupted = shutdown.load(Ordering::Relaxed);
    if interrupted {
        tracing::info!("shutdown requested; setpoints left as last written");
    }

    if stats {
        report::print_stats(&report);
    }
    if cli.json {
        println!("{}", report::run_json(&summary, &report, interrupted));
    } else {
        println!("{}", report::run_text(&summary, &report));
    }

    if summary.ticks > 0 && summary.missed_reads == summary.ticks {
        return Err(unreachable_fault(cfg).into());
    }
    Ok(())
}
