//! `turntable-cli` – Turntable Command Line Interface
//!
//! Runs a perception-study session from the terminal.  It:
//!
//! 1. Loads `~/.turntable/config.toml`, writing the defaults on first run.
//! 2. Opens the seen history and the model catalog.
//! 3. Builds a headless scene and the log sink (HTTP when `log_endpoint` is
//!    set, the tracing log otherwise).
//! 4. Drops the participant into an **interactive shell** with
//!    slash-commands (`/start`, `/next`, `/answer`, `/help`, …).

mod config;
mod repl;

use colored::Colorize;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Instrument, info, info_span, warn};

use turntable_memory::SeenStore;
use turntable_middleware::{EventBus, HttpLogSink, LogSink, ObservedSink, TracingSink};
use turntable_runtime::sim::SimScene;
use turntable_runtime::{Collaborators, ExperimentRunner, ModelCatalog, init_tracing};

use crate::config::Config;

/// Simulated asset load time of the headless scene.
const SIM_LOAD_LATENCY: Duration = Duration::from_millis(150);

fn main() -> ExitCode {
    // ── Structured logging ────────────────────────────────────────────────
    // RUST_LOG filters, TURNTABLE_LOG_FORMAT picks compact/pretty/json and
    // OTEL_EXPORTER_OTLP_ENDPOINT enables span export.
    let _guard = init_tracing("turntable");

    print_banner();

    let cfg = load_or_init_config();
    for warning in cfg.warnings() {
        println!("  {} {}", "⚠".yellow().bold(), warning.yellow());
        warn!(%warning, "questionable configuration");
    }

    // ── Seen history ──────────────────────────────────────────────────────
    let seen = match &cfg.seen_store_path {
        Some(path) => SeenStore::open(path),
        None => SeenStore::open_in_memory(),
    };
    let seen = match seen {
        Ok(seen) => seen,
        Err(e) => {
            println!("{}: {}", "Seen history unavailable".red(), e);
            return ExitCode::FAILURE;
        }
    };

    // ── Catalog ───────────────────────────────────────────────────────────
    let catalog = match &cfg.catalog_dir {
        Some(dir) => match ModelCatalog::from_dir(dir, cfg.foil_rule()) {
            Ok(catalog) => catalog,
            Err(e) => {
                println!("{}: {}", "Catalog error".red(), e);
                return ExitCode::FAILURE;
            }
        },
        None => demo_catalog(&cfg),
    };
    println!(
        "  Catalog: {} model(s), {} foil(s)",
        catalog.len().to_string().bold(),
        catalog.foils().len().to_string().bold()
    );

    let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            println!("{}: {}", "Failed to start the async runtime".red(), e);
            return ExitCode::FAILURE;
        }
    };

    rt.block_on(async move {
        let bus = EventBus::default();
        let scene = Arc::new(SimScene::new().with_latency(SIM_LOAD_LATENCY));
        let sink: Arc<dyn LogSink> = match &cfg.log_endpoint {
            Some(endpoint) => match HttpLogSink::new(endpoint.clone()) {
                Ok(sink) => {
                    println!("  Logging endpoint: {}", endpoint.bold());
                    Arc::new(sink)
                }
                Err(e) => {
                    println!("{}: {}", "Logging endpoint unusable".red(), e);
                    return ExitCode::FAILURE;
                }
            },
            None => {
                println!("  Logging endpoint: {}", "none (records go to the log)".dimmed());
                Arc::new(TracingSink)
            }
        };
        let collaborators = Collaborators {
            loader: scene.clone(),
            snapshots: scene,
            sink: Arc::new(ObservedSink::new(sink, bus.clone())),
            phases: Arc::new(bus.clone()),
        };

        let runner = match ExperimentRunner::new(
            cfg.runner_config(),
            Arc::new(catalog),
            seen,
            collaborators,
            bus,
        ) {
            Ok(runner) => runner,
            Err(e) => {
                println!("{}: {}", "Failed to create the session".red(), e);
                return ExitCode::FAILURE;
            }
        };
        info!(session_id = runner.session_id(), "session ready");

        println!("  Session: {}", runner.session_id().bold());
        println!();
        println!("  Type {} to begin, {} for a list of commands.\n", "/start".bold().cyan(), "/help".bold().cyan());

        let span = info_span!("session", session_id = %runner.session_id());
        repl::run(runner).instrument(span).await;
        ExitCode::SUCCESS
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

fn load_or_init_config() -> Config {
    match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => {
            let mut cfg = Config::default();
            match config::save(&cfg) {
                Ok(()) => println!(
                    "  {} Default config written to {}",
                    "✓".green().bold(),
                    config::config_path().display().to_string().bold()
                ),
                Err(e) => warn!(error = %e, "could not write the default config"),
            }
            config::apply_env_overrides(&mut cfg);
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            let mut cfg = Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    }
}

/// Catalog used when no `catalog_dir` is configured: sixteen stimulus sets
/// in two variants plus four foils.
fn demo_catalog(cfg: &Config) -> ModelCatalog {
    let marker = cfg
        .foil_markers
        .first()
        .cloned()
        .unwrap_or_else(|| "_foil".to_string());
    let mut names = Vec::new();
    for set in 1..=16 {
        names.push(format!("Set_{set}_orig_matte_0.glb"));
        names.push(format!("Set_{set}_mirror_gloss_1.glb"));
    }
    for set in 1..=4 {
        names.push(format!("Set_{set}{marker}.glb"));
    }
    ModelCatalog::new(names, cfg.foil_rule())
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"  _____              _        _    _      "#.bold().cyan());
    println!("{}", r#" |_   _|  _ _ _ _ _ | |_ __ _| |__| |___  "#.bold().cyan());
    println!("{}", r#"   | || || | '_| ' \|  _/ _` | '_ \ / -_) "#.bold().cyan());
    println!("{}", r#"   |_| \_,_|_| |_||_|\__\__,_|_.__/_\___| "#.bold().cyan());
    println!();
    println!("  {} {}",
        "Turntable".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  3-D object perception study runner");
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_catalog_splits_foils_from_regular_models() {
        let catalog = demo_catalog(&Config::default());
        assert_eq!(catalog.len(), 36);
        assert_eq!(catalog.foils().len(), 4);
        assert_eq!(catalog.regular().len(), 32);
    }

    #[test]
    fn demo_catalog_follows_configured_marker() {
        let cfg = Config {
            foil_markers: vec!["_lure".to_string()],
            ..Config::default()
        };
        let catalog = demo_catalog(&cfg);
        assert!(catalog.is_foil("Set_2_lure.glb"));
        assert_eq!(catalog.foils().len(), 4);
    }
}
