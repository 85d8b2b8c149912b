//! heirloom server: a standalone node for the inheritance engine
//!
//! Keeps plans, balances and the message inbox in one SQLite file and runs
//! a step every few seconds: queued messages are applied in order, then
//! every plan is swept.
//!
//! # Usage
//!
//! ```bash
//! heirloom-server --config /path/to/heirloom-server.toml
//! heirloom-server --step       # Run one step and exit
//! heirloom-server --validate   # Validate config and exit
//! heirloom-server --submit msg.json --signer heir1owner
//! heirloom-server --show-plan 1
//! ```

mod config;
mod daemon;

use anyhow::{Context, Result};
use heirloom_core::{Address, PlanId};
use std::path::PathBuf;

fn main() -> Result<()> {
    // Parse CLI args (minimal, no clap)
    let args: Vec<String> = std::env::args().collect();

    let mut config_path = PathBuf::from("/config/heirloom-server.toml");
    let mut one_shot = false;
    let mut validate_only = false;
    let mut submit_path: Option<PathBuf> = None;
    let mut signer: Option<Address> = None;
    let mut show_plan: Option<PlanId> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                i += 1;
                if i < args.len() {
                    config_path = PathBuf::from(&args[i]);
                } else {
                    anyhow::bail!("--config requires a path argument");
                }
            }
            "--step" | "--once" => {
                one_shot = true;
            }
            "--validate" => {
                validate_only = true;
            }
            "--submit" => {
                i += 1;
                if i < args.len() {
                    submit_path = Some(PathBuf::from(&args[i]));
                } else {
                    anyhow::bail!("--submit requires a file argument");
                }
            }
            "--signer" => {
                i += 1;
                if i < args.len() {
                    signer = Some(Address::new(args[i].as_str()));
                } else {
                    anyhow::bail!("--signer requires an address argument");
                }
            }
            "--show-plan" => {
                i += 1;
                if i < args.len() {
                    let id = args[i]
                        .parse::<PlanId>()
                        .with_context(|| format!("Invalid plan id: {}", args[i]))?;
                    show_plan = Some(id);
                } else {
                    anyhow::bail!("--show-plan requires a plan id");
                }
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            "--version" | "-V" => {
                println!("heirloom-server {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            other => {
                anyhow::bail!("Unknown argument: {}", other);
            }
        }
        i += 1;
    }

    // Load config
    let mut server_config = config::ServerConfig::from_file(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    // Apply env overrides
    server_config.apply_env_overrides();

    // Validate
    server_config
        .validate()
        .context("Configuration validation failed")?;

    // Init logger
    std::env::set_var("RUST_LOG", &server_config.server.log_level);
    env_logger::init();

    if validate_only {
        let protocol = &server_config.protocol;
        println!("Configuration is valid.");
        println!("  Data dir:        {}", server_config.server.data_dir.display());
        println!("  Step interval:   {} secs", server_config.server.step_interval_secs);
        println!("  Fallback:        {}", protocol.fallback_recipient);
        println!("  Min grace:       {} secs", protocol.min_grace_period);
        println!("  Max heirs:       {}", protocol.max_beneficiaries);
        println!("  Dormancy:        {} secs", protocol.dormancy_period);
        println!("  Native denom:    {}", protocol.native_denom);
        return Ok(());
    }

    if let Some(path) = submit_path {
        let signer = signer.context("--submit requires --signer")?;
        let body = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read message file: {}", path.display()))?;
        std::fs::create_dir_all(&server_config.server.data_dir).with_context(|| {
            format!(
                "Failed to create data dir: {}",
                server_config.server.data_dir.display()
            )
        })?;
        let id = daemon::submit(&server_config.db_path(), &signer, &body)?;
        println!("{}", id);
        return Ok(());
    }

    if let Some(plan_id) = show_plan {
        let node = daemon::open_node(&server_config)?;
        match daemon::plan_report(&node, plan_id)? {
            Some(report) => println!("{}", serde_json::to_string_pretty(&report)?),
            None => anyhow::bail!("Plan {} not found", plan_id),
        }
        return Ok(());
    }

    if one_shot {
        let mut node = daemon::open_node(&server_config)?;
        let summary = daemon::run_step(&mut node, daemon::wall_clock())?;
        log::info!(
            "Step {} at {}: {} applied, {} rejected, {} events, {} sweep errors",
            summary.at.height,
            summary.at.time,
            summary.applied,
            summary.rejected,
            summary.events,
            summary.sweep_errors
        );
        return Ok(());
    }

    // Build tokio runtime
    let rt = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;

    // Ctrl-C stops the loop between steps
    let shutdown = rt.block_on(async {
        tokio::select! {
            result = daemon::run(server_config) => result,
            _ = tokio::signal::ctrl_c() => {
                log::info!("Received shutdown signal. Exiting…");
                Ok(())
            }
        }
    });

    if let Err(e) = shutdown {
        log::error!("Server error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

fn print_help() {
    println!(
        r#"heirloom server: standalone dead-man-switch inheritance node

USAGE:
    heirloom-server [OPTIONS]

OPTIONS:
    -c, --config <PATH>   Config file path (default: /config/heirloom-server.toml)
    --step, --once        Run a single step and exit
    --validate            Validate config file and exit
    --submit <FILE>       Queue the JSON message in FILE for the next step
    --signer <ADDR>       Signer of the submitted message
    --show-plan <ID>      Print a plan with its claims, transfers and events
    -h, --help            Show this help message
    -V, --version         Show version

ENVIRONMENT VARIABLES (override config file):
    HEIRLOOM_DATA_DIR            Data directory path
    HEIRLOOM_STEP_INTERVAL       Seconds between steps
    HEIRLOOM_LOG_LEVEL           Log level (error/warn/info/debug/trace)
    HEIRLOOM_FALLBACK_RECIPIENT  Address receiving unclaimed assets
    HEIRLOOM_ADDRESS_PREFIX      Expected address prefix
    HEIRLOOM_NATIVE_DENOM        Native denomination

EXAMPLES:
    # Run as daemon with config file
    heirloom-server --config /path/to/config.toml

    # Single step (useful for cron jobs)
    heirloom-server --config config.toml --step

    # Queue a check-in that cancels a pending trigger
    echo '{{"type":"cancel_trigger","plan_id":1}}' > checkin.json
    heirloom-server --config config.toml --submit checkin.json --signer heir1owner
"#
    );
}
