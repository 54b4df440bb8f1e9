//! Binary entrypoint for the KakuBridge CLI.
//!
//! Commands:
//! - `start` - run the bridge: provisioning, transports, control loop
//! - `init` - create a starter `config.toml`
//! - `status` - print stored account and registry state
//!
//! Restart policy: the process never restarts itself in place. Every
//! restart-class decision (factory reset, maintenance hour, provisioning or
//! transport failure at boot) ends the process after a settle delay, and the
//! supervisor (systemd `Restart=always` or similar) brings it back up.
use anyhow::Result;
use clap::{Parser, Subcommand};
use log::{error, info};
use std::time::Duration;

use kakubridge::bridge::{BridgeServer, RunExit};
use kakubridge::config::Config;

#[derive(Parser)]
#[command(name = "kakubridge")]
#[command(about = "A Telegram/MQTT bridge for 433 MHz remote-controlled power switches")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bridge
    Start,
    /// Initialize a new bridge configuration
    Init,
    /// Show stored account and registry state
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config early to configure logging (except for Init which writes the default later)
    let pre_config = match cli.command {
        Commands::Init => None,
        _ => Config::load(&cli.config).await.ok(),
    };
    init_logging(&pre_config, cli.verbose);

    match cli.command {
        Commands::Start => {
            let config = match pre_config {
                Some(c) => c,
                None => Config::load(&cli.config).await?,
            };
            info!("Starting KakuBridge v{}", env!("CARGO_PKG_VERSION"));
            let settle = Duration::from_secs(config.bridge.settle_delay_secs);

            let mut bridge = BridgeServer::new(config).await?;

            if let Err(e) = bridge.connect().await {
                // Boot failure: provisioning or chat transport. The marker
                // cleanup already happened inside connect; restart from the
                // top via the supervisor.
                error!("{}", e);
                tokio::time::sleep(settle).await;
                std::process::exit(1);
            }

            match bridge.run().await? {
                RunExit::FactoryReset => {
                    info!("factory reset complete; restarting");
                }
                RunExit::MaintenanceRestart => {
                    info!("maintenance window; restarting");
                }
            }
            tokio::time::sleep(settle).await;
            std::process::exit(0);
        }
        Commands::Init => {
            info!("Initializing new bridge configuration");
            Config::create_default(&cli.config).await?;
            info!("Configuration file created at {}", cli.config);
            println!("Created {}. Set bridge.mac_address before starting.", cli.config);
        }
        Commands::Status => {
            let config = match pre_config {
                Some(c) => c,
                None => Config::load(&cli.config).await?,
            };
            let bridge = BridgeServer::new(config).await?;
            bridge.show_status().await?;
        }
    }

    Ok(())
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // Base level from CLI verbosity overrides config
    let base_level = match verbosity {
        0 => match config.as_ref().map(|c| c.logging.level.as_str()) {
            Some("debug") => log::LevelFilter::Debug,
            Some("trace") => log::LevelFilter::Trace,
            Some("warn") => log::LevelFilter::Warn,
            _ => log::LevelFilter::Info,
        },
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);
    if let Some(cfg) = config {
        let security_path = cfg.logging.security_file.clone();
        if let Some(ref file) = cfg.logging.file {
            if let Ok(f) = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(file)
            {
                let mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
                let write_mutex = mutex.clone();

                // If stdout is a terminal, echo log lines there as well;
                // under a supervisor stdout is usually redirected and the
                // file is the single sink.
                let is_tty = atty::is(atty::Stream::Stdout);

                builder.format(move |fmt, record| {
                    let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                    let line = format!("{} [{}] {}", ts, record.level(), record.args());

                    // Always write to log file
                    if let Ok(mut guard) = write_mutex.lock() {
                        let _ = writeln!(guard, "{}", line);
                    }

                    // Route security events to their own file as well
                    if record.target() == "security" {
                        if let Some(ref sec_path) = security_path {
                            if let Ok(mut sf) = std::fs::OpenOptions::new()
                                .create(true)
                                .append(true)
                                .open(sec_path)
                            {
                                let _ = writeln!(sf, "{}", line);
                            }
                        }
                    }

                    if is_tty {
                        writeln!(fmt, "{}", line)
                    } else {
                        Ok(())
                    }
                });
            } else {
                builder.format(|fmt, record| {
                    writeln!(
                        fmt,
                        "{} [{}] {}",
                        chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
                        record.level(),
                        record.args()
                    )
                });
            }
        } else {
            builder.format(|fmt, record| {
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                writeln!(fmt, "{} [{}] {}", ts, record.level(), record.args())
            });
        }
    } else {
        builder.format(|fmt, record| {
            writeln!(
                fmt,
                "{} [{}] {}",
                chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
                record.level(),
                record.args()
            )
        });
    }
    let _ = builder.try_init();
}
