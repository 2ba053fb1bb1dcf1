//! certfleet - certificate renewal control plane
//!
//! Sweeps a fleet of host agents and renews expiring certificates.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use certfleet_common::{init_tracing, HostGuid, LogFormat};
use certfleet_config::Config;
use certfleet_control::certificates::SelfSignedRequest;
use certfleet_control::service::generate_self_signed;
use certfleet_control::ControlPlane;

/// certfleet - keeps TLS certificates on managed hosts current
#[derive(Parser, Debug)]
#[command(name = "certfleet")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(
        short = 'c',
        long = "config",
        env = "CERTFLEET_CONFIG",
        default_value = "certfleet.kdl",
        global = true
    )]
    config: PathBuf,

    /// Enable verbose logging (debug level)
    #[arg(long = "verbose", global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the renewal scheduler until interrupted (default)
    Run,
    /// Run one renewal sweep now and exit
    Sweep,
    /// Refresh agent metadata of a host
    Refresh {
        /// Host guid
        guid: String,
    },
    /// List the domains served by a host
    Domains {
        /// Host guid
        guid: String,
    },
    /// Generate a self-signed certificate
    SelfSigned(SelfSignedArgs),
    /// Validate configuration file and exit
    Test,
}

#[derive(Args, Debug)]
struct SelfSignedArgs {
    /// Subject common name
    #[arg(long)]
    common_name: String,

    /// Storage name; defaults to the common name
    #[arg(long)]
    cert_name: Option<String>,

    #[arg(long, default_value = "")]
    email: String,

    #[arg(long, default_value = "")]
    country: String,

    #[arg(long, default_value = "")]
    province: String,

    #[arg(long, default_value = "")]
    locality: String,

    #[arg(long, default_value = "")]
    organization: String,

    /// Subject alternative name, repeatable
    #[arg(long = "alt-name")]
    alt_names: Vec<String>,

    /// Write the PEM blob here instead of stdout
    #[arg(short, long, conflicts_with = "host")]
    output: Option<PathBuf>,

    /// Upload into this host's certificate storage instead of printing
    #[arg(long)]
    host: Option<String>,
}

impl SelfSignedArgs {
    fn into_request(self) -> SelfSignedRequest {
        SelfSignedRequest {
            cert_name: self.cert_name.unwrap_or_else(|| self.common_name.clone()),
            common_name: self.common_name,
            email: self.email,
            country: self.country,
            province: self.province,
            locality: self.locality,
            organization: self.organization,
            alt_names: self.alt_names,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Test => test_config(&cli.config),
        Commands::SelfSigned(args) if args.host.is_none() => {
            init_tracing(log_level(cli.verbose, "info"), LogFormat::Text);
            runtime()?.block_on(write_self_signed(args))
        }
        command => {
            let config = load_config(&cli.config)?;
            let level = log_level(cli.verbose, &config.logging.level);
            let format = config
                .logging
                .log_format()
                .context("Invalid logging configuration")?;
            init_tracing(level, format);

            let plane = ControlPlane::from_config(config);
            runtime()?.block_on(execute(plane, command))
        }
    }
}

fn log_level(verbose: bool, configured: &str) -> &str {
    if verbose {
        "debug"
    } else {
        configured
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")
}

fn load_config(path: &Path) -> Result<Config> {
    let config = Config::from_file(path)
        .with_context(|| format!("Failed to load configuration file {}", path.display()))?;
    config.validate().context("Configuration validation failed")?;
    Ok(config)
}

/// Test configuration file and exit
fn test_config(path: &Path) -> Result<()> {
    init_tracing("info", LogFormat::Text);

    info!("Testing configuration file: {}", path.display());
    let config = load_config(path)?;

    info!("Configuration test successful:");
    info!("  - {} host(s)", config.hosts.len());
    info!("  - {} domain setting(s)", config.domain_settings.len());
    info!(
        "  - renewal every {}s, {} days before expiry",
        config.renewal.check_interval_secs, config.renewal.renew_before_days
    );

    if !config.renewal.enabled {
        warn!("Automatic renewal is disabled");
    }

    println!(
        "certfleet: configuration file {} test is successful",
        path.display()
    );

    Ok(())
}

async fn execute(plane: ControlPlane, command: Commands) -> Result<()> {
    match command {
        Commands::Run => run_scheduler(plane).await,
        Commands::Sweep => {
            let summary = plane.manager.run().await.context("Renewal sweep failed")?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        Commands::Refresh { guid } => {
            let details = plane
                .monitor
                .refresh(&HostGuid::from(guid.as_str()))
                .await
                .with_context(|| format!("Failed to refresh host {guid}"))?;
            let host = &details.host;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "guid": host.guid,
                    "name": host.name,
                    "active": host.is_active,
                    "os": host.os_code,
                    "os_version": host.os_version,
                    "agent_version": host.agent_version,
                    "domains": details.domains.len(),
                }))?
            );
            Ok(())
        }
        Commands::Domains { guid } => {
            let domains = plane
                .domains
                .get_domains(&HostGuid::from(guid.as_str()))
                .await
                .with_context(|| format!("Failed to list domains of host {guid}"))?;
            for domain in &domains {
                let certificate = domain
                    .certificate
                    .as_ref()
                    .map(|c| format!("{} (expires {})", c.cn, c.valid_to))
                    .unwrap_or_else(|| "-".to_string());
                println!("{}\t{}\t{}", domain.server_name, domain.web_server, certificate);
            }
            Ok(())
        }
        Commands::SelfSigned(args) => {
            let Some(guid) = args.host.clone() else {
                bail!("a host guid is required to upload a certificate");
            };
            let certificate = plane
                .certificates
                .create_self_signed(&HostGuid::from(guid.as_str()), args.into_request())
                .await
                .with_context(|| format!("Failed to create certificate on host {guid}"))?;
            println!("{}", serde_json::to_string_pretty(&certificate)?);
            Ok(())
        }
        Commands::Test => Ok(()),
    }
}

async fn run_scheduler(plane: ControlPlane) -> Result<()> {
    if !plane.config().renewal.enabled {
        warn!("Automatic renewal is disabled in configuration, nothing to do");
        return Ok(());
    }

    let scheduler = plane.scheduler();
    let shutdown = CancellationToken::new();

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            wait_for_signal().await;
            info!("Shutdown signal received");
            shutdown.cancel();
        }
    });

    scheduler.run(shutdown).await;
    Ok(())
}

async fn write_self_signed(args: SelfSignedArgs) -> Result<()> {
    let output = args.output.clone();
    let pem = generate_self_signed(args.into_request())
        .await
        .context("Failed to generate self-signed certificate")?;

    match output {
        Some(path) => {
            tokio::fs::write(&path, pem)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), "Self-signed certificate written");
        }
        None => print!("{pem}"),
    }

    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "Could not install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
