//! CLI definitions and command routing.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use crate::check::{run_checks, CheckResult};
use crate::config::Settings;
use crate::registry::CertRegistry;

#[derive(Parser)]
#[command(name = "multicert")]
#[command(about = "Test TLS server that picks a certificate chain by SNI name")]
pub struct Cli {
    /// Settings file (default: $MULTICERT_CONFIG, ./multicert.toml, user config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the TLS server (default when no command is given)
    Serve {
        /// Port to listen on (overrides settings)
        #[arg(long)]
        port: Option<u16>,
        /// Address to bind (overrides settings)
        #[arg(long)]
        bind: Option<IpAddr>,
    },
    /// Check that the default and per-domain certificate files exist
    Check,
    /// List registered domains with classification and file paths
    List,
}

/// Install the tracing subscriber. MULTICERT_LOG wins over RUST_LOG.
fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_env("MULTICERT_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| "multicert=info".into());
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

/// Run CLI and dispatch to handlers.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    let cwd = std::env::current_dir()?;
    let mut settings = Settings::locate(cli.config.as_deref(), &cwd)?;

    match cli.command {
        None => cmd_serve(settings),
        Some(Commands::Serve { port, bind }) => {
            if let Some(port) = port {
                settings.listen.port = port;
            }
            if let Some(bind) = bind {
                settings.listen.address = bind;
            }
            cmd_serve(settings)
        }
        Some(Commands::Check) => cmd_check(&settings),
        Some(Commands::List) => cmd_list(&settings),
    }
}

fn print_rule() {
    println!("{}", "=".repeat(60));
}

fn print_checks(results: &[CheckResult]) {
    for r in results {
        let tag = if r.ok { "[OK]" } else { "[WARN]" };
        println!("{tag} {}", r.message);
    }
}

fn cmd_check(settings: &Settings) -> Result<()> {
    let registry = settings.registry()?;
    let results = run_checks(settings, &registry);
    print_checks(&results);
    let failed = results.iter().filter(|r| !r.ok).count();
    if failed > 0 {
        anyhow::bail!("{failed} check(s) failed");
    }
    Ok(())
}

fn cmd_list(settings: &Settings) -> Result<()> {
    let registry = settings.registry()?;
    for e in registry.entries() {
        println!(
            "{}\t{}\t{}\t{}",
            e.domain,
            e.classification,
            e.chain_path.display(),
            e.key_path.display()
        );
    }
    Ok(())
}

fn print_banner(registry: &CertRegistry, addr: std::net::SocketAddr) {
    print_rule();
    println!("Multi-certificate TLS server listening on {addr}");
    print_rule();
    println!("Available certificates:");
    for e in registry.entries() {
        println!("  - [{:<12}] {}", e.classification.label(), e.domain);
    }
    print_rule();
}

fn cmd_serve(settings: Settings) -> Result<()> {
    let registry = Arc::new(settings.registry()?);

    // Missing per-domain files only mean fallback at handshake time.
    print_rule();
    println!("Validating certificate files...");
    print_checks(&run_checks(&settings, &registry));
    print_rule();

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let acceptor = crate::serve::prepare(&settings, Arc::clone(&registry))?;
        print_banner(&registry, acceptor.local_addr()?);
        acceptor.run(crate::serve::shutdown_signal()).await
    })
}
