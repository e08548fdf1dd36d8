use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

// ── CLI definition ─────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "zkitd", about = "ZeroKit demo application server", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the demo application server
    Serve {
        /// Host to bind (default: $ZKIT_HOST or 0.0.0.0)
        #[arg(long, env = "ZKIT_HOST", default_value = "0.0.0.0")]
        host: String,
        /// Port to listen on (default: $ZKIT_PORT or 3000)
        #[arg(long, env = "ZKIT_PORT", default_value = "3000")]
        port: u16,
    },
    /// Instantiate the config templates for a tenant
    Install {
        /// Tenant id, as issued by the management portal
        tenant_id: String,
        /// Hex-encoded admin key for the tenant
        admin_key: String,
        /// Shared host id; omit when the tenant has a dedicated host
        #[arg(long)]
        host_id: Option<String>,
        /// Directory holding the template tree
        #[arg(long, default_value = ".")]
        template_dir: PathBuf,
        /// Directory the instantiated app is written to
        #[arg(long, default_value = "app")]
        out_dir: PathBuf,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("ZKIT_LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { host, port } => {
            let cfg = zkit_server::ServerConfig {
                host,
                port,
                ..Default::default()
            };
            zkit_server::run(cfg).await
        }

        Commands::Install {
            tenant_id,
            admin_key,
            host_id,
            template_dir,
            out_dir,
        } => {
            let vars = zkit_server::install::tenant_vars(&tenant_id, &admin_key, host_id.as_deref());
            let written = zkit_server::install::instantiate(&template_dir, &out_dir, &vars)
                .context("instantiate templates")?;
            println!("instantiated {written} file(s) into {}", out_dir.display());
            println!("start the app with: zkitd serve");
            Ok(())
        }
    }
}
