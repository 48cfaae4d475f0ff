// Concierge command line: schema bootstrap and one-off permission checks.
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use concierge::bootstrap::SchemaBootstrap;
use concierge::core::capability::PermissionLabel;
use concierge::core::config::ConciergeConfig;
use concierge::rbac::guard::{AccessGuard, CommandCheck};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "concierge")]
#[command(about = "Identity and permission resolution for registered processes")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct ConfigArgs {
    /// JSON configuration file
    #[arg(long, env = "CONCIERGE_CONFIG")]
    config: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create and seed the schema, dropping it first when reset is set
    Bootstrap {
        #[command(flatten)]
        config: ConfigArgs,

        /// Override the `reset` setting from the configuration file
        #[arg(long)]
        reset: Option<bool>,
    },
    /// Evaluate one permission request
    Check {
        #[command(flatten)]
        config: ConfigArgs,

        username: String,
        groupname: String,
        rolename: String,
        processname: String,

        /// One of r, w, x, rw, rx, wx
        permission: PermissionLabel,
    },
    /// List role names
    Roles {
        #[command(flatten)]
        config: ConfigArgs,
    },
}

fn load_config(args: &ConfigArgs) -> Result<ConciergeConfig> {
    ConciergeConfig::from_file(&args.config)
        .with_context(|| format!("failed to load config from {}", args.config.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Bootstrap { config, reset } => {
            let config = load_config(&config)?;
            let reset = reset.unwrap_or(config.reset);
            let store = concierge::open_store(&config)
                .await
                .context("failed to connect to store")?;

            let stages = SchemaBootstrap::from_config(store, &config)
                .run(reset)
                .await?;
            info!(env = ?config.env, stages = ?stages, "Bootstrap finished");
        }
        Command::Check {
            config,
            username,
            groupname,
            rolename,
            processname,
            permission,
        } => {
            let config = load_config(&config)?;
            let store = concierge::open_store(&config)
                .await
                .context("failed to connect to store")?;
            let guard = AccessGuard::builder(store)
                .with_audit_logging(config.audit_enabled)
                .build();

            let check = CommandCheck {
                username,
                groupname,
                rolename,
                processname,
            };
            guard.check_permission(&check, permission).await?;
            println!("granted");
        }
        Command::Roles { config } => {
            let config = load_config(&config)?;
            let store = concierge::open_store(&config)
                .await
                .context("failed to connect to store")?;
            let guard = AccessGuard::builder(store).build();
            for role in guard.role_names().await? {
                println!("{}", role);
            }
        }
    }

    Ok(())
}
