use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use registry::config::RegistryConfig;
use registry::DbClient;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "registry")]
#[command(about = "GitHub App integration registry")]
struct Cli {
    /// Path to a JSON config file, overriding REGISTRY_CONFIG_PATH
    #[arg(long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create the database and apply pending migrations
    Migrate,
    /// List sources
    Sources,
    /// List private keys without their material
    Keys,
    /// List servers
    Servers {
        #[arg(long)]
        key: Option<String>,
    },
    /// List GitHub Apps
    Apps {
        #[arg(long)]
        source: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match cli.config.as_deref() {
        Some(path) => RegistryConfig::load_from(path)?,
        None => RegistryConfig::load()?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_filter()))
        .init();

    let db = DbClient::initialize_with(&config)
        .await
        .with_context(|| format!("Failed to open database: {}", config.database_path()))?;

    match cli.command {
        Command::Migrate => {
            println!("Database ready at: {}", config.database_path());
        }
        Command::Sources => {
            for source in db.list_sources().await? {
                println!(
                    "{}\t{}\t{}\t{}",
                    source.id,
                    source.name,
                    source.source_type,
                    source.created_at.to_rfc3339()
                );
            }
        }
        Command::Keys => {
            for key in db.list_private_keys().await? {
                let origin = if key.is_external { "external" } else { "generated" };
                println!("{}\t{}\t{}\t{origin}", key.id, key.name, key.key_type);
            }
        }
        Command::Servers { key } => {
            let servers = match key.as_deref() {
                Some(private_key_id) => db.list_servers_for_private_key(private_key_id).await?,
                None => db.list_servers().await?,
            };
            for server in servers {
                let state = if server.is_validated { "validated" } else { "pending" };
                println!(
                    "{}\t{}\t{}:{}\t{state}\t{}",
                    server.id, server.name, server.hostname, server.port, server.private_key_id
                );
            }
        }
        Command::Apps { source } => {
            let apps = match source.as_deref() {
                Some(source_id) => db.list_github_apps_for_source(source_id).await?,
                None => db.list_github_apps().await?,
            };
            for app in apps {
                println!(
                    "{}\t{}\t{}\t{}\t{}",
                    app.id,
                    app.slug,
                    app.owner.login,
                    app.source_id,
                    app.events.join(",")
                );
            }
        }
    }

    Ok(())
}
