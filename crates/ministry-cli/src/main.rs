//! Ministry storage CLI: drives the storage facade configured from the environment.
//!
//! Backend and credentials come from the same variables the services use
//! (`STORAGE_BACKEND`, `LOCAL_STORAGE_PATH`, `S3_BUCKET`, ...).

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use ministry_cli::{print_json, read_upload};
use ministry_core::{StorageCategory, StorageConfig};
use ministry_infra::{init_telemetry, shutdown_telemetry, ErrorResponse, DEFAULT_LOG_FILTER};
use ministry_storage::{create_facade, StorageError};
use serde_json::json;

#[derive(Parser)]
#[command(name = "ministry-storage", about = "Ministry media storage CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a file into a category
    Upload {
        /// Path to the file to upload
        file: PathBuf,
        /// avatar, recording, sequence or multimedia
        #[arg(long)]
        category: StorageCategory,
        /// Owning tenant; files without one go to the shared folder
        #[arg(long)]
        tenant: Option<String>,
        /// Override the content type guessed from the extension
        #[arg(long)]
        content_type: Option<String>,
    },
    /// Delete an object by key
    Delete {
        /// Object key, e.g. avatar/church-42/<id>.png
        key: String,
    },
    /// Print the access URL for an object
    Url {
        key: String,
        /// Expiry for private objects, in seconds
        #[arg(long)]
        expires_in: Option<u64>,
    },
    /// Make a public object readable again after a partial upload
    RetryGrant { key: String },
    /// Show the active backend and its usage
    Describe,
    /// Validate configuration and build the backend without touching objects
    CheckConfig,
}

async fn run(cli: Cli, config: &StorageConfig) -> anyhow::Result<serde_json::Value> {
    let facade = create_facade(config).await?;

    let output = match cli.command {
        Commands::Upload {
            file,
            category,
            tenant,
            content_type,
        } => {
            let request = read_upload(&file, category, content_type, tenant).await?;
            serde_json::to_value(facade.upload(request).await?)?
        }
        Commands::Delete { key } => {
            let outcome = facade.delete(&key).await?;
            json!({ "key": key, "outcome": outcome })
        }
        Commands::Url { key, expires_in } => {
            let url = facade
                .get_access_url(&key, expires_in.map(Duration::from_secs))
                .await?;
            json!({ "key": key, "url": url })
        }
        Commands::RetryGrant { key } => {
            facade.retry_public_grant(&key).await?;
            json!({ "key": key, "public": true })
        }
        Commands::Describe => serde_json::to_value(facade.describe_backend().await?)?,
        Commands::CheckConfig => json!({
            "backend": config.storage_backend.to_string(),
            "private_access_mode": config.private_access_mode,
            "environment": config.environment,
            "valid": true,
        }),
    };

    Ok(output)
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = StorageConfig::from_env().context("Failed to load storage configuration")?;
    init_telemetry(config.log_format, DEFAULT_LOG_FILTER)
        .map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;

    let result = run(cli, &config).await;
    shutdown_telemetry().await;

    match result {
        Ok(output) => {
            print_json(&output)?;
            Ok(ExitCode::SUCCESS)
        }
        // Storage failures are reported as structured responses; anything else bubbles up.
        Err(err) => match err.downcast_ref::<StorageError>() {
            Some(storage_err) => {
                ErrorResponse::log(storage_err);
                let response = ErrorResponse::from_error(storage_err, config.is_production());
                eprintln!("{}", serde_json::to_string_pretty(&response)?);
                Ok(ExitCode::FAILURE)
            }
            None => Err(err),
        },
    }
}
