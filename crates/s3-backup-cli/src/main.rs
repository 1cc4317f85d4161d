//! s3-backup: drive a bucket-backed backup agent from the command line.
//!
//! Configure with S3_BACKUP_BUCKET, S3_BACKUP_ACCESS_KEY_ID,
//! S3_BACKUP_SECRET_ACCESS_KEY and optionally S3_BACKUP_ENDPOINT_URL.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use s3_backup_agent::{BackupAgent, BackupRecord, S3BackupAgent};
use s3_backup_cli::{file_source, init_tracing, parse_backup_date, write_download};
use s3_backup_core::AgentConfig;
use serde::Serialize;

#[derive(Parser)]
#[command(name = "s3-backup", about = "Backup agent for S3-compatible buckets")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every backup stored in the bucket
    List,
    /// Show the record of a single backup
    Get {
        /// Backup id
        id: String,
    },
    /// Download backup content
    Download {
        /// Backup id
        id: String,
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Upload a backup archive
    Upload {
        /// Path to the archive
        file: PathBuf,
        /// Backup id (defaults to a random UUID)
        #[arg(long)]
        id: Option<String>,
        /// Human readable backup name
        #[arg(long)]
        name: String,
        /// Creation time as RFC 3339 (defaults to now)
        #[arg(long)]
        date: Option<String>,
        /// Mark the backup as protected
        #[arg(long)]
        protected: bool,
    },
    /// Delete a backup
    Delete {
        /// Backup id
        id: String,
    },
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize response")?;
    println!("{}", out);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let config = AgentConfig::from_env().context(
        "Failed to load agent configuration. Set S3_BACKUP_BUCKET and credentials",
    )?;
    let agent = S3BackupAgent::from_config(&config)?;

    match cli.command {
        Commands::List => {
            let records = agent.list_backups().await?;
            print_json(&records)?;
        }
        Commands::Get { id } => {
            let record = agent.get_backup(&id).await?;
            print_json(&record)?;
        }
        Commands::Download { id, output } => {
            let stream = agent.download_backup(&id).await?;
            let written = match output {
                Some(path) => {
                    let mut file = tokio::fs::File::create(&path)
                        .await
                        .with_context(|| format!("Failed to create {}", path.display()))?;
                    write_download(stream, &mut file).await?
                }
                None => write_download(stream, &mut tokio::io::stdout()).await?,
            };
            tracing::info!(backup_id = %id, size_bytes = written, "Download finished");
        }
        Commands::Upload {
            file,
            id,
            name,
            date,
            protected,
        } => {
            let size = tokio::fs::metadata(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?
                .len();
            let id = id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            let record = BackupRecord::new(id, name, parse_backup_date(date.as_deref())?)
                .with_size(size)
                .with_protected(protected);

            agent.upload_backup(&record, file_source(&file)).await?;
            print_json(&record)?;
        }
        Commands::Delete { id } => {
            agent.delete_backup(&id).await?;
            print_json(
                &serde_json::json!({ "success": true, "message": format!("Backup {} deleted", id) }),
            )?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn help_and_arguments_parse_without_configuration() {
        let err = Cli::try_parse_from(["s3-backup", "--help"]).err().unwrap();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);

        let cli = Cli::try_parse_from([
            "s3-backup",
            "upload",
            "backup.tar",
            "--name",
            "nightly",
            "--protected",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Upload { ref name, protected: true, id: None, .. } if name == "nightly"
        ));
    }
}
