//! Helpers shared by the `s3-backup` binary.

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use s3_backup_agent::{open_stream, BackupStream, ChunkStream, OpenStream};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::io::ReaderStream;

/// Initialize tracing for CLI binaries.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Parse an RFC 3339 timestamp, defaulting to now.
pub fn parse_backup_date(raw: Option<&str>) -> anyhow::Result<DateTime<Utc>> {
    match raw {
        Some(raw) => Ok(DateTime::parse_from_rfc3339(raw)
            .with_context(|| format!("Invalid backup date '{}', expected RFC 3339", raw))?
            .with_timezone(&Utc)),
        None => Ok(Utc::now()),
    }
}

/// Chunk source reading `path` lazily once invoked.
pub fn file_source(path: &Path) -> OpenStream {
    let path: PathBuf = path.to_path_buf();
    open_stream(move || async move {
        let file = tokio::fs::File::open(&path).await?;
        let chunks: ChunkStream = Box::pin(ReaderStream::new(file));
        Ok(chunks)
    })
}

/// Copy a download into `writer`, returning the number of bytes written.
pub async fn write_download<W>(stream: BackupStream, writer: &mut W) -> anyhow::Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let mut stream = stream;
    let mut written: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        writer
            .write_all(&chunk)
            .await
            .context("Failed to write backup content")?;
        written += chunk.len() as u64;
    }
    writer.flush().await.context("Failed to flush output")?;

    Ok(written)
}
