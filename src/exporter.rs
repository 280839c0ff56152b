//! Result sinks.
//!
//! The pipeline treats the sink as fire-and-forget per record: one call per
//! scraped match, errors propagate to the caller and stop the current
//! listing page's loop. File names are derived upstream as
//! `{date}-{home}-{away}.json`.

use std::path::PathBuf;

use anyhow::Context;
use aws_sdk_s3::primitives::ByteStream;
use tracing::info;

use crate::matches::MatchRecord;

pub enum Exporter {
    File(FileExporter),
    S3(S3Exporter),
}

impl Exporter {
    pub async fn export(&self, record: &MatchRecord, file_name: &str) -> anyhow::Result<()> {
        match self {
            Exporter::File(exporter) => exporter.export(record, file_name).await,
            Exporter::S3(exporter) => exporter.export(record, file_name).await,
        }
    }
}

/// Writes one JSON document per match into a local directory.
pub struct FileExporter {
    directory: PathBuf,
}

impl FileExporter {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub async fn export(&self, record: &MatchRecord, file_name: &str) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.directory)
            .await
            .with_context(|| format!("creating output directory {}", self.directory.display()))?;

        let path = self.directory.join(file_name);
        let body = serde_json::to_vec_pretty(record)?;
        tokio::fs::write(&path, body)
            .await
            .with_context(|| format!("writing {}", path.display()))?;

        info!("exported {}", path.display());
        Ok(())
    }
}

/// Uploads one JSON object per match into an S3 bucket.
pub struct S3Exporter {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3Exporter {
    /// Build a client from the ambient AWS environment (credentials chain,
    /// region, endpoint overrides).
    pub async fn from_env(bucket: impl Into<String>) -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self {
            client: aws_sdk_s3::Client::new(&config),
            bucket: bucket.into(),
        }
    }

    pub async fn export(&self, record: &MatchRecord, file_name: &str) -> anyhow::Result<()> {
        let body = serde_json::to_vec(record)?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(file_name)
            .content_type("application/json")
            .body(ByteStream::from(body))
            .send()
            .await
            .with_context(|| format!("uploading {file_name} to s3://{}", self.bucket))?;

        info!("exported s3://{}/{file_name}", self.bucket);
        Ok(())
    }
}
