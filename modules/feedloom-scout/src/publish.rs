// Service: publishing rendered feed documents.
//
// A publisher stores one document under a key and reports where readers
// can fetch it.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use async_trait::async_trait;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::{Client as S3Client, Config as S3Config};
use feedloom_common::{PublishBackend, PublishConfig};
use serde::Serialize;
use tracing::info;

pub const RSS_CONTENT_TYPE: &str = "application/rss+xml; charset=utf-8";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Published {
    pub key: String,
    pub url: String,
}

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn upload(&self, key: &str, content: &str) -> anyhow::Result<Published>;
}

fn public_location(public_url: Option<&str>, key: &str) -> Option<String> {
    public_url.map(|base| format!("{}/{}", base.trim_end_matches('/'), key))
}

// --- Object storage ---

/// Cloudflare R2 through its S3-compatible API.
pub struct S3Publisher {
    client: S3Client,
    bucket: String,
    public_url: Option<String>,
}

impl S3Publisher {
    pub fn new(client: S3Client, bucket: impl Into<String>, public_url: Option<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            public_url,
        }
    }

    pub fn r2(config: &PublishConfig) -> anyhow::Result<Self> {
        if !config.r2_configured() {
            bail!("R2 publishing requires CF_ACCOUNT_ID, R2_ACCESS_KEY_ID and R2_SECRET_ACCESS_KEY");
        }
        if config.bucket.is_empty() {
            bail!("R2 publishing requires R2_BUCKET_NAME");
        }

        let credentials = Credentials::new(
            config.access_key_id.clone(),
            config.secret_access_key.clone(),
            None,
            None,
            "feedloom",
        );
        let s3_config = S3Config::builder()
            .region(Region::new("auto"))
            .endpoint_url(format!(
                "https://{}.r2.cloudflarestorage.com",
                config.account_id
            ))
            .credentials_provider(credentials)
            .build();

        Ok(Self::new(
            S3Client::from_conf(s3_config),
            config.bucket.clone(),
            config.public_url.clone(),
        ))
    }
}

#[async_trait]
impl Publisher for S3Publisher {
    async fn upload(&self, key: &str, content: &str) -> anyhow::Result<Published> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(RSS_CONTENT_TYPE)
            .body(ByteStream::from(content.as_bytes().to_vec()))
            .send()
            .await
            .with_context(|| format!("R2 upload of {key}"))?;

        let url = public_location(self.public_url.as_deref(), key)
            .unwrap_or_else(|| format!("r2://{}/{}", self.bucket, key));
        info!(key, url = url.as_str(), "Feed uploaded");
        Ok(Published {
            key: key.to_string(),
            url,
        })
    }
}

// --- Local directory ---

/// Writes documents under a directory, for static hosting or local use.
pub struct DirectoryPublisher {
    dir: PathBuf,
    public_url: Option<String>,
}

impl DirectoryPublisher {
    pub fn new(dir: impl Into<PathBuf>, public_url: Option<String>) -> Self {
        Self {
            dir: dir.into(),
            public_url,
        }
    }
}

#[async_trait]
impl Publisher for DirectoryPublisher {
    async fn upload(&self, key: &str, content: &str) -> anyhow::Result<Published> {
        let target = self.dir.join(key);
        let parent = target.parent().unwrap_or(&self.dir).to_path_buf();
        tokio::fs::create_dir_all(&parent)
            .await
            .with_context(|| format!("creating {}", parent.display()))?;

        // Rename over the target so readers never see a partial document.
        let staging = target.with_extension("partial");
        tokio::fs::write(&staging, content)
            .await
            .with_context(|| format!("writing {}", staging.display()))?;
        tokio::fs::rename(&staging, &target)
            .await
            .with_context(|| format!("replacing {}", target.display()))?;

        let url = public_location(self.public_url.as_deref(), key)
            .unwrap_or_else(|| target.display().to_string());
        info!(key, url = url.as_str(), "Feed written");
        Ok(Published {
            key: key.to_string(),
            url,
        })
    }
}

/// The configured publisher, or `None` when publishing is disabled.
pub fn build_publisher(config: &PublishConfig) -> anyhow::Result<Option<Arc<dyn Publisher>>> {
    match &config.backend {
        PublishBackend::R2 => Ok(Some(Arc::new(S3Publisher::r2(config)?))),
        PublishBackend::Directory(dir) => Ok(Some(Arc::new(DirectoryPublisher::new(
            dir.clone(),
            config.public_url.clone(),
        )))),
        PublishBackend::Disabled => Ok(None),
    }
}
