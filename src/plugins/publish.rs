//! Shipped publishers.
//!
//! Publishing is all-or-nothing per call: `Ok` means the artifact is
//! durable downstream. The backing store is substitutable without
//! touching orchestration logic.

use std::path::PathBuf;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};

use crate::domain::Artifact;

use super::{PublishError, Publisher};

/// Hands artifacts to a downstream store mounted as a directory.
///
/// The artifact is copied to a hidden temporary name and renamed into
/// place, so a consumer polling the directory never observes a partial
/// file.
pub struct DirectoryPublisher {
    publish_dir: PathBuf,
}

impl DirectoryPublisher {
    pub fn new(publish_dir: PathBuf) -> Self {
        Self { publish_dir }
    }
}

#[async_trait]
impl Publisher for DirectoryPublisher {
    fn name(&self) -> &str {
        "directory"
    }

    async fn publish(&self, artifact: &Artifact) -> Result<(), PublishError> {
        tokio::fs::create_dir_all(&self.publish_dir).await?;

        let file_name = artifact.file_name();
        if file_name.is_empty() {
            return Err(PublishError::Rejected(format!(
                "artifact has no file name: {}",
                artifact.path.display()
            )));
        }

        let tmp = self.publish_dir.join(format!(".tmp-{}", file_name));
        let dest = self.publish_dir.join(&file_name);

        tokio::fs::copy(&artifact.path, &tmp).await?;
        tokio::fs::rename(&tmp, &dest).await?;

        Ok(())
    }
}

/// Uploads artifacts to an HTTP endpoint as a multipart POST.
pub struct HttpPublisher {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpPublisher {
    pub fn new(endpoint: String) -> Self {
        Self {
            endpoint,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Publisher for HttpPublisher {
    fn name(&self) -> &str {
        "http"
    }

    async fn publish(&self, artifact: &Artifact) -> Result<(), PublishError> {
        let bytes = tokio::fs::read(&artifact.path).await?;

        let part = Part::bytes(bytes)
            .file_name(artifact.file_name())
            .mime_str("application/json")
            .map_err(|e| PublishError::Upload(e.to_string()))?;

        let form = Form::new()
            .text("kind", artifact.kind.as_str().to_string())
            .text("rows", artifact.rows.to_string())
            .part("artifact", part);

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| PublishError::Upload(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PublishError::Rejected(format!(
                "endpoint returned {}",
                response.status()
            )));
        }

        Ok(())
    }
}
