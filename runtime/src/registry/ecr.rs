//! Amazon ECR backend.
//!
//! Drives `aws ecr describe-images` and `aws ecr batch-delete-image` as
//! subprocesses. Request parameters travel as `--cli-input-json`, so digests
//! and tokens are never interpolated into a command line.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use image_reaper_core::error::{ReaperError, Result};
use image_reaper_core::ImageRecord;
use serde::Deserialize;
use tokio::process::Command;

use super::{BatchDeleteOutcome, DeleteFailure, ImagePage, ImageRegistry};

/// Default timeout for a single `aws` invocation.
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(120);

/// `describe-images` response body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescribeImagesResponse {
    #[serde(default)]
    image_details: Vec<ImageDetail>,
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageDetail {
    image_digest: String,
    #[serde(default)]
    image_tags: Vec<String>,
    image_pushed_at: PushedAt,
}

/// ECR timestamps arrive as epoch seconds from the raw API and as ISO 8601
/// strings from CLI v2.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PushedAt {
    Epoch(f64),
    Text(String),
}

impl PushedAt {
    fn to_utc(&self) -> Option<DateTime<Utc>> {
        match self {
            PushedAt::Epoch(secs) => {
                let whole = secs.trunc() as i64;
                let nanos = (secs.fract() * 1e9).round() as u32;
                Utc.timestamp_opt(whole, nanos.min(999_999_999)).single()
            }
            PushedAt::Text(text) => {
                if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
                    return Some(dt.with_timezone(&Utc));
                }
                text.parse::<f64>().ok().and_then(|secs| PushedAt::Epoch(secs).to_utc())
            }
        }
    }
}

/// `batch-delete-image` response body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchDeleteResponse {
    #[serde(default)]
    image_ids: Vec<ImageId>,
    #[serde(default)]
    failures: Vec<ImageFailure>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageId {
    image_digest: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageFailure {
    image_id: ImageId,
    #[serde(default)]
    failure_code: String,
    #[serde(default)]
    failure_reason: String,
}

/// ECR repository access through the AWS CLI.
///
/// Credentials and the account come from the usual AWS CLI sources
/// (environment, profile, instance role).
pub struct EcrRegistry {
    aws_bin: PathBuf,
    region: String,
    registry_id: Option<String>,
    call_timeout: Duration,
}

impl EcrRegistry {
    /// Create a backend for a region using `aws` from `PATH`.
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            aws_bin: PathBuf::from("aws"),
            region: region.into(),
            registry_id: None,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Target a registry owned by a specific account id.
    pub fn with_registry_id(mut self, registry_id: impl Into<String>) -> Self {
        self.registry_id = Some(registry_id.into());
        self
    }

    /// Use a specific `aws` executable.
    pub fn with_aws_bin(mut self, aws_bin: impl Into<PathBuf>) -> Self {
        self.aws_bin = aws_bin.into();
        self
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    fn base_input(&self, repository: &str) -> serde_json::Value {
        let mut input = serde_json::json!({ "repositoryName": repository });
        if let Some(ref id) = self.registry_id {
            input["registryId"] = serde_json::Value::String(id.clone());
        }
        input
    }

    /// Run one `aws ecr <operation>` call and return its stdout.
    async fn call(
        &self,
        repository: &str,
        operation: &str,
        input: &serde_json::Value,
    ) -> Result<Vec<u8>> {
        let input_json = serde_json::to_string(input)?;
        let registry_error = |message: String| ReaperError::RegistryError {
            repository: repository.to_string(),
            message,
        };

        tracing::debug!(operation, region = %self.region, "Calling ECR");

        let child = Command::new(&self.aws_bin)
            .arg("ecr")
            .arg(operation)
            .arg("--region")
            .arg(&self.region)
            .arg("--output")
            .arg("json")
            .arg("--no-paginate")
            .arg("--cli-input-json")
            .arg(&input_json)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                registry_error(format!(
                    "Failed to run {}: {}",
                    self.aws_bin.display(),
                    e
                ))
            })?;

        let output = tokio::time::timeout(self.call_timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                registry_error(format!(
                    "aws ecr {} timed out after {}s",
                    operation,
                    self.call_timeout.as_secs()
                ))
            })?
            .map_err(|e| registry_error(format!("aws ecr {} failed: {}", operation, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(registry_error(format!(
                "aws ecr {} exited with {}: {}",
                operation,
                output.status,
                stderr.trim()
            )));
        }

        Ok(output.stdout)
    }
}

/// Convert a `describe-images` body into a page.
fn parse_describe_images(repository: &str, body: &[u8]) -> Result<ImagePage> {
    let response: DescribeImagesResponse = serde_json::from_slice(body)?;

    let mut images = Vec::with_capacity(response.image_details.len());
    for detail in response.image_details {
        let pushed_at = detail
            .image_pushed_at
            .to_utc()
            .ok_or_else(|| ReaperError::RegistryError {
                repository: repository.to_string(),
                message: format!(
                    "Unparseable imagePushedAt for {}: {:?}",
                    detail.image_digest, detail.image_pushed_at
                ),
            })?;

        images.push(ImageRecord {
            digest: detail.image_digest,
            tags: detail.image_tags.into_iter().collect::<BTreeSet<_>>(),
            pushed_at,
        });
    }

    Ok(ImagePage {
        images,
        next_token: response.next_token.filter(|t| !t.is_empty()),
    })
}

/// Convert a `batch-delete-image` body into an outcome.
///
/// ECR reports one entry per deleted tag, so a digest can appear several
/// times in `imageIds`.
fn parse_batch_delete(body: &[u8]) -> Result<BatchDeleteOutcome> {
    let response: BatchDeleteResponse = serde_json::from_slice(body)?;

    let mut deleted: Vec<String> = Vec::new();
    for id in response.image_ids {
        if let Some(digest) = id.image_digest {
            if !deleted.contains(&digest) {
                deleted.push(digest);
            }
        }
    }

    let failures = response
        .failures
        .into_iter()
        .map(|f| DeleteFailure {
            digest: f.image_id.image_digest.unwrap_or_default(),
            code: f.failure_code,
            reason: f.failure_reason,
        })
        .collect();

    Ok(BatchDeleteOutcome { deleted, failures })
}

#[async_trait]
impl ImageRegistry for EcrRegistry {
    async fn list_page(&self, repository: &str, next_token: Option<&str>) -> Result<ImagePage> {
        let mut input = self.base_input(repository);
        if let Some(token) = next_token {
            input["nextToken"] = serde_json::Value::String(token.to_string());
        }

        let body = self.call(repository, "describe-images", &input).await?;
        parse_describe_images(repository, &body)
    }

    async fn batch_delete(
        &self,
        repository: &str,
        digests: &[String],
    ) -> Result<BatchDeleteOutcome> {
        let mut input = self.base_input(repository);
        input["imageIds"] = digests
            .iter()
            .map(|d| serde_json::json!({ "imageDigest": d }))
            .collect::<Vec<_>>()
            .into();

        let body = self.call(repository, "batch-delete-image", &input).await?;
        parse_batch_delete(&body)
    }
}
