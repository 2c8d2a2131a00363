//! `git` subprocess oracle over a local checkout.

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use image_reaper_core::error::{ReaperError, Result};
use tokio::process::Command;

use super::CommitOracle;

/// A cloned repository queried through `git -C <dir>`.
///
/// Every call is an argument vector, never a shell string, and is bounded by
/// a timeout. The checkout is only read.
pub struct GitCheckout {
    dir: PathBuf,
    git_bin: PathBuf,
    timeout: Duration,
}

impl GitCheckout {
    /// Open an existing checkout, failing if `dir` is not a git repository.
    pub async fn open(dir: impl Into<PathBuf>, timeout: Duration) -> Result<Self> {
        Self::open_with_git(dir, "git", timeout).await
    }

    /// Open with a specific `git` executable.
    pub async fn open_with_git(
        dir: impl Into<PathBuf>,
        git_bin: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Result<Self> {
        let checkout = Self {
            dir: dir.into(),
            git_bin: git_bin.into(),
            timeout,
        };

        let output = checkout
            .run("", &["rev-parse", "--git-dir"])
            .await
            .map_err(|e| {
                ReaperError::ConfigError(format!(
                    "Cannot query git checkout {}: {}",
                    checkout.dir.display(),
                    e
                ))
            })?;
        if !output.status.success() {
            return Err(ReaperError::ConfigError(format!(
                "{} is not a git checkout: {}",
                checkout.dir.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        tracing::debug!(checkout = %checkout.dir.display(), "Opened git checkout");
        Ok(checkout)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn run(&self, tag: &str, args: &[&str]) -> Result<Output> {
        let child = Command::new(&self.git_bin)
            .arg("-C")
            .arg(&self.dir)
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ReaperError::ClassificationError {
                tag: tag.to_string(),
                message: format!("Failed to run {}: {}", self.git_bin.display(), e),
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| ReaperError::ClassificationError {
                tag: tag.to_string(),
                message: format!(
                    "git {} timed out after {}s",
                    args.first().copied().unwrap_or_default(),
                    self.timeout.as_secs()
                ),
            })?
            .map_err(|e| ReaperError::ClassificationError {
                tag: tag.to_string(),
                message: format!("git {} failed: {}", args.first().copied().unwrap_or_default(), e),
            })?;

        // A missing exit code means git was killed by a signal.
        if output.status.code().is_none() {
            return Err(ReaperError::ClassificationError {
                tag: tag.to_string(),
                message: format!("git terminated abnormally: {}", output.status),
            });
        }

        Ok(output)
    }
}

/// Count `parent <sha>` header lines in `git cat-file -p` output.
fn count_parents(object: &str) -> usize {
    object
        .lines()
        .take_while(|line| !line.is_empty())
        .filter_map(|line| line.strip_prefix("parent "))
        .filter(|sha| is_object_id(sha))
        .count()
}

/// SHA-1 (40) or SHA-256 (64) lowercase hex object id.
fn is_object_id(s: &str) -> bool {
    matches!(s.len(), 40 | 64) && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

#[async_trait]
impl CommitOracle for GitCheckout {
    async fn parent_count(&self, tag: &str) -> Result<usize> {
        let output = self.run(tag, &["cat-file", "-p", tag]).await?;
        if !output.status.success() {
            return Ok(0);
        }
        Ok(count_parents(&String::from_utf8_lossy(&output.stdout)))
    }

    async fn tag_exists(&self, tag: &str) -> Result<bool> {
        let refname = format!("refs/tags/{}", tag);
        let output = self
            .run(tag, &["show-ref", "--verify", "--quiet", &refname])
            .await?;
        Ok(output.status.success())
    }

    async fn resolve_commit(&self, tag: &str) -> Result<Option<String>> {
        // A full hex name verifies without existing; peeling to a commit
        // requires the object to be in the history.
        let peeled = format!("{}^{{commit}}", tag);
        let output = self
            .run(
                tag,
                &["rev-parse", "--verify", "--quiet", "--end-of-options", &peeled],
            )
            .await?;
        if !output.status.success() {
            return Ok(None);
        }

        let sha = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !is_object_id(&sha) {
            return Err(ReaperError::ClassificationError {
                tag: tag.to_string(),
                message: format!("Unexpected rev-parse output: {:?}", sha),
            });
        }
        Ok(Some(sha))
    }
}
