//! Registry access for the retention engine.
//!
//! The engine only needs two calls from a registry: one page of the image
//! listing, and a batched delete by digest. [`ImageRegistry`] is that seam;
//! [`EcrRegistry`] drives Amazon ECR through the `aws` CLI and
//! [`MemoryRegistry`] keeps everything in process.

mod ecr;
mod memory;

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use image_reaper_core::error::{ReaperError, Result};
use image_reaper_core::ImageRecord;
use serde::{Deserialize, Serialize};

pub use ecr::EcrRegistry;
pub use memory::MemoryRegistry;

/// Hard registry limit on digests per delete request.
pub const MAX_DELETE_BATCH: usize = 100;

/// Failure code a registry reports for a digest that no longer exists.
pub const IMAGE_NOT_FOUND: &str = "ImageNotFound";

/// One page of the registry listing.
#[derive(Debug, Clone, Default)]
pub struct ImagePage {
    pub images: Vec<ImageRecord>,
    /// Continuation token; `None` on the last page
    pub next_token: Option<String>,
}

/// A digest the registry refused to delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteFailure {
    pub digest: String,
    pub code: String,
    pub reason: String,
}

impl DeleteFailure {
    /// Whether the digest was already gone, which counts as deleted.
    pub fn is_not_found(&self) -> bool {
        self.code == IMAGE_NOT_FOUND
    }
}

/// Result of one batch delete call.
#[derive(Debug, Clone, Default)]
pub struct BatchDeleteOutcome {
    pub deleted: Vec<String>,
    pub failures: Vec<DeleteFailure>,
}

/// The two registry operations the engine consumes.
#[async_trait]
pub trait ImageRegistry: Send + Sync {
    /// Fetch one page of images, continuing from `next_token` when given.
    async fn list_page(&self, repository: &str, next_token: Option<&str>) -> Result<ImagePage>;

    /// Delete up to [`MAX_DELETE_BATCH`] images by digest.
    async fn batch_delete(&self, repository: &str, digests: &[String])
        -> Result<BatchDeleteOutcome>;
}

/// List every image in a repository, following continuation tokens.
///
/// Pages are fetched strictly in sequence and accumulated before returning.
/// A digest seen on more than one page is kept once with its tags merged.
pub async fn list_images(
    registry: &dyn ImageRegistry,
    repository: &str,
) -> Result<Vec<ImageRecord>> {
    let mut images: Vec<ImageRecord> = Vec::new();
    let mut by_digest: HashMap<String, usize> = HashMap::new();
    let mut seen_tokens: HashSet<String> = HashSet::new();
    let mut token: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let page = registry.list_page(repository, token.as_deref()).await?;
        pages += 1;

        for image in page.images {
            match by_digest.get(&image.digest) {
                Some(&idx) => images[idx].tags.extend(image.tags),
                None => {
                    by_digest.insert(image.digest.clone(), images.len());
                    images.push(image);
                }
            }
        }

        match page.next_token {
            Some(next) => {
                if !seen_tokens.insert(next.clone()) {
                    return Err(ReaperError::RegistryError {
                        repository: repository.to_string(),
                        message: format!("Listing returned continuation token {} twice", next),
                    });
                }
                token = Some(next);
            }
            None => break,
        }
    }

    tracing::info!(
        repository,
        pages,
        count = images.len(),
        "Listed registry images"
    );

    Ok(images)
}
