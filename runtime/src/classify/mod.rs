//! Commit classification.
//!
//! Each image tag is checked against a read-only checkout of the source
//! repository:
//!
//! 1. the tag names an object with two or more parents (merge commit) → priority
//! 2. the tag exists as a tag ref → priority
//! 3. the tag resolves to a commit whose sha is the tag itself → generic
//! 4. anything else → custom
//!
//! An image takes the highest class among its tags. If any of its tags
//! cannot be checked, the image is folded into `custom` so it is never
//! evicted on a guess.

mod git;

use std::sync::Arc;

use async_trait::async_trait;
use image_reaper_core::error::Result;
use image_reaper_core::{ClassifiedImage, Classification, ImageRecord};
use tokio::sync::Semaphore;

pub use git::GitCheckout;

/// Read-only version-control queries keyed by a tag string.
#[async_trait]
pub trait CommitOracle: Send + Sync {
    /// Number of `parent` entries of the object the tag names (0 if unknown).
    async fn parent_count(&self, tag: &str) -> Result<usize>;

    /// Whether `refs/tags/<tag>` exists.
    async fn tag_exists(&self, tag: &str) -> Result<bool>;

    /// The full sha of the commit the tag names, if that commit exists.
    async fn resolve_commit(&self, tag: &str) -> Result<Option<String>>;
}

/// Tags that could be read as options by the oracle are never queried.
fn is_queryable(tag: &str) -> bool {
    !tag.is_empty() && !tag.starts_with('-')
}

/// Classifies images with a bounded pool of concurrent workers.
#[derive(Clone)]
pub struct CommitClassifier {
    oracle: Arc<dyn CommitOracle>,
    concurrency: usize,
}

impl CommitClassifier {
    pub fn new(oracle: Arc<dyn CommitOracle>, concurrency: usize) -> Self {
        Self {
            oracle,
            concurrency: concurrency.max(1),
        }
    }

    /// Classify a single tag, short-circuiting on the first matching check.
    pub async fn classify_tag(&self, tag: &str) -> Result<Classification> {
        if !is_queryable(tag) {
            return Ok(Classification::Custom);
        }

        if self.oracle.parent_count(tag).await? >= 2 {
            return Ok(Classification::Priority);
        }

        if self.oracle.tag_exists(tag).await? {
            return Ok(Classification::Priority);
        }

        match self.oracle.resolve_commit(tag).await? {
            Some(sha) if sha == tag => Ok(Classification::Generic),
            _ => Ok(Classification::Custom),
        }
    }

    /// Classify an image from all of its tags. Never fails.
    pub async fn classify_image(&self, record: ImageRecord) -> ClassifiedImage {
        let mut classes = Vec::with_capacity(record.tags.len());
        let mut unclassified = Vec::new();

        for tag in &record.tags {
            match self.classify_tag(tag).await {
                Ok(class) => classes.push(class),
                Err(e) => {
                    tracing::warn!(
                        digest = %record.digest,
                        tag = %tag,
                        error = %e,
                        "Tag could not be classified, keeping image"
                    );
                    unclassified.push(tag.clone());
                }
            }
        }

        let classification = if unclassified.is_empty() {
            Classification::resolve(classes)
        } else {
            Classification::Custom
        };

        tracing::trace!(digest = %record.digest, %classification, "Classified image");

        ClassifiedImage {
            record,
            classification,
            unclassified_tags: unclassified,
        }
    }

    /// Classify every image, at most `concurrency` at a time.
    ///
    /// Returns only once every image has been classified. Output order
    /// matches input order.
    pub async fn classify_all(&self, images: Vec<ImageRecord>) -> Vec<ClassifiedImage> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = Vec::with_capacity(images.len());

        for image in images.iter().cloned() {
            let semaphore = semaphore.clone();
            let classifier = self.clone();
            tasks.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                classifier.classify_image(image).await
            }));
        }

        let mut classified = Vec::with_capacity(images.len());
        for (task, image) in tasks.into_iter().zip(images) {
            match task.await {
                Ok(result) => classified.push(result),
                Err(e) => {
                    tracing::warn!(
                        digest = %image.digest,
                        error = %e,
                        "Classification task failed, keeping image"
                    );
                    let unclassified_tags = image.tags.iter().cloned().collect();
                    classified.push(ClassifiedImage {
                        record: image,
                        classification: Classification::Custom,
                        unclassified_tags,
                    });
                }
            }
        }

        classified
    }
}
