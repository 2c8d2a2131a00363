//! In-process registry backend.
//!
//! Holds images in memory, pages them like a real registry and records every
//! delete call so runs can be rehearsed and asserted on without a network.

use async_trait::async_trait;
use image_reaper_core::error::{ReaperError, Result};
use image_reaper_core::ImageRecord;
use parking_lot::Mutex;

use super::{
    BatchDeleteOutcome, DeleteFailure, ImagePage, ImageRegistry, IMAGE_NOT_FOUND, MAX_DELETE_BATCH,
};

#[derive(Default)]
struct MemoryState {
    images: Vec<ImageRecord>,
    list_calls: usize,
    delete_calls: Vec<Vec<String>>,
    listing_error: Option<String>,
    /// 1-based delete call that fails, with its message
    failing_delete: Option<(usize, String)>,
}

/// Registry backed by a vector of images.
pub struct MemoryRegistry {
    page_size: usize,
    state: Mutex<MemoryState>,
}

impl MemoryRegistry {
    /// Create a registry holding `images`, served as a single page.
    pub fn new(images: Vec<ImageRecord>) -> Self {
        Self {
            page_size: usize::MAX,
            state: Mutex::new(MemoryState {
                images,
                ..Default::default()
            }),
        }
    }

    /// Serve the listing in pages of at most `page_size` images.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Make every subsequent listing call fail.
    pub fn fail_listing(&self, message: impl Into<String>) {
        self.state.lock().listing_error = Some(message.into());
    }

    /// Make the `call`-th delete call (1-based) fail without deleting anything.
    pub fn fail_delete_call(&self, call: usize, message: impl Into<String>) {
        self.state.lock().failing_delete = Some((call, message.into()));
    }

    /// Images currently stored.
    pub fn images(&self) -> Vec<ImageRecord> {
        self.state.lock().images.clone()
    }

    /// Number of listing calls served.
    pub fn list_calls(&self) -> usize {
        self.state.lock().list_calls
    }

    /// Digests passed to each delete call, in call order.
    pub fn delete_calls(&self) -> Vec<Vec<String>> {
        self.state.lock().delete_calls.clone()
    }
}

#[async_trait]
impl ImageRegistry for MemoryRegistry {
    async fn list_page(&self, repository: &str, next_token: Option<&str>) -> Result<ImagePage> {
        let mut state = self.state.lock();
        state.list_calls += 1;

        if let Some(ref message) = state.listing_error {
            return Err(ReaperError::RegistryError {
                repository: repository.to_string(),
                message: message.clone(),
            });
        }

        let start = match next_token {
            Some(token) => token.parse::<usize>().map_err(|_| ReaperError::RegistryError {
                repository: repository.to_string(),
                message: format!("Invalid continuation token: {}", token),
            })?,
            None => 0,
        };

        let end = start.saturating_add(self.page_size).min(state.images.len());
        let images = state.images.get(start..end).unwrap_or_default().to_vec();
        let next_token = (end < state.images.len()).then(|| end.to_string());

        Ok(ImagePage { images, next_token })
    }

    async fn batch_delete(
        &self,
        repository: &str,
        digests: &[String],
    ) -> Result<BatchDeleteOutcome> {
        let mut state = self.state.lock();

        if digests.len() > MAX_DELETE_BATCH {
            return Err(ReaperError::RegistryError {
                repository: repository.to_string(),
                message: format!(
                    "Batch of {} digests exceeds the limit of {}",
                    digests.len(),
                    MAX_DELETE_BATCH
                ),
            });
        }

        state.delete_calls.push(digests.to_vec());
        let call = state.delete_calls.len();

        if let Some((failing, ref message)) = state.failing_delete {
            if failing == call {
                return Err(ReaperError::RegistryError {
                    repository: repository.to_string(),
                    message: message.clone(),
                });
            }
        }

        let mut outcome = BatchDeleteOutcome::default();
        for digest in digests {
            match state.images.iter().position(|img| &img.digest == digest) {
                Some(idx) => {
                    state.images.remove(idx);
                    outcome.deleted.push(digest.clone());
                }
                None => outcome.failures.push(DeleteFailure {
                    digest: digest.clone(),
                    code: IMAGE_NOT_FOUND.to_string(),
                    reason: "Requested image not found".to_string(),
                }),
            }
        }

        Ok(outcome)
    }
}
