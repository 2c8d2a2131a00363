//! Retention policy: partitioning and eviction selection.
//!
//! Both steps are pure functions over the classified image set; no I/O
//! happens here.

mod select;

use image_reaper_core::{ClassCounts, ClassifiedImage, Classification, RetentionConfig};
use serde::Serialize;

pub use select::{select, EvictionSet};

/// Classified images bucketed by class, each bucket oldest first.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Partitions {
    pub generic: Vec<ClassifiedImage>,
    pub priority: Vec<ClassifiedImage>,
    pub custom: Vec<ClassifiedImage>,
    /// Images carrying a blacklisted tag; never eligible for eviction
    pub protected: Vec<ClassifiedImage>,
}

impl Partitions {
    /// Counts of the evictable buckets plus protected images by class.
    pub fn counts(&self) -> ClassCounts {
        ClassCounts::from_images(
            self.generic
                .iter()
                .chain(&self.priority)
                .chain(&self.custom)
                .chain(&self.protected),
        )
    }
}

/// Number of images over the cap, or zero.
pub fn excess(total: usize, max_total_images: usize) -> usize {
    total.saturating_sub(max_total_images)
}

/// Bucket classified images and order each bucket by push time.
///
/// Ties on push time are broken by digest so the order is stable across
/// runs.
pub fn partition(images: Vec<ClassifiedImage>, config: &RetentionConfig) -> Partitions {
    let mut partitions = Partitions::default();

    for image in images {
        if image.record.tags.iter().any(|tag| config.is_blacklisted(tag)) {
            partitions.protected.push(image);
            continue;
        }

        match image.classification {
            Classification::Generic => partitions.generic.push(image),
            Classification::Priority => partitions.priority.push(image),
            Classification::Custom => partitions.custom.push(image),
        }
    }

    for bucket in [
        &mut partitions.generic,
        &mut partitions.priority,
        &mut partitions.custom,
        &mut partitions.protected,
    ] {
        bucket.sort_by(|a, b| {
            a.record
                .pushed_at
                .cmp(&b.record.pushed_at)
                .then_with(|| a.record.digest.cmp(&b.record.digest))
        });
    }

    partitions
}
