//! Eviction selection.

use std::collections::HashSet;

use image_reaper_core::{ClassifiedImage, Classification};
use serde::Serialize;

use super::Partitions;

/// Images chosen for deletion, oldest generic first, then oldest priority.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EvictionSet {
    pub images: Vec<ClassifiedImage>,
    /// Images over the cap that policy refused to evict
    pub shortfall: usize,
}

impl EvictionSet {
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    /// Digests to delete, each once.
    pub fn digests(&self) -> Vec<String> {
        self.images.iter().map(|i| i.record.digest.clone()).collect()
    }

    /// Number of evicted images of a class.
    pub fn count(&self, classification: Classification) -> usize {
        self.images
            .iter()
            .filter(|i| i.classification == classification)
            .count()
    }
}

/// Choose the images to evict for a given excess.
///
/// Generic images go first. Priority images are only touched once generic
/// ones run out, and never below `min_priority_floor`. Custom and protected
/// images are never selected, so the result may fall short of `excess`.
pub fn select(partitions: &Partitions, excess: usize, min_priority_floor: usize) -> EvictionSet {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut images = Vec::new();

    let generic_quota = excess.min(partitions.generic.len());
    for image in &partitions.generic[..generic_quota] {
        if seen.insert(image.digest()) {
            images.push(image.clone());
        }
    }

    let remaining = excess - generic_quota;
    if remaining > 0 {
        let evictable = partitions.priority.len().saturating_sub(min_priority_floor);
        let priority_quota = remaining.min(evictable);
        for image in &partitions.priority[..priority_quota] {
            if seen.insert(image.digest()) {
                images.push(image.clone());
            }
        }
    }

    let shortfall = excess.saturating_sub(images.len());
    if shortfall > 0 {
        tracing::info!(
            excess,
            selected = images.len(),
            shortfall,
            "Cannot reach image cap without evicting protected images"
        );
    }

    EvictionSet { images, shortfall }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use image_reaper_core::ImageRecord;

    fn bucket(prefix: &str, n: usize, class: Classification) -> Vec<ClassifiedImage> {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| {
                ClassifiedImage::new(
                    ImageRecord::new(
                        format!("{prefix}{i:04}"),
                        [format!("{prefix}{i}")],
                        base + Duration::minutes(i as i64),
                    ),
                    class,
                )
            })
            .collect()
    }

    fn partitions(generic: usize, priority: usize, custom: usize) -> Partitions {
        Partitions {
            generic: bucket("g", generic, Classification::Generic),
            priority: bucket("p", priority, Classification::Priority),
            custom: bucket("c", custom, Classification::Custom),
            protected: Vec::new(),
        }
    }

    #[test]
    fn test_zero_excess_selects_nothing() {
        let p = partitions(900, 60, 10);
        let set = select(&p, 0, 50);
        assert!(set.is_empty());
        assert_eq!(set.shortfall, 0);
    }

    #[test]
    fn test_generic_covers_excess() {
        let p = partitions(910, 60, 10);
        let set = select(&p, 80, 50);
        assert_eq!(set.len(), 80);
        assert_eq!(set.count(Classification::Generic), 80);
        assert_eq!(set.images[0].digest(), "g0000");
        assert_eq!(set.images[79].digest(), "g0079");
    }

    #[test]
    fn test_priority_after_generic_respects_floor() {
        let p = partitions(80, 60, 860);
        let set = select(&p, 100, 50);
        assert_eq!(set.count(Classification::Generic), 80);
        assert_eq!(set.count(Classification::Priority), 10);
        assert_eq!(set.count(Classification::Custom), 0);
        assert_eq!(set.shortfall, 10);
        // Oldest priority images go first.
        assert_eq!(set.images[80].digest(), "p0000");
    }

    #[test]
    fn test_priority_below_floor_untouched() {
        let p = partitions(10, 40, 890);
        let set = select(&p, 40, 50);
        assert_eq!(set.count(Classification::Generic), 10);
        assert_eq!(set.count(Classification::Priority), 0);
        assert_eq!(set.shortfall, 30);
    }

    #[test]
    fn test_priority_limited_by_remaining_excess() {
        let p = partitions(5, 100, 0);
        let set = select(&p, 8, 50);
        assert_eq!(set.count(Classification::Priority), 3);
        assert_eq!(set.shortfall, 0);
    }

    #[test]
    fn test_custom_only_repository() {
        let p = partitions(0, 0, 1000);
        let set = select(&p, 100, 50);
        assert!(set.is_empty());
        assert_eq!(set.shortfall, 100);
    }

    #[test]
    fn test_digests_are_unique() {
        let p = partitions(30, 0, 0);
        let set = select(&p, 30, 0);
        let digests = set.digests();
        let unique: HashSet<_> = digests.iter().collect();
        assert_eq!(unique.len(), digests.len());
    }
}
