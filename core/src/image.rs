//! Image records and retention classes.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single image as listed by the registry.
///
/// The digest is the identity; tags are aliases and one digest may carry
/// several of them (e.g. a commit sha and a release tag).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    /// Content digest (e.g., "sha256:abc123...")
    pub digest: String,
    /// Tags pointing at this digest
    pub tags: BTreeSet<String>,
    /// When the image was pushed
    pub pushed_at: DateTime<Utc>,
}

impl ImageRecord {
    pub fn new<I, S>(digest: impl Into<String>, tags: I, pushed_at: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            digest: digest.into(),
            tags: tags.into_iter().map(Into::into).collect(),
            pushed_at,
        }
    }

    /// Tags joined for display, or `<none>` for an untagged image.
    pub fn tag_list(&self) -> String {
        if self.tags.is_empty() {
            "<none>".to_string()
        } else {
            self.tags.iter().cloned().collect::<Vec<_>>().join(",")
        }
    }
}

/// Retention class of an image.
///
/// Variants are ordered by precedence, so the class of a multi-tag image is
/// the maximum over its tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    /// Ordinary commit
    Generic,
    /// Tag that does not resolve to any known commit
    Custom,
    /// Merge commit or tag
    Priority,
}

impl Classification {
    /// Resolve the class of an image from the classes of its tags.
    ///
    /// An image with no tags cannot be vouched for and is `Custom`.
    pub fn resolve<I>(classes: I) -> Self
    where
        I: IntoIterator<Item = Classification>,
    {
        classes.into_iter().max().unwrap_or(Classification::Custom)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Generic => "generic",
            Classification::Custom => "custom",
            Classification::Priority => "priority",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An image together with its resolved class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedImage {
    pub record: ImageRecord,
    pub classification: Classification,
    /// Tags the oracle could not answer for. Non-empty forces `Custom`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unclassified_tags: Vec<String>,
}

impl ClassifiedImage {
    pub fn new(record: ImageRecord, classification: Classification) -> Self {
        Self {
            record,
            classification,
            unclassified_tags: Vec::new(),
        }
    }

    pub fn digest(&self) -> &str {
        &self.record.digest
    }
}

/// Per-class image counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassCounts {
    pub generic: usize,
    pub priority: usize,
    pub custom: usize,
}

impl ClassCounts {
    pub fn from_images<'a, I>(images: I) -> Self
    where
        I: IntoIterator<Item = &'a ClassifiedImage>,
    {
        let mut counts = Self::default();
        for image in images {
            counts.add(image.classification);
        }
        counts
    }

    pub fn add(&mut self, classification: Classification) {
        match classification {
            Classification::Generic => self.generic += 1,
            Classification::Priority => self.priority += 1,
            Classification::Custom => self.custom += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.generic + self.priority + self.custom
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_precedence() {
        use Classification::*;
        assert_eq!(Classification::resolve([Generic]), Generic);
        assert_eq!(Classification::resolve([Generic, Custom]), Custom);
        assert_eq!(Classification::resolve([Custom, Priority]), Priority);
        assert_eq!(Classification::resolve([Generic, Priority, Custom]), Priority);
    }

    #[test]
    fn test_resolve_untagged_is_custom() {
        assert_eq!(Classification::resolve([]), Classification::Custom);
    }

    #[test]
    fn test_classification_serde() {
        let json = serde_json::to_string(&Classification::Priority).unwrap();
        assert_eq!(json, "\"priority\"");
        let parsed: Classification = serde_json::from_str("\"generic\"").unwrap();
        assert_eq!(parsed, Classification::Generic);
    }

    #[test]
    fn test_tag_list() {
        let now = Utc::now();
        let image = ImageRecord::new("sha256:aa", ["v1.0.0", "abc123"], now);
        assert_eq!(image.tag_list(), "abc123,v1.0.0");

        let untagged = ImageRecord::new("sha256:bb", Vec::<String>::new(), now);
        assert_eq!(untagged.tag_list(), "<none>");
    }

    #[test]
    fn test_class_counts() {
        let now = Utc::now();
        let images = vec![
            ClassifiedImage::new(ImageRecord::new("a", ["a"], now), Classification::Generic),
            ClassifiedImage::new(ImageRecord::new("b", ["b"], now), Classification::Generic),
            ClassifiedImage::new(ImageRecord::new("c", ["c"], now), Classification::Priority),
            ClassifiedImage::new(ImageRecord::new("d", ["d"], now), Classification::Custom),
        ];
        let counts = ClassCounts::from_images(&images);
        assert_eq!(
            counts,
            ClassCounts {
                generic: 2,
                priority: 1,
                custom: 1
            }
        );
        assert_eq!(counts.total(), 4);
    }
}
