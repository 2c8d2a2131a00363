//! Retention run pipeline.
//!
//! ```text
//! list_images ─► CommitClassifier ─► partition ─► select ─► BatchDeleter
//!   (pages)       (bounded pool,      (pure)       (pure)     (chunks of 100)
//!                  join barrier)
//! ```
//!
//! All run state lives in a [`RunContext`] built for one run and dropped
//! afterwards.

use std::sync::Arc;

use image_reaper_core::error::Result;
use image_reaper_core::{ClassCounts, ClassifiedImage, Classification, RetentionConfig};
use serde::Serialize;

use crate::classify::{CommitClassifier, CommitOracle};
use crate::delete::{BatchDeleter, DeletionReport};
use crate::registry::{list_images, ImageRegistry};
use crate::retention::{excess, partition, select, EvictionSet};

/// Everything one retention run needs, passed explicitly.
pub struct RunContext {
    pub repository: String,
    pub config: RetentionConfig,
    pub registry: Arc<dyn ImageRegistry>,
    pub oracle: Arc<dyn CommitOracle>,
}

impl RunContext {
    /// Build a context, validating the retention config first.
    pub fn new(
        repository: impl Into<String>,
        config: RetentionConfig,
        registry: Arc<dyn ImageRegistry>,
        oracle: Arc<dyn CommitOracle>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            repository: repository.into(),
            config,
            registry,
            oracle,
        })
    }
}

/// What a run intends to delete and why.
#[derive(Debug, Clone, Serialize)]
pub struct RetentionPlan {
    pub repository: String,
    pub total_images: usize,
    pub max_total_images: usize,
    pub min_priority_floor: usize,
    pub excess: usize,
    /// Per-class counts; `None` when the repository is under the cap and
    /// classification was skipped
    pub before: Option<ClassCounts>,
    /// Images protected by a blacklisted tag
    pub protected: usize,
    /// Images whose tags could not be checked against git
    pub unclassified: usize,
    pub eviction: EvictionSet,
}

impl RetentionPlan {
    /// Per-class counts once the eviction set is removed.
    pub fn after(&self) -> Option<ClassCounts> {
        self.before.map(|before| ClassCounts {
            generic: before.generic - self.eviction.count(Classification::Generic),
            priority: before.priority - self.eviction.count(Classification::Priority),
            custom: before.custom - self.eviction.count(Classification::Custom),
        })
    }

    pub fn is_noop(&self) -> bool {
        self.eviction.is_empty()
    }
}

/// Plan plus what deletion did with it.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub plan: RetentionPlan,
    pub dry_run: bool,
    pub deletion: Option<DeletionReport>,
}

/// Runs the retention pipeline for one repository.
pub struct RetentionEngine {
    ctx: RunContext,
    classifier: CommitClassifier,
}

impl RetentionEngine {
    pub fn new(ctx: RunContext) -> Self {
        let classifier = CommitClassifier::new(ctx.oracle.clone(), ctx.config.classify_concurrency);
        Self { ctx, classifier }
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    /// List and classify every image, without selecting anything.
    pub async fn classify(&self) -> Result<Vec<ClassifiedImage>> {
        let images = list_images(self.ctx.registry.as_ref(), &self.ctx.repository).await?;
        Ok(self.classifier.classify_all(images).await)
    }

    /// List, classify and select. Deletes nothing.
    pub async fn plan(&self) -> Result<RetentionPlan> {
        let repository = &self.ctx.repository;
        let config = &self.ctx.config;

        let images = list_images(self.ctx.registry.as_ref(), repository).await?;
        let total_images = images.len();
        let excess = excess(total_images, config.max_total_images);

        let mut plan = RetentionPlan {
            repository: repository.clone(),
            total_images,
            max_total_images: config.max_total_images,
            min_priority_floor: config.min_priority_floor,
            excess,
            before: None,
            protected: 0,
            unclassified: 0,
            eviction: EvictionSet::default(),
        };

        if excess == 0 {
            tracing::info!(
                repository = %repository,
                total = total_images,
                max = config.max_total_images,
                "Repository is within its image cap"
            );
            return Ok(plan);
        }

        let classified = self.classifier.classify_all(images).await;
        plan.unclassified = classified
            .iter()
            .filter(|i| !i.unclassified_tags.is_empty())
            .count();

        let partitions = partition(classified, config);
        plan.before = Some(partitions.counts());
        plan.protected = partitions.protected.len();
        plan.eviction = select(&partitions, excess, config.min_priority_floor);

        tracing::info!(
            repository = %repository,
            total = total_images,
            excess,
            generic = partitions.generic.len(),
            priority = partitions.priority.len(),
            custom = partitions.custom.len(),
            protected = plan.protected,
            selected = plan.eviction.len(),
            "Computed retention plan"
        );

        Ok(plan)
    }

    /// Delete the images a plan selected.
    pub async fn execute(&self, plan: &RetentionPlan) -> Result<DeletionReport> {
        let deleter = BatchDeleter::new(self.ctx.registry.clone());
        deleter
            .delete_all(&self.ctx.repository, &plan.eviction.digests())
            .await
    }

    /// Carry out a plan: delete its eviction set unless `dry_run` or the
    /// plan selects nothing.
    ///
    /// On failure the plan is still owned by the caller, so it can be
    /// reported alongside the error.
    pub async fn apply(&self, plan: &RetentionPlan, dry_run: bool) -> Result<RunReport> {
        let deletion = if dry_run || plan.is_noop() {
            None
        } else {
            Some(self.execute(plan).await?)
        };

        Ok(RunReport {
            plan: plan.clone(),
            dry_run,
            deletion,
        })
    }

    /// Plan and, unless `dry_run`, delete.
    pub async fn run(&self, dry_run: bool) -> Result<RunReport> {
        let plan = self.plan().await?;
        self.apply(&plan, dry_run).await
    }
}
