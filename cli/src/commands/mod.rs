//! CLI command definitions and dispatch.

mod images;
mod prune;
mod version;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use image_reaper_core::RetentionConfig;
use image_reaper_runtime::{EcrRegistry, GitCheckout, RetentionEngine, RunContext};

/// Image Reaper: retention for CI-built container images.
#[derive(Parser)]
#[command(name = "image-reaper", version, about)]
pub struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Command {
    /// Delete images over the cap, oldest ordinary builds first
    Prune(prune::PruneArgs),
    /// List images with their retention class
    Images(images::ImagesArgs),
    /// Show version information
    Version(version::VersionArgs),
}

/// Repository, checkout and policy flags shared by commands that touch a
/// registry.
#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    /// Registry repository name
    #[arg(short, long, env = "IMAGE_REAPER_REPOSITORY")]
    pub repository: String,

    /// Registry region
    #[arg(long, env = "AWS_REGION", default_value = "us-east-1")]
    pub region: String,

    /// Account id owning the registry (defaults to the caller's account)
    #[arg(long, env = "IMAGE_REAPER_REGISTRY_ID")]
    pub registry_id: Option<String>,

    /// Path to a git checkout of the project the images are built from
    #[arg(short = 'C', long, env = "IMAGE_REAPER_CHECKOUT")]
    pub checkout: PathBuf,

    /// YAML retention config (default: ~/.image-reaper/config.yaml if present)
    #[arg(long, env = "IMAGE_REAPER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Maximum number of images to keep
    #[arg(long, env = "IMAGE_REAPER_MAX_IMAGES")]
    pub max_images: Option<usize>,

    /// Minimum number of priority images to keep
    #[arg(long, env = "IMAGE_REAPER_MIN_PRIORITY")]
    pub min_priority: Option<usize>,

    /// Tags never eligible for deletion (repeatable or comma-separated)
    #[arg(long, value_delimiter = ',', env = "IMAGE_REAPER_BLACKLIST")]
    pub blacklist: Vec<String>,

    /// Concurrent classification workers
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Timeout for each git query, in seconds
    #[arg(long)]
    pub oracle_timeout: Option<u64>,
}

impl TargetArgs {
    /// Load the config file and apply flag overrides, then validate.
    pub fn retention_config(&self) -> Result<RetentionConfig, Box<dyn std::error::Error>> {
        let mut config = RetentionConfig::load(self.config.as_deref())?;

        if let Some(max) = self.max_images {
            config.max_total_images = max;
        }
        if let Some(min) = self.min_priority {
            config.min_priority_floor = min;
        }
        config
            .blacklist
            .extend(self.blacklist.iter().map(|t| t.trim().to_string()));
        if let Some(concurrency) = self.concurrency {
            config.classify_concurrency = concurrency;
        }
        if let Some(timeout) = self.oracle_timeout {
            config.oracle_timeout_secs = timeout;
        }

        config.validate()?;
        Ok(config)
    }
}

/// Build the engine for one run: config first, then the checkout, then the
/// registry backend.
pub(crate) async fn open_engine(
    target: &TargetArgs,
) -> Result<RetentionEngine, Box<dyn std::error::Error>> {
    let config = target.retention_config()?;
    tracing::debug!(
        repository = %target.repository,
        checkout = %target.checkout.display(),
        max = config.max_total_images,
        floor = config.min_priority_floor,
        "Opening retention engine"
    );
    let checkout = GitCheckout::open(&target.checkout, config.oracle_timeout()).await?;

    let mut registry = EcrRegistry::new(&target.region);
    if let Some(ref id) = target.registry_id {
        registry = registry.with_registry_id(id);
    }

    let ctx = RunContext::new(
        &target.repository,
        config,
        Arc::new(registry),
        Arc::new(checkout),
    )?;
    Ok(RetentionEngine::new(ctx))
}

/// Dispatch a parsed CLI to the appropriate command handler.
pub async fn dispatch(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::Prune(args) => prune::execute(args).await,
        Command::Images(args) => images::execute(args).await,
        Command::Version(args) => version::execute(args).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    fn target(cli: Cli) -> TargetArgs {
        match cli.command {
            Command::Prune(args) => args.target,
            Command::Images(args) => args.target,
            Command::Version(_) => panic!("no target"),
        }
    }

    #[test]
    fn test_parse_prune() {
        let cli = parse(&[
            "image-reaper",
            "prune",
            "--repository",
            "app",
            "--region",
            "eu-west-1",
            "-C",
            "/src/app",
            "--dry-run",
        ]);
        let Command::Prune(ref args) = cli.command else {
            panic!("expected prune");
        };
        assert!(args.dry_run);
        assert_eq!(args.target.repository, "app");
        assert_eq!(args.target.region, "eu-west-1");
        assert_eq!(args.target.checkout, PathBuf::from("/src/app"));
    }

    #[test]
    fn test_parse_requires_repository() {
        let result = Cli::try_parse_from(["image-reaper", "prune", "-C", "/src/app"]);
        if std::env::var("IMAGE_REAPER_REPOSITORY").is_err() {
            assert!(result.is_err());
        }
    }

    #[test]
    fn test_retention_config_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "max_total_images: 500\nblacklist: [stable]\n").unwrap();

        let path_str = path.to_str().unwrap();
        let t = target(parse(&[
            "image-reaper",
            "images",
            "-r",
            "app",
            "-C",
            ".",
            "--config",
            path_str,
            "--min-priority",
            "20",
            "--blacklist",
            "latest,release",
        ]));

        let config = t.retention_config().unwrap();
        assert_eq!(config.max_total_images, 500);
        assert_eq!(config.min_priority_floor, 20);
        assert!(config.is_blacklisted("stable"));
        assert!(config.is_blacklisted("latest"));
        assert!(config.is_blacklisted("release"));
    }

    #[test]
    fn test_retention_config_rejects_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "{}\n").unwrap();

        let t = target(parse(&[
            "image-reaper",
            "prune",
            "-r",
            "app",
            "-C",
            ".",
            "--config",
            path.to_str().unwrap(),
            "--max-images",
            "10",
            "--min-priority",
            "50",
        ]));

        let err = t.retention_config().unwrap_err();
        assert!(err.to_string().contains("min_priority_floor"));
    }
}
