//! `image-reaper prune` command: evict images over the repository cap.

use clap::Args;
use image_reaper_core::ReaperError;
use image_reaper_runtime::{RetentionPlan, RunReport};

use crate::output;

use super::TargetArgs;

#[derive(Args, Debug)]
pub struct PruneArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Show what would be deleted without deleting anything
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Print the run report as JSON instead of tables
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(args: PruneArgs) -> Result<(), Box<dyn std::error::Error>> {
    let engine = super::open_engine(&args.target).await?;
    let plan = engine.plan().await?;

    if !args.json {
        output::print_plan(&plan);
    }

    let report = match engine.apply(&plan, args.dry_run).await {
        Ok(report) => report,
        Err(e) => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&failure_report(&plan, &e))?);
            } else if e.removed_count() > 0 {
                eprintln!(
                    "Deleted {} of {} image(s) before the failure",
                    e.removed_count(),
                    plan.eviction.len()
                );
            }
            return Err(e.into());
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_outcome(&report);
    }
    Ok(())
}

/// JSON body for a run whose deletion failed part way.
fn failure_report(plan: &RetentionPlan, err: &ReaperError) -> serde_json::Value {
    serde_json::json!({
        "plan": plan,
        "dry_run": false,
        "deletion": null,
        "removed": err.removed_count(),
        "error": err.to_string(),
    })
}

fn print_outcome(report: &RunReport) {
    match report.deletion {
        Some(ref deletion) => {
            if deletion.already_absent > 0 {
                println!(
                    "{} image(s) were already gone from the registry",
                    deletion.already_absent
                );
            }
            println!(
                "Deleted {} image(s) in {} batch(es)",
                deletion.removed, deletion.batches
            );
        }
        None if report.dry_run && !report.plan.is_noop() => {
            println!("Dry run: would delete {} image(s)", report.plan.eviction.len());
        }
        None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image_reaper_runtime::EvictionSet;

    fn plan() -> RetentionPlan {
        RetentionPlan {
            repository: "app".to_string(),
            total_images: 1000,
            max_total_images: 900,
            min_priority_floor: 50,
            excess: 100,
            before: None,
            protected: 0,
            unclassified: 0,
            eviction: EvictionSet::default(),
        }
    }

    #[test]
    fn test_failure_report_keeps_plan_and_removed_count() {
        let err = ReaperError::PartialDeletion {
            repository: "app".to_string(),
            removed: 200,
            requested: 250,
            message: "ThrottlingException".to_string(),
        };

        let body = failure_report(&plan(), &err);
        assert_eq!(body["plan"]["repository"], "app");
        assert_eq!(body["plan"]["excess"], 100);
        assert_eq!(body["removed"], 200);
        assert!(body["deletion"].is_null());
        assert!(body["error"].as_str().unwrap().contains("ThrottlingException"));
    }

    #[test]
    fn test_failure_report_before_any_removal() {
        let err = ReaperError::RegistryError {
            repository: "app".to_string(),
            message: "AccessDenied".to_string(),
        };

        let body = failure_report(&plan(), &err);
        assert_eq!(body["removed"], 0);
        assert!(body["error"].as_str().unwrap().contains("AccessDenied"));
    }
}
