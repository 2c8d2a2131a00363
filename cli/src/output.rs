//! Table and summary formatting for CLI output.

use comfy_table::{ContentArrangement, Table};
use image_reaper_core::ClassCounts;
use image_reaper_runtime::RetentionPlan;

/// Create a styled table with the given headers.
pub fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.load_preset(comfy_table::presets::NOTHING);
    table.set_header(headers);
    table
}

/// Format a chrono timestamp as a relative "ago" string.
pub fn format_ago(dt: &chrono::DateTime<chrono::Utc>) -> String {
    format_ago_from(dt, chrono::Utc::now())
}

fn format_ago_from(
    dt: &chrono::DateTime<chrono::Utc>,
    now: chrono::DateTime<chrono::Utc>,
) -> String {
    let duration = now.signed_duration_since(*dt);

    let secs = duration.num_seconds();
    if secs < 0 {
        return "just now".to_string();
    }

    if secs < 60 {
        return format!("{secs} seconds ago");
    }

    let mins = duration.num_minutes();
    if mins < 60 {
        return format!("{mins} minutes ago");
    }

    let hours = duration.num_hours();
    if hours < 24 {
        return format!("{hours} hours ago");
    }

    let days = duration.num_days();
    if days < 30 {
        return format!("{days} days ago");
    }

    let months = days / 30;
    if months < 12 {
        return format!("{months} months ago");
    }

    let years = days / 365;
    format!("{years} years ago")
}

/// Shorten a digest to "sha256:" plus the first 12 hex chars.
pub fn short_digest(digest: &str) -> String {
    match digest.strip_prefix("sha256:") {
        Some(hex) => format!("sha256:{}", hex.chars().take(12).collect::<String>()),
        None => digest.chars().take(12).collect(),
    }
}

fn counts_row(label: &str, counts: &ClassCounts) -> Vec<String> {
    vec![
        label.to_string(),
        counts.generic.to_string(),
        counts.priority.to_string(),
        counts.custom.to_string(),
        counts.total().to_string(),
    ]
}

/// Print a human-readable summary of a retention plan.
pub fn print_plan(plan: &RetentionPlan) {
    println!(
        "Repository {}: {} image(s), cap {}, priority floor {}",
        plan.repository, plan.total_images, plan.max_total_images, plan.min_priority_floor
    );

    let (before, after) = match (plan.before, plan.after()) {
        (Some(before), Some(after)) => (before, after),
        _ => {
            println!("No images to delete, repository is within its cap");
            return;
        }
    };

    let mut table = new_table(&["", "GENERIC", "PRIORITY", "CUSTOM", "TOTAL"]);
    table.add_row(counts_row("before", &before));
    table.add_row(counts_row("after", &after));
    println!("{table}");

    if plan.protected > 0 {
        println!("{} image(s) protected by blacklisted tags", plan.protected);
    }
    if plan.unclassified > 0 {
        println!(
            "{} image(s) could not be classified and were kept",
            plan.unclassified
        );
    }

    if plan.eviction.is_empty() {
        println!("No images eligible for deletion");
    } else {
        let mut table = new_table(&["DIGEST", "TAGS", "CLASS", "PUSHED"]);
        for image in &plan.eviction.images {
            table.add_row(vec![
                short_digest(&image.record.digest),
                image.record.tag_list(),
                image.classification.to_string(),
                format_ago(&image.record.pushed_at),
            ]);
        }
        println!("{table}");
    }

    if plan.eviction.shortfall > 0 {
        println!(
            "{} image(s) remain over the cap; only generic images and priority images \
             above the floor are evicted",
            plan.eviction.shortfall
        );
    }
}
