//! `image-reaper images` command.

use clap::{Args, ValueEnum};
use image_reaper_core::{ClassCounts, Classification};

use crate::output;

use super::TargetArgs;

#[derive(Args, Debug)]
pub struct ImagesArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Only show images of this class
    #[arg(long, value_enum)]
    pub class: Option<ClassFilter>,

    /// Only show image digests (one per line)
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ClassFilter {
    Generic,
    Priority,
    Custom,
}

impl From<ClassFilter> for Classification {
    fn from(filter: ClassFilter) -> Self {
        match filter {
            ClassFilter::Generic => Classification::Generic,
            ClassFilter::Priority => Classification::Priority,
            ClassFilter::Custom => Classification::Custom,
        }
    }
}

pub async fn execute(args: ImagesArgs) -> Result<(), Box<dyn std::error::Error>> {
    let engine = super::open_engine(&args.target).await?;
    let mut images = engine.classify().await?;
    images.sort_by(|a, b| b.record.pushed_at.cmp(&a.record.pushed_at));

    let counts = ClassCounts::from_images(&images);
    if let Some(filter) = args.class {
        let class = Classification::from(filter);
        images.retain(|i| i.classification == class);
    }

    if args.quiet {
        for image in &images {
            println!("{}", image.record.digest);
        }
        return Ok(());
    }

    let mut table = output::new_table(&["DIGEST", "TAGS", "CLASS", "PUSHED"]);
    for image in &images {
        let class = if image.unclassified_tags.is_empty() {
            image.classification.to_string()
        } else {
            format!("{} (unverified)", image.classification)
        };
        table.add_row(vec![
            output::short_digest(&image.record.digest),
            image.record.tag_list(),
            class,
            output::format_ago(&image.record.pushed_at),
        ]);
    }
    println!("{table}");
    println!(
        "{} image(s): {} generic, {} priority, {} custom",
        counts.total(),
        counts.generic,
        counts.priority,
        counts.custom
    );

    Ok(())
}
