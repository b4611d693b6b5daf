//! splat info command - display point cloud statistics.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;
use splat_clean::{AttributeTable, PlyCloud};

use crate::{Cli, OutputFormat, output};

#[derive(Serialize)]
struct CloudInfo {
    path: String,
    points: usize,
    encoding: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    bounds: Option<BoundsInfo>,
    properties: Vec<String>,
    has_color: bool,
    dropped_elements: Vec<String>,
    comments: Vec<String>,
}

#[derive(Serialize)]
struct BoundsInfo {
    min: [f64; 3],
    max: [f64; 3],
    dimensions: [f64; 3],
}

pub fn run(input: &Path, cli: &Cli) -> Result<()> {
    let cloud = PlyCloud::load(input)
        .with_context(|| format!("Failed to load point cloud from {:?}", input))?;

    let bounds = cloud.point_set().bounds().map(|b| BoundsInfo {
        min: [b.min.x, b.min.y, b.min.z],
        max: [b.max.x, b.max.y, b.max.z],
        dimensions: b.extent(),
    });

    let info = CloudInfo {
        path: input.display().to_string(),
        points: cloud.row_count(),
        encoding: format!("{:?}", cloud.encoding()),
        bounds,
        properties: cloud.property_names(),
        has_color: cloud.has_color(),
        dropped_elements: cloud.dropped_elements(),
        comments: cloud.comments().to_vec(),
    };

    match cli.format {
        OutputFormat::Json => output::print(&info, cli.format, cli.quiet),
        OutputFormat::Text => {
            if !cli.quiet {
                println!("{}", "Point Cloud Information".bold().underline());
                println!("  {}: {}", "File".cyan(), input.display());
                println!("  {}: {}", "Points".cyan(), info.points);
                println!("  {}: {}", "Encoding".cyan(), info.encoding);

                if let Some(ref b) = info.bounds {
                    println!(
                        "  {}: {:.4} x {:.4} x {:.4}",
                        "Dimensions".cyan(),
                        b.dimensions[0],
                        b.dimensions[1],
                        b.dimensions[2]
                    );
                    println!(
                        "  {}: ({:.4}, {:.4}, {:.4})",
                        "Min bounds".cyan(),
                        b.min[0],
                        b.min[1],
                        b.min[2]
                    );
                    println!(
                        "  {}: ({:.4}, {:.4}, {:.4})",
                        "Max bounds".cyan(),
                        b.max[0],
                        b.max[1],
                        b.max[2]
                    );
                }

                println!(
                    "  {}: {} ({})",
                    "Properties".cyan(),
                    info.properties.len(),
                    info.properties.join(", ")
                );
                println!(
                    "  {}: {}",
                    "Has colors".cyan(),
                    if info.has_color { "yes" } else { "no" }
                );
                if !info.dropped_elements.is_empty() {
                    println!(
                        "  {}: {}",
                        "Not carried on save".yellow(),
                        info.dropped_elements.join(", ")
                    );
                }
                for comment in &info.comments {
                    println!("  {}: {}", "Comment".dimmed(), comment);
                }
            }
        }
    }

    Ok(())
}
