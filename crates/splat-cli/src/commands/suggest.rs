//! splat suggest command - estimate filter parameters from point spacing.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;
use splat_clean::{AdvisorParams, ParameterAdvisor, PlyCloud};

use crate::{Cli, OutputFormat, output};

#[derive(Serialize)]
struct SuggestResult {
    input: String,
    sampled: usize,
    median_distance: f64,
    radius: f64,
    eps: f64,
    min_points: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
}

pub fn run(
    input: &Path,
    sample_size: usize,
    k: usize,
    seed: Option<u64>,
    cli: &Cli,
) -> Result<()> {
    let cloud = PlyCloud::load(input)
        .with_context(|| format!("Failed to load point cloud from {:?}", input))?;

    let advisor = ParameterAdvisor::new(AdvisorParams {
        sample_size,
        k,
        seed,
    })?;
    let suggestion = advisor.suggest(&cloud.point_set())?;

    let result = SuggestResult {
        input: input.display().to_string(),
        sampled: suggestion.sampled,
        median_distance: suggestion.median_distance,
        radius: suggestion.radius,
        eps: suggestion.eps,
        min_points: suggestion.min_points,
        seed,
    };

    match cli.format {
        OutputFormat::Json => output::print(&result, cli.format, cli.quiet),
        OutputFormat::Text => {
            if !cli.quiet {
                println!("{}", "Suggested Parameters".bold().underline());
                println!("  {}: {}", "Sampled points".cyan(), result.sampled);
                println!(
                    "  {}: {:.6}",
                    "Median NN distance".cyan(),
                    result.median_distance
                );
                println!("  {}: {:.6}", "Radius".cyan(), result.radius);
                println!("  {}: {:.6}", "Eps".cyan(), result.eps);
                println!("  {}: {}", "Min points".cyan(), result.min_points);
                println!(
                    "\n  {} --radius {:.6} --eps {:.6} --min-points {}",
                    "Flags:".dimmed(),
                    result.radius,
                    result.eps,
                    result.min_points
                );
            }
        }
    }

    Ok(())
}
