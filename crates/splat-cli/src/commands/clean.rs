//! splat clean command - run the pipeline and save the surviving rows.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use splat_clean::{
    AttributeTable, CleanConfig, CleanOutput, Pipeline, PlyCloud, Preset, PresetStore, Progress,
    ProgressCallback, StepOutcome, save_gs_preserving, save_preview,
};
use tracing::{debug, info};

use crate::commands::presets::DEFAULT_PRESETS_FILE;
use crate::{Cli, OutputFormat, output};

#[derive(Args, Debug, Clone)]
pub struct CleanArgs {
    /// Input PLY file
    pub input: PathBuf,

    /// Output PLY file (all attributes of the kept rows)
    pub output: PathBuf,

    /// Pipeline configuration (TOML); flags override it
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Voxel size for downsampling (> 0 enables it; needs --no-gs-mode)
    #[arg(long)]
    pub voxel_size: Option<f64>,

    /// Enable radius outlier removal
    #[arg(long)]
    pub radius_outlier: bool,

    /// Minimum neighbours within --radius
    #[arg(long)]
    pub radius_nb: Option<usize>,

    /// Neighbourhood radius for radius outlier removal
    #[arg(long)]
    pub radius: Option<f64>,

    /// Enable statistical outlier removal
    #[arg(long)]
    pub stat_outlier: bool,

    /// Neighbours used for the mean distance
    #[arg(long)]
    pub stat_nb: Option<usize>,

    /// Standard deviation multiplier
    #[arg(long)]
    pub stat_std: Option<f64>,

    /// Keep only the largest density cluster
    #[arg(long)]
    pub dbscan: bool,

    /// Cluster neighbourhood radius
    #[arg(long)]
    pub eps: Option<f64>,

    /// Minimum neighbours for a core point
    #[arg(long)]
    pub min_points: Option<usize>,

    /// Crop to an axis-aligned box (requires all six bounds)
    #[arg(long, requires_all = ["min_x", "min_y", "min_z", "max_x", "max_y", "max_z"])]
    pub crop: bool,

    #[arg(long, allow_hyphen_values = true)]
    pub min_x: Option<f64>,
    #[arg(long, allow_hyphen_values = true)]
    pub min_y: Option<f64>,
    #[arg(long, allow_hyphen_values = true)]
    pub min_z: Option<f64>,
    #[arg(long, allow_hyphen_values = true)]
    pub max_x: Option<f64>,
    #[arg(long, allow_hyphen_values = true)]
    pub max_y: Option<f64>,
    #[arg(long, allow_hyphen_values = true)]
    pub max_z: Option<f64>,

    /// Allow steps that break the 1:1 row mapping (voxel downsampling)
    #[arg(long)]
    pub no_gs_mode: bool,

    /// Fill parameters still at their defaults from a saved preset
    #[arg(long)]
    pub preset: Option<String>,

    /// Save the effective parameters under this preset name
    #[arg(long)]
    pub save_preset: Option<String>,

    /// Preset store
    #[arg(long, default_value = DEFAULT_PRESETS_FILE)]
    pub presets_file: PathBuf,

    /// Also write a coordinates-and-colour preview here
    #[arg(long)]
    pub preview_output: Option<PathBuf>,
}

#[derive(Serialize)]
struct StepReport {
    step: &'static str,
    outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
    before: usize,
    after: usize,
}

#[derive(Serialize)]
struct CleanReport {
    input: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    preview: Option<String>,
    initial: usize,
    r#final: usize,
    removed: usize,
    removed_percent: f64,
    mapping_valid: bool,
    elapsed_ms: f64,
    steps: Vec<StepReport>,
}

impl CleanReport {
    fn new(input: &Path, result: &CleanOutput) -> Self {
        let steps = result
            .log
            .iter()
            .map(|record| {
                let (outcome, reason) = match &record.outcome {
                    StepOutcome::Applied => ("applied", None),
                    StepOutcome::NoOp(r) => ("no_op", Some(r.clone())),
                    StepOutcome::Rejected(r) => ("rejected", Some(r.clone())),
                    StepOutcome::Skipped(r) => ("skipped", Some(r.clone())),
                };
                StepReport {
                    step: record.kind.label(),
                    outcome,
                    reason,
                    before: record.before,
                    after: record.after,
                }
            })
            .collect();

        Self {
            input: input.display().to_string(),
            output: None,
            preview: None,
            initial: result.initial_count,
            r#final: result.final_count(),
            removed: result.removed_count(),
            removed_percent: result.removed_percent(),
            mapping_valid: result.mapping_valid,
            elapsed_ms: result.elapsed.as_secs_f64() * 1000.0,
            steps,
        }
    }
}

/// Layer the configuration: file (or defaults), then preset values for
/// whatever is still at its default, then explicit flags.
///
/// Flags are applied last so an explicit value always wins, even one that
/// happens to equal the built-in default.
pub fn build_config(args: &CleanArgs) -> Result<CleanConfig> {
    let mut config = match &args.config {
        Some(path) => CleanConfig::from_toml_file(path)
            .with_context(|| format!("Failed to load configuration from {:?}", path))?,
        None => CleanConfig::default(),
    };

    if let Some(name) = &args.preset {
        let store = PresetStore::load(&args.presets_file)?;
        config = store.get(name)?.fill_defaults(&config);
        debug!(preset = %name, "Preset applied");
    }

    if let Some(size) = args.voxel_size {
        config.voxel.enabled = size > 0.0;
        config.voxel.voxel_size = size;
    }

    config.radius_outlier.enabled |= args.radius_outlier;
    if let Some(nb) = args.radius_nb {
        config.radius_outlier.nb_points = nb;
    }
    if let Some(radius) = args.radius {
        config.radius_outlier.radius = radius;
    }

    config.statistical_outlier.enabled |= args.stat_outlier;
    if let Some(nb) = args.stat_nb {
        config.statistical_outlier.nb_neighbors = nb;
    }
    if let Some(std) = args.stat_std {
        config.statistical_outlier.std_ratio = std;
    }

    config.largest_cluster.enabled |= args.dbscan;
    if let Some(eps) = args.eps {
        config.largest_cluster.eps = eps;
    }
    if let Some(min_points) = args.min_points {
        config.largest_cluster.min_points = min_points;
    }

    if args.crop
        && let (Some(min_x), Some(min_y), Some(min_z), Some(max_x), Some(max_y), Some(max_z)) = (
            args.min_x, args.min_y, args.min_z, args.max_x, args.max_y, args.max_z,
        )
    {
        config.crop.enabled = true;
        config.crop.min = [min_x, min_y, min_z];
        config.crop.max = [max_x, max_y, max_z];
    }

    if args.no_gs_mode {
        config.gs_mode = false;
    }

    Ok(config)
}

pub fn run(args: &CleanArgs, cli: &Cli) -> Result<()> {
    let config = build_config(args)?;

    if let Some(name) = &args.save_preset {
        let mut store = PresetStore::load(&args.presets_file)?;
        store.insert(name.clone(), Preset::from_config(&config));
        store.save(&args.presets_file)?;
        output::success(
            &format!("Preset '{}' saved to {}", name, args.presets_file.display()),
            cli.format,
            cli.quiet,
        );
    }

    if !config.any_enabled() {
        output::warning(
            "No filters enabled; output will be a copy of the input",
            cli.format,
            cli.quiet,
        );
    }

    info!(
        input = %args.input.display(),
        output = %args.output.display(),
        gs_mode = config.gs_mode,
        "Starting clean"
    );

    let cloud = PlyCloud::load(&args.input)
        .with_context(|| format!("Failed to load point cloud from {:?}", args.input))?;

    let show_progress = !cli.quiet && cli.format == OutputFormat::Text;
    let callback: ProgressCallback = Box::new(move |p: &Progress| {
        if show_progress {
            eprintln!("  [{}/{}] {}", p.current, p.total, p.message);
        }
        true
    });

    let result = Pipeline::new(config).run_with_progress(&cloud.point_set(), Some(&callback));
    let mut report = CleanReport::new(&args.input, &result);

    if cli.format == OutputFormat::Text && !cli.quiet {
        println!("{}", "Clean Summary".bold().underline());
        println!("{result}");
    }
    result.require_complete()?;

    // The preview does not need the row mapping, so it is written first
    if let Some(preview) = &args.preview_output {
        save_preview(&result.points, &cloud, preview)
            .with_context(|| format!("Failed to save preview to {:?}", preview))?;
        report.preview = Some(preview.display().to_string());
        output::success(
            &format!("Preview saved to {}", preview.display()),
            cli.format,
            cli.quiet,
        );
    }

    if !result.mapping_valid {
        output::print(&report, cli.format, cli.quiet);
    }
    let written = save_gs_preserving(&cloud, &result, &args.output)?;
    report.output = Some(args.output.display().to_string());
    info!(
        written,
        removed = result.removed_count(),
        "Clean finished"
    );

    match cli.format {
        OutputFormat::Json => output::print(&report, cli.format, cli.quiet),
        OutputFormat::Text => {
            output::success(
                &format!(
                    "Saved {} of {} rows with all attributes to {}",
                    written,
                    cloud.row_count(),
                    args.output.display()
                ),
                cli.format,
                cli.quiet,
            );
            let dropped = cloud.dropped_elements();
            if !dropped.is_empty() {
                output::warning(
                    &format!("Dropped non-vertex elements: {}", dropped.join(", ")),
                    cli.format,
                    cli.quiet,
                );
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: CleanArgs,
    }

    fn parse(extra: &[&str]) -> CleanArgs {
        let mut argv = vec!["clean", "in.ply", "out.ply"];
        argv.extend_from_slice(extra);
        Harness::try_parse_from(argv).unwrap().args
    }

    #[test]
    fn test_flags_override_defaults() {
        let args = parse(&[
            "--radius-outlier",
            "--radius",
            "0.5",
            "--dbscan",
            "--min-points",
            "12",
            "--crop",
            "--min-x",
            "-1",
            "--min-y",
            "-2",
            "--min-z",
            "-3",
            "--max-x",
            "1",
            "--max-y",
            "2",
            "--max-z",
            "3",
        ]);
        let config = build_config(&args).unwrap();

        assert!(config.radius_outlier.enabled);
        assert_eq!(config.radius_outlier.radius, 0.5);
        assert_eq!(config.radius_outlier.nb_points, 16);
        assert!(config.largest_cluster.enabled);
        assert_eq!(config.largest_cluster.min_points, 12);
        assert!(config.crop.enabled);
        assert_eq!(config.crop.min, [-1.0, -2.0, -3.0]);
        assert!(config.gs_mode);
        assert!(!config.voxel.enabled);
    }

    #[test]
    fn test_voxel_size_enables_voxel() {
        let config = build_config(&parse(&["--voxel-size", "0.1", "--no-gs-mode"])).unwrap();
        assert!(config.voxel.enabled);
        assert!(!config.gs_mode);
    }

    #[test]
    fn test_preset_fills_only_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store_path = dir.path().join("presets.json");
        let mut store = PresetStore::new();
        store.insert(
            "scan",
            Preset {
                stat_outlier: Some(true),
                stat_std: Some(3.0),
                eps: Some(0.2),
                ..Preset::default()
            },
        );
        store.save(&store_path).unwrap();

        let store_arg = store_path.to_str().unwrap();
        let args = parse(&["--preset", "scan", "--presets-file", store_arg, "--eps", "0.7"]);
        let config = build_config(&args).unwrap();

        assert!(config.statistical_outlier.enabled);
        assert_eq!(config.statistical_outlier.std_ratio, 3.0);
        // Explicit flag wins over the preset
        assert_eq!(config.largest_cluster.eps, 0.7);
    }

    #[test]
    fn test_explicit_zero_crop_bounds_beat_preset() {
        let dir = tempfile::tempdir().unwrap();
        let store_path = dir.path().join("presets.json");
        let mut store = PresetStore::new();
        store.insert(
            "box",
            Preset {
                crop: Some(true),
                min_x: Some(-5.0),
                min_y: Some(-5.0),
                min_z: Some(-5.0),
                max_x: Some(5.0),
                max_y: Some(5.0),
                max_z: Some(5.0),
                ..Preset::default()
            },
        );
        store.save(&store_path).unwrap();

        let args = parse(&[
            "--crop",
            "--min-x",
            "0",
            "--min-y",
            "0",
            "--min-z",
            "0",
            "--max-x",
            "1",
            "--max-y",
            "1",
            "--max-z",
            "1",
            "--preset",
            "box",
            "--presets-file",
            store_path.to_str().unwrap(),
        ]);
        let config = build_config(&args).unwrap();

        assert!(config.crop.enabled);
        assert_eq!(config.crop.min, [0.0, 0.0, 0.0]);
        assert_eq!(config.crop.max, [1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_preset_crop_used_without_flags() {
        let dir = tempfile::tempdir().unwrap();
        let store_path = dir.path().join("presets.json");
        let mut store = PresetStore::new();
        store.insert(
            "box",
            Preset {
                crop: Some(true),
                min_x: Some(-5.0),
                max_x: Some(5.0),
                ..Preset::default()
            },
        );
        store.save(&store_path).unwrap();

        let args = parse(&["--preset", "box", "--presets-file", store_path.to_str().unwrap()]);
        let config = build_config(&args).unwrap();

        assert!(config.crop.enabled);
        assert_eq!(config.crop.min[0], -5.0);
        assert_eq!(config.crop.max[0], 5.0);
    }

    #[test]
    fn test_unknown_preset_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store_arg = dir.path().join("none.json");
        let args = parse(&[
            "--preset",
            "nope",
            "--presets-file",
            store_arg.to_str().unwrap(),
        ]);
        let err = build_config(&args).unwrap_err();
        assert!(err.downcast_ref::<splat_clean::CleanError>().is_some());
    }
}
