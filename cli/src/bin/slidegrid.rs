use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use slidegrid::output_format::OutputFormat;
use slidegrid::partition::{PatchGrid, TaskConfig};
use slidegrid::run_log::{
    assignment_log_name, tiling_log_name, timestamp_now, AssignmentLogContext, RunLog,
    TilingLogContext,
};
use slidegrid::tile_grid::DEFAULT_PATCH_SIZE;
use slidegrid::tiler::{check_output_dir, Tiler, TilerConfig, DEFAULT_EMPTY_CHECK_LEVEL};
use slidegrid_cli::slide_utils::{open_slide, write_manifest, write_run_log, ArgRegion};

#[derive(Debug, Parser)]
#[command(name = "slidegrid")]
#[command(about = "Slidegrid - Cut whole slide images into patches and group them into annotation tasks", long_about = None)]
struct SlidegridCli {
    #[command(subcommand)]
    command: SlidegridCommands,
}

#[derive(Debug, Subcommand)]
enum SlidegridCommands {
    /// cut a slide into fixed-size patches, skipping empty ones
    Tile(TileArgs),
    /// group patches of a folder into tasks by row and column ranges
    Assign(AssignArgs),
}

#[derive(Debug, Args)]
struct TileArgs {
    #[arg(long, value_name = "SLIDE")]
    /// path of the slide image
    slide: PathBuf,
    #[arg(long, value_name = "PREFIX")]
    /// prefix of the patch file names and name of the created output folder
    prefix: String,
    #[arg(long, value_name = "DIR")]
    /// existing directory the output folder is created in
    outdir: PathBuf,
    #[arg(long, default_value_t = DEFAULT_PATCH_SIZE)]
    /// side length of a patch in pixels
    patch_size: u32,
    #[arg(long, default_value = "JPEG")]
    /// one of JPEG, JPEG-low, TIFF, PNG
    format: OutputFormat,
    #[arg(long, default_value_t = DEFAULT_EMPTY_CHECK_LEVEL)]
    /// pyramid level used to detect empty patches
    empty_check_level: u32,
    #[arg(long, value_name = "LEFT,TOP,RIGHT,BOTTOM")]
    /// only tile this area of the slide
    region: Option<ArgRegion>,
    #[arg(long, default_value = ".")]
    /// directory for the run log
    log_dir: PathBuf,
}

#[derive(Debug, Args)]
struct AssignArgs {
    #[arg(long, default_value = ".")]
    /// root that patch paths are reported relative to
    share_root: PathBuf,
    #[arg(long, value_name = "FOLDER")]
    /// folder below the share root that holds the patches
    image_folder: PathBuf,
    #[arg(long, value_name = "EXT")]
    /// only consider files with this extension
    image_extension: Option<String>,
    #[arg(long, value_name = "JSON")]
    /// task configuration file
    task_config: PathBuf,
    #[arg(long)]
    /// prefix prepended to every task name
    task_prefix: String,
    #[arg(long, value_name = "JSON")]
    /// write the patch list of every task to this file
    manifest: Option<PathBuf>,
    #[arg(long, default_value = ".")]
    /// directory for the run log
    log_dir: PathBuf,
}

fn run_tile(args: &TileArgs) -> anyhow::Result<()> {
    let mut config = TilerConfig::new(args.prefix.clone())
        .with_patch_size(args.patch_size)
        .with_empty_check_level(args.empty_check_level)
        .with_output_format(args.format);
    if let Some(ArgRegion(region)) = args.region {
        config = config.with_region(region);
    }
    let tiler = Tiler::new(config)?;

    // Fail before decoding anything if the output cannot be created
    if !args.slide.exists() {
        anyhow::bail!("Input slide {} does not exist", args.slide.display());
    }
    check_output_dir(&tiler.output_dir(&args.outdir))?;

    let timestamp = timestamp_now();
    let report = {
        let mut slide = open_slide(&args.slide, args.empty_check_level)?;
        tiler
            .run(&mut slide, &args.outdir)
            .with_context(|| format!("Tiling {} failed", args.slide.display()))?
    };

    let log = RunLog::tiling(
        &report,
        &TilingLogContext {
            timestamp: &timestamp,
            input: &args.slide,
        },
    );
    let log_path = write_run_log(&log, &args.log_dir, &tiling_log_name(&args.prefix, &timestamp))?;

    println!(
        "Done: {} rows x {} columns, {} patches written to {}, {} empty",
        report.num_rows,
        report.num_cols,
        report.non_empty_count(),
        report.output_dir.display(),
        report.empty_count()
    );
    println!("Log: {}", log_path.display());
    Ok(())
}

fn run_assign(args: &AssignArgs) -> anyhow::Result<()> {
    let timestamp = timestamp_now();
    let config = TaskConfig::from_file(&args.task_config)?;
    log::debug!("Loaded {} tasks from {}", config.tasks.len(), args.task_config.display());
    let grid = PatchGrid::load(
        &args.share_root,
        &args.image_folder,
        args.image_extension.as_deref(),
    )?;

    println!("Detected grid: {} rows x {} columns", grid.num_rows(), grid.num_cols());
    let assignments = grid.assign(&config.tasks)?;
    for assignment in &assignments {
        println!(
            "Task '{}_{}': Rows {}-{}, Cols {}-{} -> {} patches",
            args.task_prefix,
            assignment.name,
            assignment.region.rows.start,
            assignment.region.rows.end,
            assignment.region.cols.start,
            assignment.region.cols.end,
            assignment.patches.len()
        );
    }

    if let Some(manifest) = &args.manifest {
        write_manifest(&assignments, manifest)?;
        println!("Manifest: {}", manifest.display());
    }

    let log = RunLog::task_assignment(
        &grid,
        &assignments,
        &AssignmentLogContext {
            timestamp: &timestamp,
            share_root: &args.share_root,
            image_folder: &args.image_folder,
            image_extension: args.image_extension.as_deref(),
            task_prefix: &args.task_prefix,
        },
    );
    let log_path = write_run_log(
        &log,
        &args.log_dir,
        &assignment_log_name(&args.task_prefix, &timestamp),
    )?;
    println!("Log: {}", log_path.display());
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = SlidegridCli::parse();

    match &args.command {
        SlidegridCommands::Tile(tile_args) => run_tile(tile_args),
        SlidegridCommands::Assign(assign_args) => run_assign(assign_args),
    }
}
