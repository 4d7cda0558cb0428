use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::Context;
use slidegrid::{
    partition::TaskAssignment,
    pyramid::RasterPyramid,
    run_log::RunLog,
    tile_grid::Region,
    Coords,
};

/// Opens `path` as a slide with pyramid levels 0 through `deepest_level`.
pub fn open_slide<T: AsRef<Path>>(path: T, deepest_level: u32) -> anyhow::Result<RasterPyramid> {
    let path = path.as_ref();
    let level_count = deepest_level
        .checked_add(1)
        .with_context(|| format!("Pyramid level {} is out of range", deepest_level))?;
    RasterPyramid::open(path, level_count)
        .with_context(|| format!("Could not open slide {}", path.display()))
}

pub fn write_run_log(log: &RunLog, dir: &Path, file_name: &str) -> anyhow::Result<PathBuf> {
    let path = dir.join(file_name);
    let file = File::create(&path).with_context(|| format!("Could not create log file {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    log.write_to(&mut writer)
        .and_then(|_| writer.flush())
        .with_context(|| format!("Could not write log file {}", path.display()))?;
    Ok(path)
}

/// Writes the per-task patch lists as JSON for the upload step.
pub fn write_manifest(assignments: &[TaskAssignment], path: &Path) -> anyhow::Result<()> {
    let file = File::create(path).with_context(|| format!("Could not create manifest {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, assignments)
        .with_context(|| format!("Could not write manifest {}", path.display()))?;
    writer.flush()?;
    Ok(())
}

/// Region given on the command line as `left,top,right,bottom` in level 0 pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgRegion(pub Region);

impl FromStr for ArgRegion {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let values = s
            .split(',')
            .map(|v| v.trim().parse::<u32>())
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("Region {} must consist of non-negative integers", s))?;
        let &[left, top, right, bottom] = values.as_slice() else {
            anyhow::bail!("Region {} must be given as left,top,right,bottom", s);
        };
        let region = Region::from_corners(Coords { x: left, y: top }, Coords { x: right, y: bottom })?;
        Ok(ArgRegion(region))
    }
}
