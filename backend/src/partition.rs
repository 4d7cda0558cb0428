use std::{
    cmp::min,
    collections::HashSet,
    fmt, fs, io,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::patch_name::PatchName;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Rows,
    Columns,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Axis::Rows => "row",
            Axis::Columns => "column",
        })
    }
}

#[derive(Debug, Error)]
pub enum PartitionError {
    #[error("Could not read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Task configuration {path} is not valid JSON")]
    Config {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    /// Carries the scanned directory when the files came from [`PatchGrid::load`]
    #[error(
        "No patch files found{}",
        .0.as_ref().map(|dir| format!(" in {}", dir.display())).unwrap_or_default()
    )]
    NoPatchesFound(Option<PathBuf>),
    #[error("Task '{0}' is defined more than once")]
    DuplicateTask(String),
    #[error("Task '{0}' has neither rows nor cols")]
    MissingRange(String),
    #[error("Task '{task}' has invalid {axis}s, expected [start, end] but got {len} elements")]
    MalformedRange { task: String, axis: Axis, len: usize },
    #[error("Task '{task}' has invalid {axis} range [{start}, {end}] for a grid of {dimension}")]
    InvalidRange {
        task: String,
        axis: Axis,
        start: i64,
        end: i64,
        dimension: u32,
    },
}

/// One task entry of the task configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TaskSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Inclusive `[start, end]` row indices, all rows when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<i64>>,
    /// Inclusive `[start, end]` column indices, all columns when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cols: Option<Vec<i64>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TaskConfig {
    pub tasks: Vec<TaskSpec>,
}

impl TaskConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, PartitionError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| PartitionError::Io {
            path: path.to_owned(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| PartitionError::Config {
            path: path.to_owned(),
            source,
        })
    }
}

/// Inclusive index range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IndexRange {
    pub start: u32,
    pub end: u32,
}

impl IndexRange {
    pub fn contains(&self, index: u32) -> bool {
        self.start <= index && index <= self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TaskRegion {
    pub rows: IndexRange,
    pub cols: IndexRange,
}

impl TaskRegion {
    pub fn contains(&self, row: u32, col: u32) -> bool {
        self.rows.contains(row) && self.cols.contains(col)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskAssignment {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub region: TaskRegion,
    /// Patch paths in discovery order
    pub patches: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridPatch {
    pub row: u32,
    pub col: u32,
    pub path: PathBuf,
}

/// Tile grid reconstructed from patch file names.
#[derive(Debug, Clone)]
pub struct PatchGrid {
    patches: Vec<GridPatch>,
    num_rows: u32,
    num_cols: u32,
    scanned_files: usize,
}

fn has_extension(path: &Path, extension: &str) -> bool {
    let wanted = extension.trim_start_matches('.');
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(wanted))
}

impl PatchGrid {
    /// Builds the grid from `paths`, keeping their order. Paths whose file
    /// name does not follow the patch naming scheme are skipped.
    pub fn from_paths<I>(paths: I) -> Result<Self, PartitionError>
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let mut scanned_files = 0;
        let mut patches = Vec::new();
        for path in paths {
            scanned_files += 1;
            match PatchName::parse_path(&path) {
                Some(name) => patches.push(GridPatch {
                    row: name.row,
                    col: name.col,
                    path,
                }),
                None => log::debug!("Skipping {}, not a patch file name", path.display()),
            }
        }

        let num_rows = patches.iter().map(|p| p.row + 1).max().ok_or(PartitionError::NoPatchesFound(None))?;
        let num_cols = patches.iter().map(|p| p.col + 1).max().ok_or(PartitionError::NoPatchesFound(None))?;

        Ok(Self {
            patches,
            num_rows,
            num_cols,
            scanned_files,
        })
    }

    /// Scans `share_root/folder` for files with `extension` (any file when
    /// `None`). Recorded paths are relative to `share_root` and sorted.
    pub fn load(
        share_root: &Path,
        folder: &Path,
        extension: Option<&str>,
    ) -> Result<Self, PartitionError> {
        let dir = share_root.join(folder);
        let io_error = |source| PartitionError::Io {
            path: dir.clone(),
            source,
        };

        let mut paths = Vec::new();
        for entry in fs::read_dir(&dir).map_err(io_error)? {
            let entry = entry.map_err(io_error)?;
            if !entry.file_type().map_err(io_error)?.is_file() {
                continue;
            }
            let relative = folder.join(entry.file_name());
            if extension.map_or(true, |ext| has_extension(&relative, ext)) {
                paths.push(relative);
            }
        }
        paths.sort();

        let grid = Self::from_paths(paths).map_err(|e| match e {
            PartitionError::NoPatchesFound(None) => PartitionError::NoPatchesFound(Some(dir.clone())),
            other => other,
        })?;
        log::info!(
            "Detected grid in {}: {} rows x {} columns ({} patches)",
            dir.display(),
            grid.num_rows,
            grid.num_cols,
            grid.patches.len()
        );
        Ok(grid)
    }

    pub fn num_rows(&self) -> u32 {
        self.num_rows
    }

    pub fn num_cols(&self) -> u32 {
        self.num_cols
    }

    pub fn patches(&self) -> &[GridPatch] {
        &self.patches
    }

    /// Number of files looked at, including those that were not patches.
    pub fn scanned_file_count(&self) -> usize {
        self.scanned_files
    }

    fn dimension(&self, axis: Axis) -> u32 {
        match axis {
            Axis::Rows => self.num_rows,
            Axis::Columns => self.num_cols,
        }
    }

    fn resolve_axis(
        &self,
        task: &str,
        axis: Axis,
        given: Option<&[i64]>,
    ) -> Result<IndexRange, PartitionError> {
        let dimension = self.dimension(axis);
        let (start, end) = match given {
            None => return Ok(IndexRange { start: 0, end: dimension - 1 }),
            Some(&[start, end]) => (start, min(end, dimension as i64 - 1)),
            Some(other) => {
                return Err(PartitionError::MalformedRange {
                    task: task.to_owned(),
                    axis,
                    len: other.len(),
                })
            }
        };

        if !(0 <= start && start <= end && end < dimension as i64) {
            return Err(PartitionError::InvalidRange {
                task: task.to_owned(),
                axis,
                start,
                end,
                dimension,
            });
        }
        Ok(IndexRange {
            start: start as u32,
            end: end as u32,
        })
    }

    /// Resolves the row and column ranges of `task` against the detected grid.
    ///
    /// Upper bounds beyond the grid are clipped, everything else that does not
    /// form a valid range is rejected.
    pub fn resolve(&self, task: &TaskSpec) -> Result<TaskRegion, PartitionError> {
        let rows = task.rows.as_deref();
        let cols = task.cols.as_deref();
        if rows.is_none() && cols.is_none() {
            return Err(PartitionError::MissingRange(task.name.clone()));
        }
        for (axis, given) in [(Axis::Rows, rows), (Axis::Columns, cols)] {
            if let Some(given) = given.filter(|g| g.len() != 2) {
                return Err(PartitionError::MalformedRange {
                    task: task.name.clone(),
                    axis,
                    len: given.len(),
                });
            }
        }

        Ok(TaskRegion {
            rows: self.resolve_axis(&task.name, Axis::Rows, rows)?,
            cols: self.resolve_axis(&task.name, Axis::Columns, cols)?,
        })
    }

    /// Collects the patches of every task. Tasks may overlap, so a patch can
    /// end up in any number of tasks. Nothing is returned unless every task
    /// resolves.
    pub fn assign(&self, tasks: &[TaskSpec]) -> Result<Vec<TaskAssignment>, PartitionError> {
        let mut seen = HashSet::new();
        for task in tasks {
            if !seen.insert(task.name.as_str()) {
                return Err(PartitionError::DuplicateTask(task.name.clone()));
            }
        }

        let regions = tasks
            .iter()
            .map(|task| self.resolve(task))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(tasks
            .iter()
            .zip(regions)
            .map(|(task, region)| {
                let patches: Vec<PathBuf> = self
                    .patches
                    .iter()
                    .filter(|p| region.contains(p.row, p.col))
                    .map(|p| p.path.clone())
                    .collect();

                log::info!(
                    "Task '{}': Rows {}-{}, Cols {}-{} -> {} patches",
                    task.name,
                    region.rows.start,
                    region.rows.end,
                    region.cols.start,
                    region.cols.end,
                    patches.len()
                );
                if patches.is_empty() {
                    log::warn!("Task '{}' does not contain any patch", task.name);
                }

                TaskAssignment {
                    name: task.name.clone(),
                    description: task.description.clone(),
                    region,
                    patches,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn task(name: &str, rows: Option<Vec<i64>>, cols: Option<Vec<i64>>) -> TaskSpec {
        TaskSpec {
            name: name.to_owned(),
            description: None,
            rows,
            cols,
        }
    }

    /// A 50x50 grid with a single empty cell at (2, 3).
    fn grid_50() -> PatchGrid {
        let mut paths = Vec::new();
        for row in 0..50u32 {
            for col in 0..50u32 {
                if (row, col) != (2, 3) {
                    paths.push(PathBuf::from(format!(
                        "slide/s.{row:02}_{col:02}.{}_{}.jpg",
                        row * 1024,
                        col * 1024
                    )));
                }
            }
        }
        PatchGrid::from_paths(paths).unwrap()
    }

    #[test]
    fn test_grid_extent_is_derived_from_names() {
        let grid = PatchGrid::from_paths(vec![
            PathBuf::from("s.0_4.0_4096.jpg"),
            PathBuf::from("s.2_1.2048_1024.jpg"),
            PathBuf::from("notes.txt"),
        ])
        .unwrap();
        assert_eq!((grid.num_rows(), grid.num_cols()), (3, 5));
        assert_eq!(grid.patches().len(), 2);
        assert_eq!(grid.scanned_file_count(), 3);
    }

    #[test]
    fn test_no_patches_is_an_error() {
        let result = PatchGrid::from_paths(vec![PathBuf::from("readme.md")]);
        assert!(matches!(result, Err(PartitionError::NoPatchesFound(None))));
    }

    #[test]
    fn test_index_at_numeric_limit_is_not_a_patch() {
        let grid = PatchGrid::from_paths(vec![
            PathBuf::from("s.4294967295_0.0_0.jpg"),
            PathBuf::from("s.0_4294967295.0_0.jpg"),
            PathBuf::from("s.1_2.1024_2048.jpg"),
        ])
        .unwrap();
        assert_eq!((grid.num_rows(), grid.num_cols()), (2, 3));
        assert_eq!(grid.patches().len(), 1);
        assert_eq!(grid.scanned_file_count(), 3);

        let result = PatchGrid::from_paths(vec![PathBuf::from("s.4294967295_0.0_0.jpg")]);
        assert!(matches!(result, Err(PartitionError::NoPatchesFound(None))));
    }

    #[test]
    fn test_square_task_selects_block() {
        let grid = grid_50();
        let assigned = grid
            .assign(&[task("A", Some(vec![0, 4]), Some(vec![0, 4]))])
            .unwrap();

        let patches = &assigned[0].patches;
        assert_eq!(patches.len(), 24);
        for path in patches {
            let name = PatchName::parse_path(path).unwrap();
            assert!(name.row <= 4 && name.col <= 4);
        }
        // Discovery order is row-major
        assert_eq!(patches[0], PathBuf::from("slide/s.00_00.0_0.jpg"));
        assert_eq!(patches[5], PathBuf::from("slide/s.01_00.1024_0.jpg"));
    }

    #[test]
    fn test_upper_bound_is_clipped() {
        let grid = grid_50();
        let region = grid.resolve(&task("B", Some(vec![10, 999]), None)).unwrap();
        assert_eq!(region.rows, IndexRange { start: 10, end: 49 });
        assert_eq!(region.cols, IndexRange { start: 0, end: 49 });
    }

    #[test]
    fn test_invalid_ranges_are_rejected() {
        let grid = grid_50();
        assert!(matches!(
            grid.resolve(&task("C", Some(vec![40, 10]), None)),
            Err(PartitionError::InvalidRange {
                axis: Axis::Rows,
                start: 40,
                end: 10,
                ..
            })
        ));
        assert!(matches!(
            grid.resolve(&task("D", None, Some(vec![-1, 3]))),
            Err(PartitionError::InvalidRange { axis: Axis::Columns, .. })
        ));
        // Start beyond the grid stays invalid after clipping the end
        assert!(matches!(
            grid.resolve(&task("E", Some(vec![60, 70]), None)),
            Err(PartitionError::InvalidRange { start: 60, end: 49, .. })
        ));
    }

    #[test]
    fn test_malformed_and_missing_ranges() {
        let grid = grid_50();
        assert!(matches!(
            grid.resolve(&task("F", None, None)),
            Err(PartitionError::MissingRange(_))
        ));
        assert!(matches!(
            grid.resolve(&task("G", Some(vec![1, 2, 3]), None)),
            Err(PartitionError::MalformedRange { axis: Axis::Rows, len: 3, .. })
        ));
        assert!(matches!(
            grid.resolve(&task("H", Some(vec![0, 1]), Some(vec![]))),
            Err(PartitionError::MalformedRange { axis: Axis::Columns, len: 0, .. })
        ));
    }

    #[test]
    fn test_one_bad_task_aborts_all() {
        let grid = grid_50();
        let result = grid.assign(&[
            task("ok", Some(vec![0, 1]), None),
            task("bad", Some(vec![5, 2]), None),
        ]);
        assert!(matches!(result, Err(PartitionError::InvalidRange { ref task, .. }) if task == "bad"));
    }

    #[test]
    fn test_duplicate_task_names() {
        let grid = grid_50();
        let result = grid.assign(&[task("X", Some(vec![0, 0]), None), task("X", Some(vec![1, 1]), None)]);
        assert!(matches!(result, Err(PartitionError::DuplicateTask(name)) if name == "X"));
    }

    #[test]
    fn test_tasks_may_overlap() {
        let grid = grid_50();
        let assigned = grid
            .assign(&[
                task("top", Some(vec![0, 9]), None),
                task("left", None, Some(vec![0, 9])),
            ])
            .unwrap();
        let corner = PathBuf::from("slide/s.00_00.0_0.jpg");
        assert!(assigned[0].patches.contains(&corner));
        assert!(assigned[1].patches.contains(&corner));
        assert_eq!(assigned[0].patches.len(), 499);
        assert_eq!(assigned[1].patches.len(), 499);
    }

    #[test]
    fn test_row_task_on_small_grid() {
        let grid = PatchGrid::from_paths(vec![
            PathBuf::from("slide/slide.0_1.0_1024.png"),
            PathBuf::from("slide/slide.1_0.1024_0.png"),
            PathBuf::from("slide/slide.1_1.1024_1024.png"),
            PathBuf::from("slide/slide.0_0.0_0.png"),
        ])
        .unwrap();
        let config: TaskConfig = serde_json::from_str(r#"{"tasks": [{"name": "R00", "rows": [0, 0]}]}"#).unwrap();

        let assigned = grid.assign(&config.tasks).unwrap();
        assert_eq!(
            assigned[0].patches,
            vec![
                PathBuf::from("slide/slide.0_1.0_1024.png"),
                PathBuf::from("slide/slide.0_0.0_0.png"),
            ]
        );
    }

    #[test]
    fn test_load_scans_folder() {
        let root = tempfile::tempdir().unwrap();
        let folder = Path::new("case1");
        fs::create_dir(root.path().join(folder)).unwrap();
        for name in [
            "case1.1_0.1024_0.jpg",
            "case1.0_1.0_1024.JPG",
            "case1.0_0.0_0.jpg",
            "case1.0_0.0_0.png",
            "case1.image_patches.20250101_101010.log",
        ] {
            fs::write(root.path().join(folder).join(name), b"").unwrap();
        }
        fs::create_dir(root.path().join(folder).join("nested.9_9.0_0.jpg")).unwrap();

        let grid = PatchGrid::load(root.path(), folder, Some("jpg")).unwrap();
        let paths: Vec<&Path> = grid.patches().iter().map(|p| p.path.as_path()).collect();
        assert_eq!(
            paths,
            vec![
                Path::new("case1/case1.0_0.0_0.jpg"),
                Path::new("case1/case1.0_1.0_1024.JPG"),
                Path::new("case1/case1.1_0.1024_0.jpg"),
            ]
        );
        assert_eq!((grid.num_rows(), grid.num_cols()), (2, 2));
    }

    #[test]
    fn test_load_empty_folder() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir(root.path().join("empty")).unwrap();
        let result = PatchGrid::load(root.path(), Path::new("empty"), None);
        assert!(matches!(result, Err(PartitionError::NoPatchesFound(Some(_)))));
    }

    #[test]
    fn test_task_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        fs::write(
            &path,
            r#"{"tasks": [{"name": "R00", "description": "Row 0-49", "rows": [0, 49], "cols": [0, 49]}, {"name": "C1", "cols": [50, 99]}]}"#,
        )
        .unwrap();

        let config = TaskConfig::from_file(&path).unwrap();
        assert_eq!(config.tasks.len(), 2);
        assert_eq!(config.tasks[0].description.as_deref(), Some("Row 0-49"));
        assert_eq!(config.tasks[1].rows, None);

        fs::write(&path, "{\"tasks\": [{\"rows\": [0, 1]}]}").unwrap();
        assert!(matches!(TaskConfig::from_file(&path), Err(PartitionError::Config { .. })));
    }
}
