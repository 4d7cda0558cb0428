//! Tab-separated run logs written at the end of each stage.
//!
//! A log starts with a title line, followed by a `[Summary]` block of
//! key/value pairs and one table section.

use std::{
    fmt::Display,
    io::{self, Write},
    path::Path,
};

use crate::partition::{PatchGrid, TaskAssignment};
use crate::tiler::TilingReport;

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Placeholder for fields only the upload service can fill in.
pub const NOT_AVAILABLE: &str = "NA";

const EMPTY_PATCH_NAME: &str = ".";

pub fn timestamp_now() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

pub fn tiling_log_name(prefix: &str, timestamp: &str) -> String {
    format!("{prefix}.image_patches.{timestamp}.log")
}

pub fn assignment_log_name(task_prefix: &str, timestamp: &str) -> String {
    format!("{task_prefix}.create_task.{timestamp}.log")
}

pub struct TilingLogContext<'a> {
    pub timestamp: &'a str,
    pub input: &'a Path,
}

pub struct AssignmentLogContext<'a> {
    pub timestamp: &'a str,
    pub share_root: &'a Path,
    pub image_folder: &'a Path,
    pub image_extension: Option<&'a str>,
    pub task_prefix: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLog {
    title: String,
    summary: Vec<(String, String)>,
    section: String,
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl RunLog {
    fn new(title: &str, section: &str, columns: &[&str]) -> Self {
        Self {
            title: title.to_owned(),
            summary: Vec::new(),
            section: section.to_owned(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    fn entry(&mut self, key: impl Into<String>, value: impl Display) {
        self.summary.push((key.into(), value.to_string()));
    }

    pub fn summary_value(&self, key: &str) -> Option<&str> {
        self.summary
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn tiling(report: &TilingReport, context: &TilingLogContext) -> Self {
        let mut log = Self::new(
            "Logs: slide to image patches",
            "Patch information",
            &[
                "image_name",
                "row",
                "column",
                "y_offset",
                "x_offset",
                "patch_size_y",
                "patch_size_x",
                "is_black",
            ],
        );

        log.entry("Timestamp", context.timestamp);
        log.entry("input", context.input.display());
        log.entry("output_directory", report.output_dir.display());
        log.entry("patch_size", report.patch_size);
        log.entry("image_format", report.output_format);
        log.entry("level_count", report.level_dimensions.len());
        for (level, dimensions) in report.level_dimensions.iter().enumerate() {
            log.entry(format!("dimension_lv{level}"), dimensions);
        }
        log.entry("num_row", report.num_rows);
        log.entry("num_column", report.num_cols);
        log.entry("num_patches", report.patch_count());
        log.entry("num_black_patch", report.empty_count());
        log.entry("num_non_black_patch", report.non_empty_count());

        log.rows = report
            .outcomes
            .iter()
            .map(|outcome| {
                let tile = &outcome.tile;
                let name = match &outcome.file_name {
                    Some(name) => report.output_dir.join(name).display().to_string(),
                    None => EMPTY_PATCH_NAME.to_owned(),
                };
                vec![
                    name,
                    tile.row.to_string(),
                    tile.col.to_string(),
                    tile.origin.y.to_string(),
                    tile.origin.x.to_string(),
                    tile.extent.height.to_string(),
                    tile.extent.width.to_string(),
                    (outcome.is_empty() as u8).to_string(),
                ]
            })
            .collect();
        log
    }

    pub fn task_assignment(
        grid: &PatchGrid,
        assignments: &[TaskAssignment],
        context: &AssignmentLogContext,
    ) -> Self {
        let mut log = Self::new(
            "Logs: assign patches to tasks",
            "Tasks",
            &[
                "task_id",
                "task_name",
                "row_start",
                "row_end",
                "col_start",
                "col_end",
                "frame_count",
                "job_count",
            ],
        );

        log.entry("Timestamp", context.timestamp);
        log.entry("share_path", context.share_root.display());
        log.entry("image_folder", context.image_folder.display());
        log.entry("image_extension", context.image_extension.unwrap_or("*"));
        log.entry(
            "image_folder_path",
            context.share_root.join(context.image_folder).display(),
        );
        log.entry("image_folder_rows", grid.num_rows());
        log.entry("image_folder_cols", grid.num_cols());
        log.entry("task_prefix", context.task_prefix);
        log.entry("total_image_count_in_folder", grid.scanned_file_count());
        log.entry(
            "total_image_count_in_tasks",
            assignments.iter().map(|a| a.patches.len()).sum::<usize>(),
        );
        for assignment in assignments {
            log.entry(
                format!("image_count_{}", assignment.name),
                assignment.patches.len(),
            );
        }

        log.rows = assignments
            .iter()
            .map(|a| {
                vec![
                    NOT_AVAILABLE.to_owned(),
                    format!("{}_{}", context.task_prefix, a.name),
                    a.region.rows.start.to_string(),
                    a.region.rows.end.to_string(),
                    a.region.cols.start.to_string(),
                    a.region.cols.end.to_string(),
                    a.patches.len().to_string(),
                    NOT_AVAILABLE.to_owned(),
                ]
            })
            .collect();
        log
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writeln!(writer, "{}", self.title)?;
        writeln!(writer, "[Summary]")?;
        for (key, value) in &self.summary {
            writeln!(writer, "{key}\t{value}")?;
        }
        writeln!(writer)?;
        writeln!(writer, "[{}]", self.section)?;
        writeln!(writer, "{}", self.columns.join("\t"))?;
        for row in &self.rows {
            writeln!(writer, "{}", row.join("\t"))?;
        }
        Ok(())
    }
}
