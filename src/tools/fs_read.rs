//! fs_read - read file lines or list directories

use std::collections::VecDeque;
use std::path::PathBuf;

use serde::Deserialize;

use super::{display_path, InvokeContext, InvokeOutput};
use crate::core::{Result, WingmanError};

/// Read a file or list a directory
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "mode")]
pub enum FsRead {
    Line(FsLine),
    Directory(FsDirectory),
}

/// Read a range of lines from a file
///
/// Lines are 1-based. Negative indices count from the end of the file,
/// so `-1` is the last line.
#[derive(Debug, Clone, Deserialize)]
pub struct FsLine {
    pub path: String,
    pub start_line: Option<i32>,
    pub end_line: Option<i32>,
}

/// List directory entries up to a depth
#[derive(Debug, Clone, Deserialize)]
pub struct FsDirectory {
    pub path: String,
    pub depth: Option<usize>,
}

impl FsLine {
    const DEFAULT_START_LINE: i32 = 1;
    const DEFAULT_END_LINE: i32 = -1;

    fn start_line(&self) -> i32 {
        self.start_line.unwrap_or(Self::DEFAULT_START_LINE)
    }

    fn end_line(&self) -> i32 {
        self.end_line.unwrap_or(Self::DEFAULT_END_LINE)
    }
}

impl FsDirectory {
    const DEFAULT_DEPTH: usize = 0;

    fn depth(&self) -> usize {
        self.depth.unwrap_or(Self::DEFAULT_DEPTH)
    }
}

/// Map a possibly negative 1-based line index to a 0-based offset
fn convert_index(index: i32, line_count: usize) -> usize {
    if index <= 0 {
        (line_count as i64 + index as i64).max(0) as usize
    } else {
        (index - 1) as usize
    }
}

impl FsRead {
    fn path(&self) -> &str {
        match self {
            FsRead::Line(line) => &line.path,
            FsRead::Directory(dir) => &dir.path,
        }
    }

    pub fn describe(&self, ctx: &InvokeContext) -> String {
        let path = display_path(&ctx.resolve_path(self.path()), ctx);
        match self {
            FsRead::Line(line) => format!(
                "Reading file: {}, from line {} to {}",
                path,
                line.start_line(),
                line.end_line()
            ),
            FsRead::Directory(dir) => {
                format!("Reading directory: {} with depth {}", path, dir.depth())
            }
        }
    }

    pub async fn validate(&self, ctx: &InvokeContext) -> Result<()> {
        let path = ctx.resolve_path(self.path());
        match self {
            FsRead::Line(_) => {
                if !path.exists() {
                    return Err(WingmanError::tool(format!(
                        "'{}' does not exist",
                        path.display()
                    )));
                }
                if !tokio::fs::metadata(&path).await?.is_file() {
                    return Err(WingmanError::tool(format!(
                        "'{}' is not a file",
                        path.display()
                    )));
                }
            }
            FsRead::Directory(_) => {
                if !tokio::fs::metadata(&path)
                    .await
                    .map(|m| m.is_dir())
                    .unwrap_or(false)
                {
                    return Err(WingmanError::tool(format!(
                        "'{}' is not a directory",
                        path.display()
                    )));
                }
            }
        }
        Ok(())
    }

    pub async fn invoke(&self, ctx: &InvokeContext) -> Result<InvokeOutput> {
        match self {
            FsRead::Line(line) => read_lines(line, ctx).await,
            FsRead::Directory(dir) => list_directory(dir, ctx).await,
        }
    }
}

async fn read_lines(line: &FsLine, ctx: &InvokeContext) -> Result<InvokeOutput> {
    let path = ctx.resolve_path(&line.path);
    tracing::debug!(path = %path.display(), "reading file");

    let contents = tokio::fs::read_to_string(&path).await?;
    let lines: Vec<&str> = contents.lines().collect();
    let line_count = lines.len();

    let start = convert_index(line.start_line(), line_count);
    let end = convert_index(line.end_line(), line_count);

    if line_count == 0 {
        return Ok(InvokeOutput::text(String::new()));
    }
    if start >= line_count {
        return Err(WingmanError::tool(format!(
            "starting index: {} is outside of the allowed range: ({}, {})",
            line.start_line(),
            -(line_count as i64),
            line_count
        )));
    }
    if start > end {
        return Err(WingmanError::tool(format!(
            "start line {} is after end line {}",
            line.start_line(),
            line.end_line()
        )));
    }

    let end = end.min(line_count - 1);
    Ok(InvokeOutput::text(lines[start..=end].join("\n")))
}

async fn list_directory(dir: &FsDirectory, ctx: &InvokeContext) -> Result<InvokeOutput> {
    let root = ctx.resolve_path(&dir.path);
    let max_depth = dir.depth();
    tracing::debug!(path = %root.display(), max_depth, "listing directory");

    let mut entries = Vec::new();
    let mut queue: VecDeque<(PathBuf, usize)> = VecDeque::new();
    queue.push_back((root, 0));

    while let Some((path, depth)) = queue.pop_front() {
        let mut read_dir = tokio::fs::read_dir(&path).await?;
        let mut level = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            let file_type = entry.file_type().await?;
            let entry_path = entry.path();
            let marker = if file_type.is_dir() { "d" } else { "-" };
            level.push(format!("{} {}", marker, entry_path.display()));
            if file_type.is_dir() && depth < max_depth {
                queue.push_back((entry_path, depth + 1));
            }
        }
        level.sort();
        entries.extend(level);
    }

    Ok(InvokeOutput::text(entries.join("\n")))
}
