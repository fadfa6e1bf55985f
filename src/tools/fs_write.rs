//! fs_write - create, edit and append to files

use serde::Deserialize;

use super::{display_path, InvokeContext, InvokeOutput};
use crate::core::{Result, WingmanError};

/// File mutation requested by the model
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum FsWrite {
    /// Create or overwrite a file
    Create {
        path: String,
        file_text: Option<String>,
    },
    /// Replace exactly one occurrence of `old_str`
    StrReplace {
        path: String,
        old_str: String,
        new_str: String,
    },
    /// Append text to the end of an existing file
    Append { path: String, new_str: String },
}

impl FsWrite {
    fn path(&self) -> &str {
        match self {
            FsWrite::Create { path, .. }
            | FsWrite::StrReplace { path, .. }
            | FsWrite::Append { path, .. } => path,
        }
    }

    pub fn describe(&self, ctx: &InvokeContext) -> String {
        let path = display_path(&ctx.resolve_path(self.path()), ctx);
        match self {
            FsWrite::Create { file_text, .. } => {
                let lines = file_text.as_deref().map(|t| t.lines().count()).unwrap_or(0);
                format!("Path: {} (create, {} lines)", path, lines)
            }
            FsWrite::StrReplace { old_str, new_str, .. } => format!(
                "Path: {} (replace {} lines with {} lines)",
                path,
                old_str.lines().count(),
                new_str.lines().count()
            ),
            FsWrite::Append { new_str, .. } => {
                format!("Path: {} (append {} lines)", path, new_str.lines().count())
            }
        }
    }

    pub async fn validate(&self, ctx: &InvokeContext) -> Result<()> {
        if self.path().trim().is_empty() {
            return Err(WingmanError::tool("Path must not be empty"));
        }
        let path = ctx.resolve_path(self.path());
        match self {
            FsWrite::Create { .. } => {
                if path.is_dir() {
                    return Err(WingmanError::tool(format!(
                        "'{}' is a directory",
                        path.display()
                    )));
                }
            }
            FsWrite::StrReplace { .. } | FsWrite::Append { .. } => {
                if !path.is_file() {
                    return Err(WingmanError::tool(format!(
                        "The provided path must exist in order to edit it: {}",
                        path.display()
                    )));
                }
            }
        }
        Ok(())
    }

    pub async fn invoke(&self, ctx: &InvokeContext) -> Result<InvokeOutput> {
        let path = ctx.resolve_path(self.path());
        match self {
            FsWrite::Create { file_text, .. } => {
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                let mut text = file_text.clone().unwrap_or_default();
                if !text.is_empty() && !text.ends_with('\n') {
                    text.push('\n');
                }
                tokio::fs::write(&path, text).await?;
                tracing::info!(path = %path.display(), "created file");
            }
            FsWrite::StrReplace { old_str, new_str, .. } => {
                let contents = tokio::fs::read_to_string(&path).await?;
                match contents.matches(old_str.as_str()).count() {
                    0 => {
                        return Err(WingmanError::tool(format!(
                            "no occurrences of \"{}\" were found",
                            old_str
                        )))
                    }
                    1 => {
                        let updated = contents.replacen(old_str.as_str(), new_str, 1);
                        tokio::fs::write(&path, updated).await?;
                        tracing::info!(path = %path.display(), "replaced text");
                    }
                    n => {
                        return Err(WingmanError::tool(format!(
                            "{} occurrences of old_str were found when only 1 is expected",
                            n
                        )))
                    }
                }
            }
            FsWrite::Append { new_str, .. } => {
                let mut contents = tokio::fs::read_to_string(&path).await?;
                if !contents.is_empty() && !contents.ends_with('\n') {
                    contents.push('\n');
                }
                contents.push_str(new_str);
                if !contents.ends_with('\n') {
                    contents.push('\n');
                }
                tokio::fs::write(&path, contents).await?;
                tracing::info!(path = %path.display(), "appended to file");
            }
        }
        Ok(InvokeOutput::text(String::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx_for(dir: &tempfile::TempDir) -> InvokeContext {
        InvokeContext {
            cwd: dir.path().to_path_buf(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_makes_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx_for(&dir);
        let tool: FsWrite = serde_json::from_value(json!({
            "command": "create",
            "path": "nested/new.txt",
            "file_text": "hello"
        }))
        .unwrap();

        tool.validate(&ctx).await.unwrap();
        tool.invoke(&ctx).await.unwrap();
        let written = std::fs::read_to_string(dir.path().join("nested/new.txt")).unwrap();
        assert_eq!(written, "hello\n");
    }

    #[tokio::test]
    async fn test_str_replace_requires_single_match() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f.txt");
        std::fs::write(&file, "a b a\n").unwrap();
        let ctx = ctx_for(&dir);

        let ambiguous = FsWrite::StrReplace {
            path: "f.txt".into(),
            old_str: "a".into(),
            new_str: "z".into(),
        };
        assert!(ambiguous.invoke(&ctx).await.is_err());

        let missing = FsWrite::StrReplace {
            path: "f.txt".into(),
            old_str: "q".into(),
            new_str: "z".into(),
        };
        assert!(missing.invoke(&ctx).await.is_err());

        let unique = FsWrite::StrReplace {
            path: "f.txt".into(),
            old_str: "b".into(),
            new_str: "c".into(),
        };
        unique.invoke(&ctx).await.unwrap();
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "a c a\n");
    }

    #[tokio::test]
    async fn test_append_adds_missing_newline() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("log.txt");
        std::fs::write(&file, "first").unwrap();
        let ctx = ctx_for(&dir);

        let tool = FsWrite::Append {
            path: "log.txt".into(),
            new_str: "second".into(),
        };
        tool.validate(&ctx).await.unwrap();
        tool.invoke(&ctx).await.unwrap();
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "first\nsecond\n");
    }

    #[tokio::test]
    async fn test_edit_requires_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx_for(&dir);
        let tool = FsWrite::Append {
            path: "nope.txt".into(),
            new_str: "x".into(),
        };
        assert!(tool.validate(&ctx).await.is_err());
    }
}
