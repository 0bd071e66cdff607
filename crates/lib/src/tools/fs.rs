//! File tools scoped to a workspace root: read, write, edit, glob, grep.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use super::registry::{
    opt_bool, opt_str, opt_u64, str_arg, FieldKind, InputSchema, Tool, ToolError, ToolHandler,
};
use crate::message::ToolArgs;

const DEFAULT_READ_LIMIT: usize = 2000;
const MAX_GLOB_RESULTS: usize = 500;
const MAX_GREP_MATCHES: usize = 100;

/// Root directory that file tools may touch.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a relative path under the root. Absolute paths and `..` escaping the root are
    /// rejected; the check is lexical.
    pub fn resolve(&self, rel: &str) -> Result<PathBuf, ToolError> {
        let rel_path = Path::new(rel);
        let mut depth = 0usize;
        let mut out = self.root.clone();
        for c in rel_path.components() {
            match c {
                Component::Normal(p) => {
                    depth += 1;
                    out.push(p);
                }
                Component::CurDir => {}
                Component::ParentDir => {
                    if depth == 0 {
                        return Err(ToolError::InvalidArguments(format!(
                            "path escapes the workspace: {}",
                            rel
                        )));
                    }
                    depth -= 1;
                    out.pop();
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(ToolError::InvalidArguments(format!(
                        "path must be relative to the workspace: {}",
                        rel
                    )));
                }
            }
        }
        Ok(out)
    }

    fn display_rel(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }
}

struct ReadFile(Arc<Workspace>);

#[async_trait]
impl ToolHandler for ReadFile {
    async fn call(&self, args: ToolArgs) -> Result<String, ToolError> {
        let path = self.0.resolve(str_arg(&args, "path")?)?;
        let content = tokio::fs::read_to_string(&path).await?;
        let offset = opt_u64(&args, "offset").unwrap_or(1).max(1) as usize;
        let limit = opt_u64(&args, "limit")
            .map(|l| l as usize)
            .unwrap_or(DEFAULT_READ_LIMIT);
        if limit == 0 {
            return Err(ToolError::InvalidArguments("limit must be at least 1".to_string()));
        }
        if content.is_empty() {
            return Ok("(empty file)".to_string());
        }
        let mut out = String::new();
        for (i, line) in content.lines().enumerate().skip(offset - 1).take(limit) {
            out.push_str(&format!("{:>6}\t{}\n", i + 1, line));
        }
        if out.is_empty() {
            return Err(ToolError::InvalidArguments(format!(
                "offset {} is past the end of the file ({} lines)",
                offset,
                content.lines().count()
            )));
        }
        Ok(out)
    }
}

struct WriteFile(Arc<Workspace>);

#[async_trait]
impl ToolHandler for WriteFile {
    async fn call(&self, args: ToolArgs) -> Result<String, ToolError> {
        let rel = str_arg(&args, "path")?;
        let content = str_arg(&args, "content")?;
        let path = self.0.resolve(rel)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content).await?;
        Ok(format!("wrote {} bytes to {}", content.len(), rel))
    }
}

struct EditFile(Arc<Workspace>);

#[async_trait]
impl ToolHandler for EditFile {
    async fn call(&self, args: ToolArgs) -> Result<String, ToolError> {
        let rel = str_arg(&args, "path")?;
        let old = str_arg(&args, "old_string")?;
        let new = str_arg(&args, "new_string")?;
        let replace_all = opt_bool(&args, "replace_all").unwrap_or(false);
        if old.is_empty() {
            return Err(ToolError::InvalidArguments("old_string must not be empty".to_string()));
        }
        let path = self.0.resolve(rel)?;
        let content = tokio::fs::read_to_string(&path).await?;
        let count = content.matches(old).count();
        if count == 0 {
            return Err(ToolError::Failed(format!("old_string not found in {}", rel)));
        }
        if count > 1 && !replace_all {
            return Err(ToolError::Failed(format!(
                "old_string matches {} times in {}; add context or set replace_all",
                count, rel
            )));
        }
        let updated = if replace_all {
            content.replace(old, new)
        } else {
            content.replacen(old, new, 1)
        };
        tokio::fs::write(&path, updated).await?;
        Ok(format!("replaced {} occurrence(s) in {}", count, rel))
    }
}

struct Glob(Arc<Workspace>);

#[async_trait]
impl ToolHandler for Glob {
    async fn call(&self, args: ToolArgs) -> Result<String, ToolError> {
        let pattern = str_arg(&args, "pattern")?.to_string();
        // Validates the literal prefix; wildcards are plain components to the resolver.
        let full = self.0.resolve(&pattern)?;
        let ws = self.0.clone();
        let matches = tokio::task::spawn_blocking(move || -> Result<Vec<String>, ToolError> {
            let full = full.to_string_lossy().to_string();
            let paths = glob::glob(&full)
                .map_err(|e| ToolError::InvalidArguments(format!("bad glob pattern: {}", e)))?;
            let mut out: Vec<String> = paths
                .flatten()
                .filter(|p| p.starts_with(ws.root()))
                .map(|p| ws.display_rel(&p))
                .collect();
            out.sort();
            Ok(out)
        })
        .await
        .map_err(|e| ToolError::Failed(format!("glob task failed: {}", e)))??;

        if matches.is_empty() {
            return Ok(format!("No files matched: {}", pattern));
        }
        let total = matches.len();
        let mut out = matches
            .into_iter()
            .take(MAX_GLOB_RESULTS)
            .collect::<Vec<_>>()
            .join("\n");
        if total > MAX_GLOB_RESULTS {
            out.push_str(&format!("\n\n... ({} more)", total - MAX_GLOB_RESULTS));
        }
        Ok(out)
    }
}

struct Grep(Arc<Workspace>);

#[async_trait]
impl ToolHandler for Grep {
    async fn call(&self, args: ToolArgs) -> Result<String, ToolError> {
        let pattern = str_arg(&args, "pattern")?.to_string();
        let case_sensitive = opt_bool(&args, "case_sensitive").unwrap_or(false);
        let re = regex::RegexBuilder::new(&pattern)
            .case_insensitive(!case_sensitive)
            .build()
            .map_err(|e| ToolError::InvalidArguments(format!("bad regex: {}", e)))?;
        let file_glob = match opt_str(&args, "file_glob") {
            Some(g) => Some(
                glob::Pattern::new(g)
                    .map_err(|e| ToolError::InvalidArguments(format!("bad file_glob: {}", e)))?,
            ),
            None => None,
        };
        let start = self.0.resolve(opt_str(&args, "path").unwrap_or("."))?;
        let ws = self.0.clone();

        let (lines, truncated) = tokio::task::spawn_blocking(move || {
            let mut lines = Vec::new();
            let walker = walkdir::WalkDir::new(&start)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'));
            for entry in walker.flatten() {
                if !entry.file_type().is_file() {
                    continue;
                }
                if let Some(ref g) = file_glob {
                    if !g.matches(&entry.file_name().to_string_lossy()) {
                        continue;
                    }
                }
                let Ok(content) = std::fs::read_to_string(entry.path()) else {
                    continue;
                };
                for (i, line) in content.lines().enumerate() {
                    if re.is_match(line) {
                        if lines.len() == MAX_GREP_MATCHES {
                            return (lines, true);
                        }
                        lines.push(format!("{}:{}:{}", ws.display_rel(entry.path()), i + 1, line));
                    }
                }
            }
            (lines, false)
        })
        .await
        .map_err(|e| ToolError::Failed(format!("grep task failed: {}", e)))?;

        if lines.is_empty() {
            return Ok(format!("No matches found for pattern: {}", pattern));
        }
        let mut out = lines.join("\n");
        if truncated {
            out.push_str(&format!("\n\n... (showing first {} matches)", MAX_GREP_MATCHES));
        }
        Ok(out)
    }
}

pub fn read_file_tool(ws: Arc<Workspace>) -> Tool {
    Tool::new(
        "read_file",
        "Read a text file from the workspace. Returns numbered lines.",
        InputSchema::new()
            .required("path", FieldKind::String, "File path relative to the workspace")
            .optional("offset", FieldKind::Integer, "First line to return (1-based, default 1)")
            .optional("limit", FieldKind::Integer, "Maximum number of lines (default 2000)"),
        Arc::new(ReadFile(ws)),
    )
}

pub fn write_file_tool(ws: Arc<Workspace>) -> Tool {
    Tool::new(
        "write_file",
        "Write a file in the workspace, creating parent directories and replacing existing content.",
        InputSchema::new()
            .required("path", FieldKind::String, "File path relative to the workspace")
            .required("content", FieldKind::String, "Full file content"),
        Arc::new(WriteFile(ws)),
    )
}

pub fn edit_file_tool(ws: Arc<Workspace>) -> Tool {
    Tool::new(
        "edit_file",
        "Replace an exact string in a workspace file. old_string must match exactly once unless replace_all is true.",
        InputSchema::new()
            .required("path", FieldKind::String, "File path relative to the workspace")
            .required("old_string", FieldKind::String, "Exact text to replace")
            .required("new_string", FieldKind::String, "Replacement text")
            .optional("replace_all", FieldKind::Boolean, "Replace every occurrence (default false)"),
        Arc::new(EditFile(ws)),
    )
}

pub fn glob_tool(ws: Arc<Workspace>) -> Tool {
    Tool::new(
        "glob",
        "Find workspace files matching a glob pattern (e.g. src/**/*.rs).",
        InputSchema::new().required("pattern", FieldKind::String, "Glob relative to the workspace"),
        Arc::new(Glob(ws)),
    )
}

pub fn grep_tool(ws: Arc<Workspace>) -> Tool {
    Tool::new(
        "grep",
        "Search file contents with a regex. Returns path:line:text for each match.",
        InputSchema::new()
            .required("pattern", FieldKind::String, "Regex pattern")
            .optional("path", FieldKind::String, "Directory relative to the workspace (default: root)")
            .optional("file_glob", FieldKind::String, "Only search file names matching this glob (e.g. *.rs)")
            .optional("case_sensitive", FieldKind::Boolean, "Case-sensitive match (default false)"),
        Arc::new(Grep(ws)),
    )
}
