//! File-system template source confined to a sandbox directory

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use super::{Source, DEFAULT_EXTENSION};
use crate::error::TemplateError;

/// Constraints on which files a [`FileSource`] may read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Append the default extension to names whose file name has none
    pub require_extensions: bool,
    /// Append the default extension unless the name already ends with it
    pub only_default_extension: bool,
    /// Reject paths leaving the sandbox (or the view directory without escape)
    pub to_sandbox: bool,
    /// Reject paths through hidden files or directories
    pub to_visible_files: bool,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            require_extensions: true,
            only_default_extension: false,
            to_sandbox: true,
            to_visible_files: true,
        }
    }
}

impl Limits {
    /// Sandbox and visibility checks only; names are read as given
    pub fn dir_limited() -> Self {
        Self {
            require_extensions: false,
            ..Self::default()
        }
    }
}

/// Reads templates from a view directory nested inside a sandbox directory
#[derive(Debug, Clone)]
pub struct FileSource {
    sandbox: PathBuf,
    view: PathBuf,
    extension: String,
    limits: Limits,
}

impl FileSource {
    /// Source whose sandbox is the view directory itself
    pub fn new(view_directory: impl AsRef<Path>) -> Result<Self, TemplateError> {
        let view = view_directory.as_ref();
        Self::sandboxed(view, view)
    }

    /// `view_directory` must lie inside `sandbox_directory`
    pub fn sandboxed(
        sandbox_directory: impl AsRef<Path>,
        view_directory: impl AsRef<Path>,
    ) -> Result<Self, TemplateError> {
        let sandbox = normalize(&absolute(sandbox_directory.as_ref()));
        let view = normalize(&absolute(view_directory.as_ref()));
        if !view.starts_with(&sandbox) {
            return Err(TemplateError::illegal_access(format!(
                "view directory {} must be inside sandbox directory {}",
                view.display(),
                sandbox.display()
            )));
        }
        Ok(Self {
            sandbox,
            view,
            extension: DEFAULT_EXTENSION.to_string(),
            limits: Limits::default(),
        })
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn sandbox(&self) -> &Path {
        &self.sandbox
    }

    pub fn view(&self) -> &Path {
        &self.view
    }

    /// Full path for `template` after extension rules and access checks
    pub fn path_for(&self, template: &str, escape: bool) -> Result<PathBuf, TemplateError> {
        let mut path = normalize(&self.view.join(template.trim_start_matches('/')))
            .to_string_lossy()
            .into_owned();

        let suffix = format!(".{}", self.extension);
        let has_extension = path
            .rsplit('/')
            .next()
            .is_some_and(|name| name.contains('.'));
        if self.limits.only_default_extension {
            if !path.ends_with(&suffix) {
                path.push_str(&suffix);
            }
        } else if self.limits.require_extensions && !has_extension {
            path.push_str(&suffix);
        }
        let path = PathBuf::from(path);

        if self.limits.to_visible_files {
            let below = path.strip_prefix(&self.sandbox).unwrap_or(&path);
            let hidden: Vec<String> = below
                .components()
                .filter_map(|c| match c {
                    Component::Normal(part) => {
                        let part = part.to_string_lossy();
                        (part.len() > 1 && part.starts_with('.')).then(|| part.into_owned())
                    }
                    _ => None,
                })
                .collect();
            if !hidden.is_empty() {
                return Err(TemplateError::illegal_access(format!(
                    "attempted to access {}",
                    hidden.join(",")
                )));
            }
        }

        if self.limits.to_sandbox {
            let limited_to = if escape { &self.sandbox } else { &self.view };
            if !path.starts_with(limited_to) {
                return Err(TemplateError::illegal_access(format!(
                    "attempted to escape sandbox: {}",
                    path.display()
                )));
            }
        }

        Ok(path)
    }
}

#[async_trait]
impl Source for FileSource {
    fn file(&self, template: &str, escape: bool) -> Result<String, TemplateError> {
        let path = self.path_for(template, escape)?;
        std::fs::read_to_string(&path).map_err(|e| read_error(template, &path, e))
    }

    async fn file_async(&self, template: &str, escape: bool) -> Result<String, TemplateError> {
        let path = self.path_for(template, escape)?;
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| read_error(template, &path, e))
    }
}

fn read_error(template: &str, path: &Path, err: std::io::Error) -> TemplateError {
    match err.kind() {
        ErrorKind::NotFound => TemplateError::no_template(template),
        _ => TemplateError::ReadFailed {
            path: path.display().to_string(),
            message: err.to_string(),
        },
    }
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}

/// Lexically resolve `.` and `..` without touching the file system
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
