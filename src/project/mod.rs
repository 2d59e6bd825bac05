//! Project discovery: root directory, build file and build metadata

pub mod model;

pub use model::*;

use crate::document::XmlDocument;
use crate::error::{MigrateError, Result};
use std::path::{Path, PathBuf};

/// Build file extensions recognized as project descriptors
const BUILD_FILE_PATTERNS: &[&str] = &["*.csproj", "*.vbproj", "*.fsproj"];

/// Values that, when present, take precedence over what the build file says
#[derive(Debug, Clone, Default)]
pub struct LocateOptions {
    pub root: Option<PathBuf>,
    pub assembly_name: Option<String>,
    pub output_dir: Option<PathBuf>,
}

#[derive(Debug)]
pub struct ProjectLocator {
    start_dir: PathBuf,
}

impl ProjectLocator {
    pub fn new(start_dir: impl Into<PathBuf>) -> Self {
        Self {
            start_dir: start_dir.into(),
        }
    }

    pub fn from_current_dir() -> Result<Self> {
        Ok(Self::new(std::env::current_dir()?))
    }

    /// Find the project root and its build file
    ///
    /// Without an explicit root the search walks from the start directory up
    /// to the filesystem root and stops at the first directory holding a build
    /// file.
    pub fn find_root(&self, explicit: Option<&Path>) -> Result<(PathBuf, PathBuf)> {
        if let Some(root) = explicit {
            let root = self.absolute(root);
            return match find_build_file(&root)? {
                Some(build_file) => Ok((root, build_file)),
                None => Err(MigrateError::ProjectNotFound { start: root }),
            };
        }

        let start = self.absolute(&self.start_dir);
        let mut current = start.as_path();
        loop {
            if let Some(build_file) = find_build_file(current)? {
                log::debug!("Project root: {}", current.display());
                return Ok((current.to_path_buf(), build_file));
            }
            match current.parent() {
                Some(parent) => current = parent,
                None => return Err(MigrateError::ProjectNotFound { start }),
            }
        }
    }

    pub fn locate(&self, options: &LocateOptions) -> Result<ProjectDescriptor> {
        let (root, build_file) = self.find_root(options.root.as_deref())?;
        describe(
            root,
            build_file,
            options.assembly_name.clone(),
            options.output_dir.clone(),
        )
    }

    fn absolute(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.start_dir.join(path)
        }
    }
}

/// Read the build file and fill whatever the caller did not supply
pub fn describe(
    root: PathBuf,
    build_file: PathBuf,
    assembly_name: Option<String>,
    output_dir: Option<PathBuf>,
) -> Result<ProjectDescriptor> {
    let doc = load_project_document(&build_file)?;

    if let Some(ns) = doc.namespace() {
        if ns != PROJECT_NAMESPACE {
            log::warn!("{} uses unexpected namespace {}", build_file.display(), ns);
        }
    }

    let assembly_name = match assembly_name.filter(|name| !name.trim().is_empty()) {
        Some(name) => name,
        None => doc
            .first_text("AssemblyName")
            .map(str::to_string)
            .ok_or_else(|| malformed(&build_file, "no AssemblyName element"))?,
    };

    let output_dir = match output_dir.filter(|dir| !dir.as_os_str().is_empty()) {
        Some(dir) => root.join(dir),
        None => {
            let output_path = doc
                .first_text("OutputPath")
                .ok_or_else(|| malformed(&build_file, "no OutputPath element"))?;
            root.join(msbuild_to_host_path(output_path))
        }
    };

    log::debug!(
        "Assembly '{}' in {}",
        assembly_name,
        output_dir.display()
    );

    Ok(ProjectDescriptor {
        item_groups: ItemGroup::read_all(&doc),
        root,
        build_file,
        assembly_name,
        output_dir,
    })
}

pub fn load_project_document(build_file: &Path) -> Result<XmlDocument> {
    XmlDocument::load(build_file)?.map_err(|e| malformed(build_file, &e.to_string()))
}

/// Lexically first build file directly inside `dir`
pub fn find_build_file(dir: &Path) -> Result<Option<PathBuf>> {
    let escaped = glob::Pattern::escape(&dir.to_string_lossy());
    let mut candidates = Vec::new();

    for pattern in BUILD_FILE_PATTERNS {
        let full = format!("{}/{}", escaped, pattern);
        let paths = glob::glob(&full).map_err(|e| {
            MigrateError::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
        })?;
        candidates.extend(paths.filter_map(|p| p.ok()).filter(|p| p.is_file()));
    }

    candidates.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    if candidates.len() > 1 {
        let others: Vec<String> = candidates[1..]
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        log::warn!(
            "Several project files in {}; using {} and ignoring {}",
            dir.display(),
            candidates[0].display(),
            others.join(", ")
        );
    }

    Ok(candidates.into_iter().next())
}

fn malformed(path: &Path, message: &str) -> MigrateError {
    MigrateError::MalformedProjectFile {
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}
