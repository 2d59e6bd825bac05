use crate::document::XmlDocument;
use std::path::{Path, PathBuf};

/// Default MSBuild namespace for classic project files
pub const PROJECT_NAMESPACE: &str = "http://schemas.microsoft.com/developer/msbuild/2003";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryRole {
    Compile,
    EmbeddedResource,
    Other(String),
}

impl EntryRole {
    pub fn from_element(name: &str) -> Self {
        match name {
            "Compile" => EntryRole::Compile,
            "EmbeddedResource" => EntryRole::EmbeddedResource,
            other => EntryRole::Other(other.to_string()),
        }
    }

    pub fn element_name(&self) -> &str {
        match self {
            EntryRole::Compile => "Compile",
            EntryRole::EmbeddedResource => "EmbeddedResource",
            EntryRole::Other(name) => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildEntry {
    pub role: EntryRole,
    pub include: String,
    pub dependent_upon: Option<String>,
}

impl BuildEntry {
    pub fn new(role: EntryRole, include: impl Into<String>) -> Self {
        Self {
            role,
            include: include.into(),
            dependent_upon: None,
        }
    }

    pub fn dependent_upon(mut self, primary: impl Into<String>) -> Self {
        self.dependent_upon = Some(primary.into());
        self
    }

    /// Whether this entry points at `path`, ignoring case and separator style
    pub fn includes(&self, path: &str) -> bool {
        normalize_include(&self.include) == normalize_include(path)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemGroup {
    pub condition: Option<String>,
    pub entries: Vec<BuildEntry>,
}

impl ItemGroup {
    /// Read the top-level item groups of a project document, in order
    pub fn read_all(doc: &XmlDocument) -> Vec<ItemGroup> {
        doc.children_named(doc.root(), "ItemGroup")
            .map(|group| ItemGroup {
                condition: doc.element(group).attribute("Condition").map(str::to_string),
                entries: doc
                    .children(group)
                    .filter_map(|item| {
                        let el = doc.element(item);
                        let include = el.attribute("Include")?;
                        let dependent_upon = doc
                            .children_named(item, "DependentUpon")
                            .next()
                            .map(|dep| doc.element(dep).text().to_string());
                        Some(BuildEntry {
                            role: EntryRole::from_element(&el.name),
                            include: include.to_string(),
                            dependent_upon,
                        })
                    })
                    .collect(),
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct ProjectDescriptor {
    pub root: PathBuf,
    pub build_file: PathBuf,
    pub assembly_name: String,
    pub output_dir: PathBuf,
    pub item_groups: Vec<ItemGroup>,
}

impl ProjectDescriptor {
    pub fn entries(&self) -> impl Iterator<Item = &BuildEntry> {
        self.item_groups.iter().flat_map(|group| group.entries.iter())
    }

    pub fn references(&self, include: &str) -> bool {
        self.entries().any(|entry| entry.includes(include))
    }
}

fn normalize_include(path: &str) -> String {
    path.replace('/', "\\")
        .trim_start_matches(".\\")
        .to_lowercase()
}

/// Convert an MSBuild path (backslash separated) to a host path
pub fn msbuild_to_host_path(path: &str) -> PathBuf {
    if Path::new(path).is_absolute() {
        return PathBuf::from(path);
    }
    path.split(['\\', '/'])
        .filter(|part| !part.is_empty())
        .collect()
}
