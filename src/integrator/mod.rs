//! Persists scaffolded migrations and references them from the project file

mod resx;

pub use resx::to_resx;

use crate::engine::{MigrationId, ScaffoldResult};
use crate::error::{MigrateError, Result};
use crate::project::{
    load_project_document, msbuild_to_host_path, BuildEntry, EntryRole, ItemGroup,
    ProjectDescriptor,
};
use std::fs;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone)]
pub struct IntegrationReport {
    pub migration_id: MigrationId,
    pub written: Vec<PathBuf>,
    pub entries: Vec<BuildEntry>,
    /// False when the project already referenced the migration
    pub item_group_added: bool,
}

#[derive(Debug)]
pub struct ProjectFileIntegrator<'a> {
    project: &'a ProjectDescriptor,
}

impl<'a> ProjectFileIntegrator<'a> {
    pub fn new(project: &'a ProjectDescriptor) -> Self {
        Self { project }
    }

    /// Write the artifacts, then append one item group referencing them
    ///
    /// The project file is only touched after every artifact is on disk.
    pub fn integrate(&self, scaffold: &ScaffoldResult) -> Result<IntegrationReport> {
        validate(scaffold)?;

        let written = self.write_artifacts(scaffold)?;
        let entries = plan_entries(scaffold);

        let build_file = &self.project.build_file;
        let doc = load_project_document(build_file)?;
        let primary = &entries[0].include;

        let already_referenced = ItemGroup::read_all(&doc)
            .iter()
            .flat_map(|group| group.entries.iter())
            .any(|entry| entry.includes(primary));
        if already_referenced {
            log::warn!(
                "{} already references {}; leaving it unchanged",
                build_file.display(),
                primary
            );
            return Ok(IntegrationReport {
                migration_id: scaffold.migration_id.clone(),
                written,
                entries,
                item_group_added: false,
            });
        }

        let fragment = render_item_group(&entries, &doc.indent_unit());
        let updated = match doc.children_named(doc.root(), "ItemGroup").last() {
            Some(last) => doc.insert_after(last, &fragment),
            None => doc.append_child(doc.root(), &fragment),
        };

        fs::write(build_file, updated).map_err(|source| MigrateError::ArtifactWrite {
            path: build_file.clone(),
            source,
        })?;
        log::info!(
            "Added {} entries for {} to {}",
            entries.len(),
            scaffold.migration_id,
            build_file.display()
        );

        Ok(IntegrationReport {
            migration_id: scaffold.migration_id.clone(),
            written,
            entries,
            item_group_added: true,
        })
    }

    fn write_artifacts(&self, scaffold: &ScaffoldResult) -> Result<Vec<PathBuf>> {
        let dir = self
            .project
            .root
            .join(msbuild_to_host_path(&scaffold.directory));
        fs::create_dir_all(&dir).map_err(|source| MigrateError::ArtifactWrite {
            path: dir.clone(),
            source,
        })?;

        let mut files = vec![
            (dir.join(scaffold.primary_file_name()), scaffold.user_code.clone()),
            (dir.join(scaffold.designer_file_name()), scaffold.designer_code.clone()),
        ];
        if !scaffold.resources.is_empty() {
            files.push((dir.join(scaffold.resource_file_name()), to_resx(&scaffold.resources)));
        }

        let mut written = Vec::with_capacity(files.len());
        for (path, content) in files {
            write_file(&path, &content)?;
            log::info!("Wrote {}", path.display());
            written.push(path);
        }
        Ok(written)
    }
}

/// Entries for one migration: primary, designer, and resources if any
pub fn plan_entries(scaffold: &ScaffoldResult) -> Vec<BuildEntry> {
    let primary_name = scaffold.primary_file_name();
    let mut entries = vec![
        BuildEntry::new(EntryRole::Compile, include_path(&scaffold.directory, &primary_name)),
        BuildEntry::new(
            EntryRole::Compile,
            include_path(&scaffold.directory, &scaffold.designer_file_name()),
        )
        .dependent_upon(primary_name.clone()),
    ];
    if !scaffold.resources.is_empty() {
        entries.push(
            BuildEntry::new(
                EntryRole::EmbeddedResource,
                include_path(&scaffold.directory, &scaffold.resource_file_name()),
            )
            .dependent_upon(primary_name),
        );
    }
    entries
}

/// Item group markup with relative indentation; no namespace declaration so
/// the elements inherit the project's default namespace
fn render_item_group(entries: &[BuildEntry], unit: &str) -> String {
    let mut lines = vec!["<ItemGroup>".to_string()];
    for entry in entries {
        let element = entry.role.element_name();
        let include = crate::document::escape(&entry.include);
        match &entry.dependent_upon {
            Some(primary) => {
                lines.push(format!("{}<{} Include=\"{}\">", unit, element, include));
                lines.push(format!(
                    "{}{}<DependentUpon>{}</DependentUpon>",
                    unit,
                    unit,
                    crate::document::escape(primary)
                ));
                lines.push(format!("{}</{}>", unit, element));
            }
            None => lines.push(format!("{}<{} Include=\"{}\" />", unit, element, include)),
        }
    }
    lines.push("</ItemGroup>".to_string());
    lines.join("\n")
}

/// MSBuild include path: backslash separated, relative to the project root
fn include_path(directory: &str, file_name: &str) -> String {
    let dir: Vec<&str> = directory
        .split(['\\', '/'])
        .filter(|part| !part.is_empty() && *part != ".")
        .collect();
    if dir.is_empty() {
        file_name.to_string()
    } else {
        format!("{}\\{}", dir.join("\\"), file_name)
    }
}

fn validate(scaffold: &ScaffoldResult) -> Result<()> {
    let id = scaffold.migration_id.as_str();
    if id.trim().is_empty() || id.contains(['/', '\\']) {
        return Err(MigrateError::InvalidScaffold(format!(
            "migration id '{}' is not a file name",
            id
        )));
    }
    if scaffold.language.trim().is_empty()
        || !scaffold.language.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return Err(MigrateError::InvalidScaffold(format!(
            "language tag '{}' is not a file extension",
            scaffold.language
        )));
    }

    let dir = msbuild_to_host_path(&scaffold.directory);
    let escapes = dir.is_absolute()
        || scaffold.directory.contains(':')
        || dir
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(MigrateError::InvalidScaffold(format!(
            "directory '{}' is outside the project",
            scaffold.directory
        )));
    }
    Ok(())
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    fs::write(path, content).map_err(|source| MigrateError::ArtifactWrite {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::XmlDocument;
    use crate::project::{describe, PROJECT_NAMESPACE};
    use indexmap::IndexMap;
    use tempfile::TempDir;

    const PROJECT: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<Project ToolsVersion="12.0" DefaultTargets="Build" xmlns="http://schemas.microsoft.com/developer/msbuild/2003">
  <PropertyGroup>
    <AssemblyName>Foo</AssemblyName>
    <OutputPath>bin\Debug\</OutputPath>
  </PropertyGroup>
  <ItemGroup>
    <Reference Include="System" />
  </ItemGroup>
  <ItemGroup>
    <Compile Include="Program.cs" />
    <Compile Include="Migrations\Configuration.cs" />
  </ItemGroup>
  <Import Project="$(MSBuildToolsPath)\Microsoft.CSharp.targets" />
</Project>
"#;

    fn project() -> (TempDir, ProjectDescriptor) {
        let dir = TempDir::new().unwrap();
        let build_file = dir.path().join("Foo.csproj");
        fs::write(&build_file, PROJECT).unwrap();
        let descriptor = describe(dir.path().to_path_buf(), build_file, None, None).unwrap();
        (dir, descriptor)
    }

    fn scaffold(id: &str, with_resources: bool) -> ScaffoldResult {
        let mut resources = IndexMap::new();
        if with_resources {
            resources.insert("Target".to_string(), "H4sIAAAAAAAEAO29".to_string());
        }
        ScaffoldResult {
            migration_id: id.into(),
            language: "cs".into(),
            user_code: "public partial class InitialCreate : DbMigration {}".into(),
            designer_code: "public sealed partial class InitialCreate : IMigrationMetadata {}".into(),
            directory: "Migrations".into(),
            resources,
        }
    }

    #[test]
    fn test_adds_one_item_group_after_existing_ones() {
        let (dir, descriptor) = project();
        let report = ProjectFileIntegrator::new(&descriptor)
            .integrate(&scaffold("201501011200000_InitialCreate", true))
            .unwrap();

        assert!(report.item_group_added);
        assert_eq!(report.written.len(), 3);
        for path in &report.written {
            assert!(path.is_file(), "missing {}", path.display());
        }

        let updated = fs::read_to_string(&descriptor.build_file).unwrap();
        let doc = XmlDocument::parse(&updated).unwrap();
        let groups = ItemGroup::read_all(&doc);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0], descriptor.item_groups[0]);
        assert_eq!(groups[1], descriptor.item_groups[1]);

        let added = &groups[2].entries;
        assert_eq!(added.len(), 3);
        assert_eq!(added[0].include, r"Migrations\201501011200000_InitialCreate.cs");
        assert_eq!(added[1].include, r"Migrations\201501011200000_InitialCreate.Designer.cs");
        assert_eq!(
            added[1].dependent_upon.as_deref(),
            Some("201501011200000_InitialCreate.cs")
        );
        assert_eq!(added[2].role, EntryRole::EmbeddedResource);
        assert_eq!(
            added[2].dependent_upon.as_deref(),
            Some("201501011200000_InitialCreate.cs")
        );

        // the new group sits before the Import, and nothing else moved
        let expected_tail = "  </ItemGroup>\n  <Import Project=\"$(MSBuildToolsPath)\\Microsoft.CSharp.targets\" />\n</Project>\n";
        assert!(updated.ends_with(expected_tail));
        assert!(updated.starts_with(&PROJECT[..PROJECT.find("  <Import").unwrap()]));
        assert_eq!(updated.matches(PROJECT_NAMESPACE).count(), 1);
        assert!(dir
            .path()
            .join("Migrations")
            .join("201501011200000_InitialCreate.Designer.cs")
            .is_file());
    }

    #[test]
    fn test_rerun_does_not_duplicate_entries() {
        let (_dir, descriptor) = project();
        let integrator = ProjectFileIntegrator::new(&descriptor);
        let migration = scaffold("201501011200000_InitialCreate", true);

        integrator.integrate(&migration).unwrap();
        let after_first = fs::read_to_string(&descriptor.build_file).unwrap();

        let report = integrator.integrate(&migration).unwrap();
        assert!(!report.item_group_added);
        assert_eq!(fs::read_to_string(&descriptor.build_file).unwrap(), after_first);
    }

    #[test]
    fn test_second_migration_goes_after_first() {
        let (_dir, descriptor) = project();
        let integrator = ProjectFileIntegrator::new(&descriptor);
        integrator
            .integrate(&scaffold("201501011200000_InitialCreate", false))
            .unwrap();
        integrator
            .integrate(&scaffold("201603011200000_AddOrders", false))
            .unwrap();

        let doc = XmlDocument::parse(&fs::read_to_string(&descriptor.build_file).unwrap()).unwrap();
        let groups = ItemGroup::read_all(&doc);
        assert_eq!(groups.len(), 4);
        assert!(groups[2].entries[0].include.ends_with("InitialCreate.cs"));
        assert!(groups[3].entries[0].include.ends_with("AddOrders.cs"));
        assert_eq!(groups[3].entries.len(), 2);
    }

    #[test]
    fn test_write_failure_leaves_project_file_untouched() {
        let (dir, descriptor) = project();
        // a plain file where the migrations directory should be
        fs::write(dir.path().join("Migrations"), "not a directory").unwrap();

        let err = ProjectFileIntegrator::new(&descriptor)
            .integrate(&scaffold("201501011200000_InitialCreate", true))
            .unwrap_err();
        assert!(matches!(err, MigrateError::ArtifactWrite { .. }));
        assert_eq!(fs::read_to_string(&descriptor.build_file).unwrap(), PROJECT);
    }

    #[test]
    fn test_project_without_item_groups() {
        let dir = TempDir::new().unwrap();
        let build_file = dir.path().join("Foo.csproj");
        fs::write(
            &build_file,
            "<Project>\n\t<PropertyGroup>\n\t\t<AssemblyName>Foo</AssemblyName>\n\t\t<OutputPath>bin</OutputPath>\n\t</PropertyGroup>\n</Project>\n",
        )
        .unwrap();
        let descriptor = describe(dir.path().to_path_buf(), build_file.clone(), None, None).unwrap();

        ProjectFileIntegrator::new(&descriptor)
            .integrate(&scaffold("1_Init", false))
            .unwrap();

        let updated = fs::read_to_string(&build_file).unwrap();
        assert!(updated.contains("\t</PropertyGroup>\n\t<ItemGroup>\n\t\t<Compile Include=\"Migrations\\1_Init.cs\" />\n"));
        assert!(updated.ends_with("\t</ItemGroup>\n</Project>\n"));
    }

    #[test]
    fn test_rejects_directories_outside_the_project() {
        let (_dir, descriptor) = project();
        let integrator = ProjectFileIntegrator::new(&descriptor);
        for directory in [r"..\Elsewhere", "/tmp/migrations", r"C:\Migrations"] {
            let mut migration = scaffold("1_Init", false);
            migration.directory = directory.to_string();
            let err = integrator.integrate(&migration).unwrap_err();
            assert_eq!(err.kind(), "InvalidScaffold", "{}", directory);
        }
    }

    #[test]
    fn test_include_paths_use_backslashes() {
        assert_eq!(include_path("Data/Migrations/", "1_Init.cs"), r"Data\Migrations\1_Init.cs");
        assert_eq!(include_path("", "1_Init.cs"), "1_Init.cs");
        assert_eq!(include_path(".", "1_Init.cs"), "1_Init.cs");
    }
}
