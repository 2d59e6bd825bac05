//! Resolves the migration configuration declared by a compiled assembly
//!
//! The build emits `<AssemblyName>.migrations.json` next to the assembly. It
//! lists the types the assembly exposes and names the engine command able to
//! load them. A type qualifies as a migration configuration when it declares
//! both a target context type and a migration-history table.

use crate::config::RuntimeConfiguration;
use crate::error::{MigrateError, Result};
use crate::project::ProjectDescriptor;
use crate::settings::EngineCommand;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const MANIFEST_SUFFIX: &str = ".migrations.json";
const ASSEMBLY_EXTENSIONS: &[&str] = &["dll", "exe"];
const DEFAULT_MIGRATIONS_DIRECTORY: &str = "Migrations";
const DEFAULT_LANGUAGE: &str = "cs";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub engine: Option<EngineCommand>,

    #[serde(default)]
    pub types: Vec<ManifestType>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ManifestType {
    pub name: String,

    #[serde(default)]
    pub context_type: Option<String>,

    #[serde(default)]
    pub history_table: Option<String>,

    #[serde(default)]
    pub migrations_directory: Option<String>,

    #[serde(default)]
    pub language: Option<String>,
}

impl ManifestType {
    pub fn is_migration_configuration(&self) -> bool {
        let present = |value: &Option<String>| value.as_deref().is_some_and(|v| !v.trim().is_empty());
        present(&self.context_type) && present(&self.history_table)
    }
}

/// Everything the engine needs to work on one project's data context
#[derive(Debug, Clone, Serialize)]
pub struct MigrationConfigurationHandle {
    pub project_root: PathBuf,
    pub assembly_name: String,
    pub assembly_path: PathBuf,
    pub configuration_type: String,
    pub context_type: String,
    pub history_table: String,
    pub migrations_directory: String,
    pub language: String,
    pub config_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_name: Option<String>,
    #[serde(skip)]
    pub engine: EngineCommand,
}

#[derive(Debug)]
pub struct AssemblyConfigurationLoader<'a> {
    project_root: &'a Path,
    output_dir: &'a Path,
    assembly_name: &'a str,
}

impl<'a> AssemblyConfigurationLoader<'a> {
    pub fn new(project_root: &'a Path, output_dir: &'a Path, assembly_name: &'a str) -> Self {
        Self {
            project_root,
            output_dir,
            assembly_name,
        }
    }

    pub fn for_project(project: &'a ProjectDescriptor) -> Self {
        Self::new(&project.root, &project.output_dir, &project.assembly_name)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.output_dir
            .join(format!("{}{}", self.assembly_name, MANIFEST_SUFFIX))
    }

    /// Locate the compiled assembly in the output directory
    pub fn assembly_path(&self) -> Result<PathBuf> {
        ASSEMBLY_EXTENSIONS
            .iter()
            .map(|ext| self.output_dir.join(format!("{}.{}", self.assembly_name, ext)))
            .find(|path| path.is_file())
            .ok_or_else(|| MigrateError::AssemblyNotFound {
                path: self
                    .output_dir
                    .join(format!("{}.{}", self.assembly_name, ASSEMBLY_EXTENSIONS[0])),
            })
    }

    pub fn read_manifest(&self) -> Result<Manifest> {
        let path = self.manifest_path();
        if !path.is_file() {
            return Err(MigrateError::AssemblyNotFound { path });
        }
        let content = fs::read_to_string(&path)?;
        serde_json::from_str(&content).map_err(|e| MigrateError::MalformedManifest {
            path,
            message: e.to_string(),
        })
    }

    /// Build a fresh handle for the single migration configuration
    pub fn load(
        &self,
        runtime: &RuntimeConfiguration,
        connection_name: Option<&str>,
        engine_override: Option<&EngineCommand>,
    ) -> Result<MigrationConfigurationHandle> {
        let assembly_path = self.assembly_path()?;
        let manifest = self.read_manifest()?;
        let selected = self.select(&manifest)?;

        let engine = engine_override
            .cloned()
            .or_else(|| manifest.engine.clone())
            .ok_or_else(|| MigrateError::MalformedManifest {
                path: self.manifest_path(),
                message: "no engine command declared".to_string(),
            })?;

        log::info!(
            "Using migration configuration {} from {}",
            selected.name,
            assembly_path.display()
        );

        Ok(MigrationConfigurationHandle {
            project_root: self.project_root.to_path_buf(),
            assembly_name: self.assembly_name.to_string(),
            assembly_path,
            configuration_type: selected.name.clone(),
            context_type: selected.context_type.clone().unwrap_or_default(),
            history_table: selected.history_table.clone().unwrap_or_default(),
            migrations_directory: selected
                .migrations_directory
                .clone()
                .unwrap_or_else(|| DEFAULT_MIGRATIONS_DIRECTORY.to_string()),
            language: selected
                .language
                .clone()
                .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
            config_path: runtime.path.clone(),
            connection_name: connection_name.map(str::to_string),
            engine,
        })
    }

    /// Exactly one qualifying type, otherwise an error naming the problem
    pub fn select<'m>(&self, manifest: &'m Manifest) -> Result<&'m ManifestType> {
        let candidates: Vec<&ManifestType> = manifest
            .types
            .iter()
            .filter(|t| t.is_migration_configuration())
            .collect();

        match candidates.as_slice() {
            [] => Err(MigrateError::ConfigurationTypeNotFound {
                assembly: self.assembly_name.to_string(),
            }),
            [single] => Ok(single),
            many => Err(MigrateError::AmbiguousConfigurationType {
                assembly: self.assembly_name.to_string(),
                candidates: many.iter().map(|t| t.name.clone()).collect(),
            }),
        }
    }
}
