//! Sequences one invocation through discovery, loading and the engine

use crate::config::{ConfigKind, ConfigurationResolver};
use crate::engine::{MigrationEngine, MigrationId, PendingMigrationSet};
use crate::error::{MigrateError, Result};
use crate::integrator::{IntegrationReport, ProjectFileIntegrator};
use crate::loader::{AssemblyConfigurationLoader, MigrationConfigurationHandle};
use crate::project::{describe, LocateOptions, ProjectDescriptor, ProjectLocator};
use crate::settings::Settings;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::PathBuf;

static MIGRATION_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid migration name pattern"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    AddMigration {
        name: String,
    },
    PendingMigrations,
    UpdateDatabase {
        target: Option<MigrationId>,
    },
    GenerateScript {
        source: Option<MigrationId>,
        target: Option<MigrationId>,
    },
}

impl Action {
    /// Checked constructor; the name becomes part of file and class names
    pub fn add_migration(name: Option<&str>) -> Result<Self> {
        let name = name.map(str::trim).unwrap_or_default();
        if name.is_empty() {
            return Err(MigrateError::Usage(
                "AddMigration requires a migration name (--name)".to_string(),
            ));
        }
        if !MIGRATION_NAME.is_match(name) {
            return Err(MigrateError::Usage(format!(
                "'{}' is not a valid migration name; use letters, digits and underscores, not starting with a digit",
                name
            )));
        }
        Ok(Action::AddMigration {
            name: name.to_string(),
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Action::AddMigration { .. } => "AddMigration",
            Action::PendingMigrations => "PendingMigrations",
            Action::UpdateDatabase { .. } => "UpdateDatabase",
            Action::GenerateScript { .. } => "GenerateScript",
        }
    }
}

/// One invocation's inputs; unset values fall back to the settings file,
/// then to what the project declares
#[derive(Debug, Clone)]
pub struct Request {
    pub action: Action,
    pub locate: LocateOptions,
    pub config_path: Option<PathBuf>,
    pub connection_name: Option<String>,
    pub merge_config: bool,
}

impl Request {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            locate: LocateOptions::default(),
            config_path: None,
            connection_name: None,
            merge_config: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Resolving,
    Loaded,
    Executing,
    Done,
    Failed,
}

#[derive(Debug, Clone)]
pub enum Outcome {
    MigrationAdded(IntegrationReport),
    /// The model matches the last migration; nothing was written
    NoModelChanges,
    Pending(PendingMigrationSet),
    DatabaseUpdated { target: Option<MigrationId> },
    Script(String),
}

pub struct Orchestrator<'e> {
    engine: &'e dyn MigrationEngine,
    locator: ProjectLocator,
    stage: Stage,
}

impl<'e> Orchestrator<'e> {
    pub fn new(engine: &'e dyn MigrationEngine, locator: ProjectLocator) -> Self {
        Self {
            engine,
            locator,
            stage: Stage::Idle,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Run the request to completion; the orchestrator ends in `Done` or `Failed`
    pub fn run(&mut self, request: &Request) -> Result<Outcome> {
        let result = self.execute(request);
        match &result {
            Ok(_) => self.transition(Stage::Done),
            Err(e) => {
                log::debug!("{} failed: {}", request.action.name(), e);
                self.transition(Stage::Failed);
            }
        }
        result
    }

    fn execute(&mut self, request: &Request) -> Result<Outcome> {
        if let Action::AddMigration { name } = &request.action {
            Action::add_migration(Some(name))?;
        }

        self.transition(Stage::Resolving);
        let (project, handle) = self.resolve(request)?;
        self.transition(Stage::Loaded);

        self.transition(Stage::Executing);
        match &request.action {
            Action::AddMigration { name } => match self.engine.scaffold(&handle, name) {
                Ok(scaffold) => {
                    let report = ProjectFileIntegrator::new(&project).integrate(&scaffold)?;
                    Ok(Outcome::MigrationAdded(report))
                }
                Err(MigrateError::NoModelChanges) => Ok(Outcome::NoModelChanges),
                Err(e) => Err(e),
            },
            Action::PendingMigrations => Ok(Outcome::Pending(self.engine.list_pending(&handle)?)),
            Action::UpdateDatabase { target } => {
                self.engine.update(&handle, target.as_ref())?;
                Ok(Outcome::DatabaseUpdated {
                    target: target.clone(),
                })
            }
            Action::GenerateScript { source, target } => Ok(Outcome::Script(
                self.engine
                    .script_update(&handle, source.as_ref(), target.as_ref())?,
            )),
        }
    }

    fn resolve(&self, request: &Request) -> Result<(ProjectDescriptor, MigrationConfigurationHandle)> {
        let (root, build_file) = self.locator.find_root(request.locate.root.as_deref())?;
        let settings = Settings::load(&root)?;

        let project = describe(
            root,
            build_file,
            request
                .locate
                .assembly_name
                .clone()
                .or_else(|| settings.assembly_name.clone()),
            request
                .locate
                .output_dir
                .clone()
                .or_else(|| settings.bin_folder.clone()),
        )?;

        let resolver = ConfigurationResolver::new(&project.root);
        let config_path = request
            .config_path
            .as_deref()
            .or(settings.config_path.as_deref());
        let mut runtime = resolver.resolve(config_path)?;
        if request.merge_config || settings.merge_config {
            if runtime.kind == ConfigKind::Hosting {
                runtime = resolver.merge_into_execution(&runtime)?;
            } else {
                log::warn!(
                    "Skipping configuration merge: {} is not a hosting configuration",
                    runtime.path.display()
                );
            }
        }

        let connection_name = request
            .connection_name
            .as_deref()
            .or(settings.connection_name.as_deref());
        if let Some(name) = connection_name {
            if runtime.connection(name).is_none() {
                log::warn!(
                    "Connection string '{}' is not declared in {}",
                    name,
                    runtime.path.display()
                );
            }
        }

        let handle = AssemblyConfigurationLoader::for_project(&project).load(
            &runtime,
            connection_name,
            settings.engine.as_ref(),
        )?;
        Ok((project, handle))
    }

    fn transition(&mut self, next: Stage) {
        log::debug!("Stage {:?} -> {:?}", self.stage, next);
        self.stage = next;
    }
}
