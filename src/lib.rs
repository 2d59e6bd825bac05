//! Migration scaffolding for MSBuild projects
//!
//! Finds the project around the working directory, resolves its runtime
//! configuration and compiled migration configuration, and drives an external
//! migration engine to scaffold migrations, list pending ones, update the
//! database or generate a SQL script. New migrations are written to disk and
//! referenced from the project's build file.

pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod integrator;
pub mod loader;
pub mod orchestrator;
pub mod project;
pub mod settings;

pub use engine::{MigrationEngine, MigrationId, PendingMigrationSet, ProcessEngine, ScaffoldResult};
pub use error::{MigrateError, Result};
pub use orchestrator::{Action, Orchestrator, Outcome, Request, Stage};
pub use project::{LocateOptions, ProjectLocator};
