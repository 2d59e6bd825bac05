//! Error taxonomy for the migration pipeline

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, MigrateError>;

/// Every way an invocation can stop before reaching `Done`
#[derive(Error, Debug)]
pub enum MigrateError {
    #[error("Usage error: {0}")]
    Usage(String),

    #[error("Could not find a project file starting from {}", .start.display())]
    ProjectNotFound { start: PathBuf },

    #[error("Malformed project file {}: {message}", .path.display())]
    MalformedProjectFile { path: PathBuf, message: String },

    #[error("Malformed configuration file {}: {message}", .path.display())]
    MalformedConfiguration { path: PathBuf, message: String },

    #[error("Failed to persist merged configuration {}: {source}", .path.display())]
    ConfigurationMergeConflict {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Compiled output not found: {}", .path.display())]
    AssemblyNotFound { path: PathBuf },

    #[error("Malformed migrations manifest {}: {message}", .path.display())]
    MalformedManifest { path: PathBuf, message: String },

    #[error("No migration configuration type found in assembly '{assembly}'")]
    ConfigurationTypeNotFound { assembly: String },

    #[error("More than one migration configuration type found in assembly '{assembly}': {}", .candidates.join(", "))]
    AmbiguousConfigurationType {
        assembly: String,
        candidates: Vec<String>,
    },

    #[error("No model changes since the last migration")]
    NoModelChanges,

    #[error("{0}")]
    Engine(String),

    #[error("Invalid scaffold result: {0}")]
    InvalidScaffold(String),

    #[error("Failed to write {}: {source}", .path.display())]
    ArtifactWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid settings file {}: {message}", .path.display())]
    Settings { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MigrateError {
    /// Stable name printed next to the message on stderr
    pub fn kind(&self) -> &'static str {
        match self {
            MigrateError::Usage(_) => "Usage",
            MigrateError::ProjectNotFound { .. } => "ProjectNotFound",
            MigrateError::MalformedProjectFile { .. } => "MalformedProjectFile",
            MigrateError::MalformedConfiguration { .. } => "MalformedConfiguration",
            MigrateError::ConfigurationMergeConflict { .. } => "ConfigurationMergeConflict",
            MigrateError::AssemblyNotFound { .. } => "AssemblyNotFound",
            MigrateError::MalformedManifest { .. } => "MalformedManifest",
            MigrateError::ConfigurationTypeNotFound { .. } => "ConfigurationTypeNotFound",
            MigrateError::AmbiguousConfigurationType { .. } => "AmbiguousConfigurationType",
            MigrateError::NoModelChanges => "NoModelChanges",
            MigrateError::Engine(_) => "Engine",
            MigrateError::InvalidScaffold(_) => "InvalidScaffold",
            MigrateError::ArtifactWrite { .. } => "ArtifactWrite",
            MigrateError::Settings { .. } => "Settings",
            MigrateError::Io(_) => "Io",
        }
    }

    /// Remediation hint for setup errors, `None` when the message says it all
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            MigrateError::Usage(_) => Some("Run with --help to see the accepted flags."),
            MigrateError::ProjectNotFound { .. } => {
                Some("Run from inside the project or pass --base-folder.")
            }
            MigrateError::MalformedProjectFile { .. } => {
                Some("Pass --assembly-name and --bin-folder, or fix the project file.")
            }
            MigrateError::MalformedConfiguration { .. } => {
                Some("Fix the XML of the configuration file or pass --config-path.")
            }
            MigrateError::ConfigurationMergeConflict { .. } => {
                Some("Make sure app.config is writable and not locked by another process.")
            }
            MigrateError::AssemblyNotFound { .. } => {
                Some("Build the project first, or point --bin-folder at its output.")
            }
            MigrateError::MalformedManifest { .. } => {
                Some("Rebuild the project to regenerate the migrations manifest.")
            }
            MigrateError::ConfigurationTypeNotFound { .. } => {
                Some("Enable migrations in the project so the build declares a configuration type.")
            }
            MigrateError::AmbiguousConfigurationType { .. } => {
                Some("Keep a single migration configuration per assembly.")
            }
            MigrateError::Settings { .. } => Some("Check the syntax of ef-migrations.toml."),
            _ => None,
        }
    }

    /// Process exit code for this failure
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Usage(_) => 2,
            MigrateError::NoModelChanges => 0,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(MigrateError::Usage("missing name".into()).exit_code(), 2);
        assert_eq!(MigrateError::NoModelChanges.exit_code(), 0);
        assert_eq!(MigrateError::Engine("boom".into()).exit_code(), 1);
    }

    #[test]
    fn test_engine_message_is_verbatim() {
        let err = MigrateError::Engine("Login failed for user 'sa'.".into());
        assert_eq!(err.to_string(), "Login failed for user 'sa'.");
        assert!(err.hint().is_none());
    }

    #[test]
    fn test_ambiguous_lists_candidates() {
        let err = MigrateError::AmbiguousConfigurationType {
            assembly: "Foo".into(),
            candidates: vec!["Foo.A".into(), "Foo.B".into()],
        };
        assert!(err.to_string().ends_with("Foo.A, Foo.B"));
        assert_eq!(err.kind(), "AmbiguousConfigurationType");
    }
}
