//! Engine bridge speaking JSON over the stdio of a child process
//!
//! One request per process: the request object is written to stdin, stdin is
//! closed, and a single response object is read from stdout.

use super::{MigrationEngine, MigrationId, PendingMigrationSet, ScaffoldResult};
use crate::error::{MigrateError, Result};
use crate::loader::MigrationConfigurationHandle;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::Write;
use std::process::{Command, Stdio};

#[derive(Debug, Serialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
enum EngineRequest<'a> {
    Scaffold {
        configuration: &'a MigrationConfigurationHandle,
        migration_name: &'a str,
    },
    ListPending {
        configuration: &'a MigrationConfigurationHandle,
    },
    Update {
        configuration: &'a MigrationConfigurationHandle,
        target_migration: Option<&'a MigrationId>,
    },
    ScriptUpdate {
        configuration: &'a MigrationConfigurationHandle,
        source_migration: Option<&'a MigrationId>,
        target_migration: Option<&'a MigrationId>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum EngineResponse {
    #[serde(rename = "ok")]
    Success {
        #[serde(default)]
        result: Value,
    },
    NoModelChanges,
    Error {
        message: String,
    },
}

/// Runs the handle's engine command from the project root
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEngine;

impl ProcessEngine {
    fn call<T: DeserializeOwned>(
        &self,
        handle: &MigrationConfigurationHandle,
        request: &EngineRequest<'_>,
    ) -> Result<T> {
        let payload = serde_json::to_vec(request)
            .map_err(|e| MigrateError::Engine(format!("Failed to encode engine request: {}", e)))?;

        let engine = &handle.engine;
        log::debug!("Running engine: {} {}", engine.command, engine.args.join(" "));

        let mut child = Command::new(&engine.command)
            .args(&engine.args)
            .current_dir(&handle.project_root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                MigrateError::Engine(format!("Failed to start engine '{}': {}", engine.command, e))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            // an engine that exits without reading still gets its answer parsed
            if let Err(e) = stdin.write_all(&payload) {
                log::debug!("Engine closed stdin early: {}", e);
            }
        }

        let output = child.wait_with_output()?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        let response: EngineResponse = match serde_json::from_str(stdout.trim()) {
            Ok(response) => response,
            Err(e) => {
                let message = if stderr.trim().is_empty() {
                    format!("Engine exited with {} and no readable response: {}", output.status, e)
                } else {
                    stderr.trim().to_string()
                };
                return Err(MigrateError::Engine(message));
            }
        };

        if !stderr.trim().is_empty() {
            log::debug!("Engine stderr: {}", stderr.trim());
        }

        match response {
            EngineResponse::Success { result } => serde_json::from_value(result)
                .map_err(|e| MigrateError::Engine(format!("Unexpected engine result: {}", e))),
            EngineResponse::NoModelChanges => Err(MigrateError::NoModelChanges),
            EngineResponse::Error { message } => Err(MigrateError::Engine(message)),
        }
    }
}

impl MigrationEngine for ProcessEngine {
    fn scaffold(&self, handle: &MigrationConfigurationHandle, name: &str) -> Result<ScaffoldResult> {
        self.call(
            handle,
            &EngineRequest::Scaffold {
                configuration: handle,
                migration_name: name,
            },
        )
    }

    fn list_pending(&self, handle: &MigrationConfigurationHandle) -> Result<PendingMigrationSet> {
        self.call(handle, &EngineRequest::ListPending { configuration: handle })
    }

    fn update(&self, handle: &MigrationConfigurationHandle, target: Option<&MigrationId>) -> Result<()> {
        self.call(
            handle,
            &EngineRequest::Update {
                configuration: handle,
                target_migration: target,
            },
        )
    }

    fn script_update(
        &self,
        handle: &MigrationConfigurationHandle,
        source: Option<&MigrationId>,
        target: Option<&MigrationId>,
    ) -> Result<String> {
        self.call(
            handle,
            &EngineRequest::ScriptUpdate {
                configuration: handle,
                source_migration: source,
                target_migration: target,
            },
        )
    }
}
