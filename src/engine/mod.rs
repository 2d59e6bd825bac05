//! Contract with the migration-scaffolding engine
//!
//! The engine diffs the data model against migration history and produces
//! code and SQL. This crate only calls it; [`ProcessEngine`] is the bridge to
//! an engine running as a separate program.

mod process;

pub use process::ProcessEngine;

use crate::error::Result;
use crate::loader::MigrationConfigurationHandle;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamp-prefixed migration identifier; lexical order is chronological
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MigrationId(String);

impl MigrationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MigrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MigrationId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for MigrationId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScaffoldResult {
    pub migration_id: MigrationId,
    /// Source language tag, also used as the file extension
    pub language: String,
    pub user_code: String,
    pub designer_code: String,
    /// Target directory relative to the project root
    pub directory: String,
    #[serde(default)]
    pub resources: IndexMap<String, String>,
}

impl ScaffoldResult {
    pub fn primary_file_name(&self) -> String {
        format!("{}.{}", self.migration_id, self.language)
    }

    pub fn designer_file_name(&self) -> String {
        format!("{}.Designer.{}", self.migration_id, self.language)
    }

    pub fn resource_file_name(&self) -> String {
        format!("{}.resx", self.migration_id)
    }
}

/// Migrations known to the engine but not yet applied, oldest first
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<MigrationId>", into = "Vec<MigrationId>")]
pub struct PendingMigrationSet(Vec<MigrationId>);

impl PendingMigrationSet {
    pub fn new(ids: impl IntoIterator<Item = MigrationId>) -> Self {
        let mut ids: Vec<MigrationId> = ids.into_iter().collect();
        ids.sort();
        ids.dedup();
        Self(ids)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MigrationId> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<MigrationId>> for PendingMigrationSet {
    fn from(ids: Vec<MigrationId>) -> Self {
        Self::new(ids)
    }
}

impl From<PendingMigrationSet> for Vec<MigrationId> {
    fn from(set: PendingMigrationSet) -> Self {
        set.0
    }
}

pub trait MigrationEngine {
    /// Scaffold a migration for the model changes since the last one
    ///
    /// Fails with `MigrateError::NoModelChanges` when there is nothing to
    /// scaffold.
    fn scaffold(&self, handle: &MigrationConfigurationHandle, name: &str) -> Result<ScaffoldResult>;

    fn list_pending(&self, handle: &MigrationConfigurationHandle) -> Result<PendingMigrationSet>;

    /// Apply pending migrations up to and including `target`, or all of them
    fn update(&self, handle: &MigrationConfigurationHandle, target: Option<&MigrationId>) -> Result<()>;

    /// SQL moving the database from `source` (empty database when `None`)
    /// to `target` (latest when `None`)
    fn script_update(
        &self,
        handle: &MigrationConfigurationHandle,
        source: Option<&MigrationId>,
        target: Option<&MigrationId>,
    ) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_set_is_chronological() {
        let set = PendingMigrationSet::new(vec![
            MigrationId::from("201603011200000_AddOrders"),
            MigrationId::from("201501011200000_InitialCreate"),
            MigrationId::from("201603011200000_AddOrders"),
        ]);
        let ids: Vec<&str> = set.iter().map(MigrationId::as_str).collect();
        assert_eq!(
            ids,
            vec!["201501011200000_InitialCreate", "201603011200000_AddOrders"]
        );
    }

    #[test]
    fn test_pending_set_deserializes_sorted() {
        let set: PendingMigrationSet = serde_json::from_str(r#"["2_B", "1_A"]"#).unwrap();
        assert_eq!(set.iter().next().unwrap().as_str(), "1_A");
    }

    #[test]
    fn test_artifact_file_names() {
        let scaffold = ScaffoldResult {
            migration_id: "201501011200000_InitialCreate".into(),
            language: "cs".into(),
            user_code: String::new(),
            designer_code: String::new(),
            directory: "Migrations".into(),
            resources: IndexMap::new(),
        };
        assert_eq!(scaffold.primary_file_name(), "201501011200000_InitialCreate.cs");
        assert_eq!(
            scaffold.designer_file_name(),
            "201501011200000_InitialCreate.Designer.cs"
        );
        assert_eq!(scaffold.resource_file_name(), "201501011200000_InitialCreate.resx");
    }
}
