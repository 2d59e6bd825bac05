//! Runtime configuration selection and connection-string merging

use crate::document::{escape, DocumentError, XmlDocument};
use crate::error::{MigrateError, Result};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const HOSTING_CONFIG: &str = "Web.config";
pub const EXECUTION_CONFIG: &str = "app.config";

const EMPTY_EXECUTION_CONFIG: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<configuration>
  <connectionStrings>
  </connectionStrings>
</configuration>
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKind {
    /// Web-hosting style (`Web.config`)
    Hosting,
    /// Plain execution style (`app.config`)
    Execution,
}

impl ConfigKind {
    pub fn of(path: &Path) -> Self {
        let is_hosting = path
            .file_name()
            .map(|name| name.to_string_lossy().eq_ignore_ascii_case(HOSTING_CONFIG))
            .unwrap_or(false);
        if is_hosting {
            ConfigKind::Hosting
        } else {
            ConfigKind::Execution
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionString {
    pub name: String,
    pub connection_string: String,
    pub provider_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RuntimeConfiguration {
    pub path: PathBuf,
    pub kind: ConfigKind,
    pub connection_strings: Vec<ConnectionString>,
}

impl RuntimeConfiguration {
    pub fn connection(&self, name: &str) -> Option<&ConnectionString> {
        self.connection_strings
            .iter()
            .find(|cs| cs.name.eq_ignore_ascii_case(name))
    }
}

/// Which side of a merge could not be parsed
#[derive(Error, Debug)]
pub enum MergeError {
    #[error("hosting configuration: {0}")]
    Hosting(DocumentError),

    #[error("execution configuration: {0}")]
    Execution(DocumentError),
}

/// Result of merging hosting-level entries into an execution-level document
#[derive(Debug, Clone)]
pub struct MergedConfiguration {
    pub document: String,
    pub added: Vec<String>,
    pub skipped: Vec<String>,
}

#[derive(Debug)]
pub struct ConfigurationResolver {
    root: PathBuf,
}

impl ConfigurationResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Pick the configuration file the engine reads connection strings from
    pub fn resolve(&self, explicit: Option<&Path>) -> Result<RuntimeConfiguration> {
        let path = match explicit {
            Some(path) => self.root.join(path),
            None => {
                let hosting = self.root.join(HOSTING_CONFIG);
                if hosting.is_file() {
                    hosting
                } else {
                    self.root.join(EXECUTION_CONFIG)
                }
            }
        };

        let kind = ConfigKind::of(&path);
        log::debug!("Runtime configuration: {} ({:?})", path.display(), kind);
        Ok(RuntimeConfiguration {
            connection_strings: load_connection_strings(&path)?,
            path,
            kind,
        })
    }

    /// Copy connection strings the execution config lacks from a hosting config
    ///
    /// Entries already present in the execution config are kept as they are.
    pub fn merge_into_execution(
        &self,
        hosting: &RuntimeConfiguration,
    ) -> Result<RuntimeConfiguration> {
        let target = self.root.join(EXECUTION_CONFIG);
        let hosting_text = read_config(&hosting.path)?;
        let execution_text = if target.is_file() {
            Some(read_config(&target)?)
        } else {
            None
        };

        let merged = merge_connection_strings(&hosting_text, execution_text.as_deref())
            .map_err(|e| match e {
                MergeError::Hosting(e) => malformed(&hosting.path, e),
                MergeError::Execution(e) => malformed(&target, e),
            })?;

        for name in &merged.skipped {
            log::debug!("Keeping existing connection string '{}'", name);
        }

        if merged.added.is_empty() {
            log::info!("{} already has every connection string", target.display());
        } else {
            fs::write(&target, &merged.document).map_err(|source| {
                MigrateError::ConfigurationMergeConflict {
                    path: target.clone(),
                    source,
                }
            })?;
            log::info!(
                "Copied connection strings {} into {}",
                merged.added.join(", "),
                target.display()
            );
        }

        let doc = XmlDocument::parse(&merged.document).map_err(|e| malformed(&target, e))?;
        Ok(RuntimeConfiguration {
            path: target,
            kind: ConfigKind::Execution,
            connection_strings: read_connection_strings(&doc),
        })
    }
}

/// Connection strings declared in a configuration file; none if it is missing
pub fn load_connection_strings(path: &Path) -> Result<Vec<ConnectionString>> {
    if !path.is_file() {
        return Ok(Vec::new());
    }
    let doc = XmlDocument::load(path)?.map_err(|e| malformed(path, e))?;
    Ok(read_connection_strings(&doc))
}

pub fn read_connection_strings(doc: &XmlDocument) -> Vec<ConnectionString> {
    doc.children_named(doc.root(), "connectionStrings")
        .flat_map(|section| doc.children_named(section, "add"))
        .filter_map(|add| {
            let el = doc.element(add);
            Some(ConnectionString {
                name: el.attribute("name")?.to_string(),
                connection_string: el.attribute("connectionString").unwrap_or_default().to_string(),
                provider_name: el.attribute("providerName").map(str::to_string),
            })
        })
        .collect()
}

/// Append every hosting entry whose name the execution document lacks
///
/// Pure: the caller decides whether and where to persist `document`.
pub fn merge_connection_strings(
    hosting: &str,
    execution: Option<&str>,
) -> std::result::Result<MergedConfiguration, MergeError> {
    let incoming = read_connection_strings(&XmlDocument::parse(hosting).map_err(MergeError::Hosting)?);
    let target = XmlDocument::parse(execution.unwrap_or(EMPTY_EXECUTION_CONFIG))
        .map_err(MergeError::Execution)?;

    let mut known: HashSet<String> = read_connection_strings(&target)
        .into_iter()
        .map(|cs| cs.name.to_lowercase())
        .collect();

    let mut added = Vec::new();
    let mut skipped = Vec::new();
    let mut lines = Vec::new();
    for cs in incoming {
        if known.insert(cs.name.to_lowercase()) {
            lines.push(render_add(&cs));
            added.push(cs.name);
        } else {
            skipped.push(cs.name);
        }
    }

    let document = if lines.is_empty() {
        target.contents()
    } else {
        match target.children_named(target.root(), "connectionStrings").next() {
            Some(section) => target.append_child(section, &lines.join("\n")),
            None => {
                let unit = target.indent_unit();
                let body: Vec<String> = lines.iter().map(|line| format!("{}{}", unit, line)).collect();
                target.append_child(
                    target.root(),
                    &format!("<connectionStrings>\n{}\n</connectionStrings>", body.join("\n")),
                )
            }
        }
    };

    Ok(MergedConfiguration {
        document,
        added,
        skipped,
    })
}

fn read_config(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| {
        if e.kind() == io::ErrorKind::InvalidData {
            malformed(path, DocumentError::from(e))
        } else {
            MigrateError::Io(e)
        }
    })
}

fn render_add(cs: &ConnectionString) -> String {
    let mut line = format!(
        "<add name=\"{}\" connectionString=\"{}\"",
        escape(&cs.name),
        escape(&cs.connection_string)
    );
    if let Some(provider) = &cs.provider_name {
        line.push_str(&format!(" providerName=\"{}\"", escape(provider)));
    }
    line.push_str(" />");
    line
}

fn malformed(path: &Path, err: DocumentError) -> MigrateError {
    MigrateError::MalformedConfiguration {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const WEB_CONFIG: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<configuration>
  <connectionStrings>
    <add name="Default" connectionString="Server=web;Database=App" providerName="System.Data.SqlClient" />
    <add name="Audit" connectionString="Server=web;Database=Audit &amp; Log" providerName="System.Data.SqlClient" />
  </connectionStrings>
  <system.web />
</configuration>
"#;

    const APP_CONFIG: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<configuration>
  <!-- local override -->
  <connectionStrings>
    <add name="Default" connectionString="Server=local;Database=App" />
  </connectionStrings>
</configuration>
"#;

    #[test]
    fn test_prefers_hosting_config() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(HOSTING_CONFIG), WEB_CONFIG).unwrap();
        fs::write(dir.path().join(EXECUTION_CONFIG), APP_CONFIG).unwrap();

        let resolved = ConfigurationResolver::new(dir.path()).resolve(None).unwrap();
        assert_eq!(resolved.path, dir.path().join(HOSTING_CONFIG));
        assert_eq!(resolved.kind, ConfigKind::Hosting);
        assert_eq!(resolved.connection_strings.len(), 2);
        assert_eq!(
            resolved.connection("audit").unwrap().connection_string,
            "Server=web;Database=Audit & Log"
        );
    }

    #[test]
    fn test_falls_back_to_execution_config_even_when_absent() {
        let dir = TempDir::new().unwrap();
        let resolved = ConfigurationResolver::new(dir.path()).resolve(None).unwrap();
        assert_eq!(resolved.path, dir.path().join(EXECUTION_CONFIG));
        assert_eq!(resolved.kind, ConfigKind::Execution);
        assert!(resolved.connection_strings.is_empty());
    }

    #[test]
    fn test_explicit_path_is_relative_to_root() {
        let dir = TempDir::new().unwrap();
        let resolved = ConfigurationResolver::new(dir.path())
            .resolve(Some(Path::new("config/web.config")))
            .unwrap();
        assert_eq!(resolved.path, dir.path().join("config/web.config"));
        assert_eq!(resolved.kind, ConfigKind::Hosting);
    }

    #[test]
    fn test_merge_never_overwrites_existing_names() {
        let merged = merge_connection_strings(WEB_CONFIG, Some(APP_CONFIG)).unwrap();
        assert_eq!(merged.added, vec!["Audit"]);
        assert_eq!(merged.skipped, vec!["Default"]);

        let doc = XmlDocument::parse(&merged.document).unwrap();
        let entries = read_connection_strings(&doc);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].connection_string, "Server=local;Database=App");
        assert_eq!(entries[1].connection_string, "Server=web;Database=Audit & Log");
        assert!(merged.document.contains("<!-- local override -->"));
    }

    #[test]
    fn test_merge_without_new_names_leaves_document_unchanged() {
        let merged = merge_connection_strings(APP_CONFIG, Some(APP_CONFIG)).unwrap();
        assert!(merged.added.is_empty());
        assert_eq!(merged.document, APP_CONFIG);
    }

    #[test]
    fn test_merge_creates_missing_section() {
        let merged = merge_connection_strings(
            WEB_CONFIG,
            Some("<configuration>\n  <appSettings />\n</configuration>\n"),
        )
        .unwrap();
        let doc = XmlDocument::parse(&merged.document).unwrap();
        assert_eq!(read_connection_strings(&doc).len(), 2);
        assert!(merged.document.contains("<appSettings />"));
    }

    #[test]
    fn test_new_section_follows_document_indentation() {
        let merged = merge_connection_strings(
            WEB_CONFIG,
            Some("<configuration>\n\t<appSettings />\n</configuration>\n"),
        )
        .unwrap();
        assert!(merged
            .document
            .contains("\t<appSettings />\n\t<connectionStrings>\n\t\t<add name=\"Default\""));
        assert!(merged.document.ends_with("\t</connectionStrings>\n</configuration>\n"));
    }

    #[test]
    fn test_broken_execution_config_is_reported_by_its_own_path() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(HOSTING_CONFIG), WEB_CONFIG).unwrap();
        fs::write(
            dir.path().join(EXECUTION_CONFIG),
            "<configuration><connectionStrings></configuration>",
        )
        .unwrap();
        let resolver = ConfigurationResolver::new(dir.path());

        let hosting = resolver.resolve(None).unwrap();
        match resolver.merge_into_execution(&hosting).unwrap_err() {
            MigrateError::MalformedConfiguration { path, .. } => {
                assert_eq!(path, dir.path().join(EXECUTION_CONFIG));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_non_utf8_config_is_malformed() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(EXECUTION_CONFIG), b"<configuration>\xff\xfe</configuration>").unwrap();
        let err = ConfigurationResolver::new(dir.path()).resolve(None).unwrap_err();
        assert_eq!(err.kind(), "MalformedConfiguration");
    }

    #[test]
    fn test_merge_into_missing_execution_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(HOSTING_CONFIG), WEB_CONFIG).unwrap();
        let resolver = ConfigurationResolver::new(dir.path());

        let hosting = resolver.resolve(None).unwrap();
        let execution = resolver.merge_into_execution(&hosting).unwrap();

        assert_eq!(execution.path, dir.path().join(EXECUTION_CONFIG));
        assert_eq!(execution.connection_strings, hosting.connection_strings);
        assert!(dir.path().join(EXECUTION_CONFIG).is_file());
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_write_is_a_merge_conflict() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(HOSTING_CONFIG), WEB_CONFIG).unwrap();
        // a directory where the file should go makes the write fail
        fs::create_dir(dir.path().join(EXECUTION_CONFIG)).unwrap();
        let resolver = ConfigurationResolver::new(dir.path());

        let hosting = resolver.resolve(None).unwrap();
        let err = resolver.merge_into_execution(&hosting).unwrap_err();
        assert!(matches!(err, MigrateError::ConfigurationMergeConflict { .. }));
    }
}
