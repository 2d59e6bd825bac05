use anyhow::Context;
use clap::{Parser, ValueEnum};
use ef_migrations::{
    Action, LocateOptions, MigrateError, MigrationId, Orchestrator, Outcome, ProcessEngine,
    ProjectLocator, Request,
};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ActionKind {
    /// Scaffold a migration and add it to the project
    #[value(name = "AddMigration", alias = "add-migration")]
    AddMigration,
    /// List migrations not yet applied to the database
    #[value(name = "PendingMigrations", alias = "pending-migrations")]
    PendingMigrations,
    /// Apply pending migrations
    #[value(name = "UpdateDatabase", alias = "update-database")]
    UpdateDatabase,
    /// Print the SQL script for a range of migrations
    #[value(name = "GenerateScript", alias = "generate-script")]
    GenerateScript,
}

#[derive(Parser)]
#[command(name = "ef-migrations")]
#[command(about = "Scaffold and apply database migrations for MSBuild projects")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Action to perform
    #[arg(short, long, value_enum)]
    action: ActionKind,

    /// Migration name (AddMigration)
    #[arg(short, long)]
    name: Option<String>,

    /// Project directory (defaults to the nearest directory holding a project file)
    #[arg(short, long, alias = "baseFolder")]
    base_folder: Option<PathBuf>,

    /// Compiled output directory (defaults to the project's OutputPath)
    #[arg(long, alias = "binFolder")]
    bin_folder: Option<PathBuf>,

    /// Assembly name (defaults to the project's AssemblyName)
    #[arg(long, alias = "assemblyName")]
    assembly_name: Option<String>,

    /// Configuration file holding connection strings
    #[arg(long, alias = "configPath")]
    config_path: Option<PathBuf>,

    /// Connection string name
    #[arg(long, alias = "connectionName")]
    connection_name: Option<String>,

    /// First migration of a generated script (defaults to the empty database)
    #[arg(long, alias = "sourceMigration")]
    source_migration: Option<String>,

    /// Last migration to apply or script (defaults to the latest)
    #[arg(long, alias = "targetMigration")]
    target_migration: Option<String>,

    /// Copy missing connection strings from Web.config into app.config
    #[arg(long, alias = "mergeConfig")]
    merge_config: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn into_request(self) -> ef_migrations::Result<Request> {
        let action = match self.action {
            ActionKind::AddMigration => Action::add_migration(self.name.as_deref())?,
            ActionKind::PendingMigrations => Action::PendingMigrations,
            ActionKind::UpdateDatabase => Action::UpdateDatabase {
                target: self.target_migration.map(MigrationId::from),
            },
            ActionKind::GenerateScript => Action::GenerateScript {
                source: self.source_migration.map(MigrationId::from),
                target: self.target_migration.map(MigrationId::from),
            },
        };

        Ok(Request {
            action,
            locate: LocateOptions {
                root: self.base_folder,
                assembly_name: self.assembly_name,
                output_dir: self.bin_folder,
            },
            config_path: self.config_path,
            connection_name: self.connection_name,
            merge_config: self.merge_config,
        })
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => report(&err),
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let request = cli.into_request()?;
    let locator = ProjectLocator::from_current_dir().context("Failed to read the working directory")?;
    let engine = ProcessEngine;

    let mut orchestrator = Orchestrator::new(&engine, locator);
    let outcome = orchestrator
        .run(&request)
        .with_context(|| format!("{} failed", request.action.name()))?;

    match outcome {
        Outcome::MigrationAdded(report) => {
            if report.item_group_added {
                println!("Added migration {}", report.migration_id);
            } else {
                println!(
                    "Migration {} was already part of the project; files refreshed",
                    report.migration_id
                );
            }
            for path in &report.written {
                log::debug!("  {}", path.display());
            }
        }
        Outcome::NoModelChanges => {
            println!("No model changes detected; nothing to scaffold");
        }
        Outcome::Pending(pending) => {
            println!("Pending count: {}", pending.len());
            for id in pending.iter() {
                println!("\t{}", id);
            }
        }
        Outcome::DatabaseUpdated { target } => match target {
            Some(target) => println!("Database updated to {}", target),
            None => println!("Database updated to the latest migration"),
        },
        Outcome::Script(script) => print!("{}", script),
    }
    Ok(())
}

fn report(err: &anyhow::Error) -> ExitCode {
    match err.downcast_ref::<MigrateError>() {
        Some(e) => {
            eprintln!("error[{}]: {:#}", e.kind(), err);
            if let Some(hint) = e.hint() {
                eprintln!("hint: {}", hint);
            }
            ExitCode::from(e.exit_code())
        }
        None => {
            eprintln!("error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}
