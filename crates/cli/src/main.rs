mod commands;
mod logging;
mod session;

use clap::{Parser, Subcommand};
use ezmig_core::{load_env_file, MigrateConfig};
use ezmig_engine::{MigrateError, MigrateResult};
use std::path::PathBuf;
use tracing::error;

use commands::{init, make, migrate, print_report, rollback, seed, status};
use logging::{init_logging, LoggingConfig};
use session::Session;

#[derive(Parser)]
#[command(name = "ez-migrate")]
#[command(about = "Track and run SQL migrations against SQLite, MySQL and PostgreSQL")]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to ./ez-migrate.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Commands {
    /// Write a default ez-migrate.json
    Init,

    /// Create a new migration file
    Make {
        /// Migration name
        name: String,
    },

    /// Create a new seed file
    MakeSeed {
        /// Seed name
        name: String,
    },

    /// Apply every pending migration as one batch (default)
    Migrate,

    /// Apply the next pending migration
    Up,

    /// Revert the last applied migration
    Down,

    /// Revert the last batch
    Rollback,

    /// Revert every batch, then migrate again
    Reset,

    /// Revert the last migration and apply it again
    Redo,

    /// Show which migrations are applied, pending or modified
    Status,

    /// List applied migrations with their batches
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Run the seed files
    Seed,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(LoggingConfig::from_flags(cli.verbose, cli.json_logs)) {
        eprintln!("Failed to initialize logging: {}", e);
    }
    load_env_file();

    match run(cli).await {
        Ok(()) => {}
        Err(MigrateError::NothingToDo(message)) => println!("{}", message),
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            std::process::exit(exit_code(&e));
        }
    }
}

/// 2 when the command stopped before touching any database, 1 otherwise
fn exit_code(error: &MigrateError) -> i32 {
    if error.is_fatal_before_io() {
        2
    } else {
        1
    }
}

async fn run(cli: Cli) -> MigrateResult<()> {
    let command = cli.command.unwrap_or(Commands::Migrate);
    if command == Commands::Init {
        return init::run();
    }

    let config = match &cli.config {
        Some(path) => MigrateConfig::load_from(path)?,
        None => MigrateConfig::load()?,
    };

    match command {
        Commands::Make { name } => make::migration(&config, &name).await,
        Commands::MakeSeed { name } => make::seed(&config, &name).await,
        Commands::Seed => {
            let report = seed::run(&config).await?;
            print_report("Seeded", &report);
            Ok(())
        }
        tracked => {
            let mut session = Session::open(&config).await?;
            let result = run_tracked(&mut session, tracked).await;
            session.close(result).await
        }
    }
}

async fn run_tracked(session: &mut Session, command: Commands) -> MigrateResult<()> {
    match command {
        Commands::Migrate => print_report("Applied", &migrate::migrate(session).await?),
        Commands::Up => print_report("Applied", &migrate::up(session).await?),
        Commands::Down => print_report("Reverted", &rollback::down(session).await?),
        Commands::Rollback => print_report("Reverted", &rollback::rollback(session).await?),
        Commands::Reset => {
            let (reverted, applied) = rollback::reset(session).await?;
            print_report("Reverted", &reverted);
            match applied {
                Some(applied) => print_report("Applied", &applied),
                None => println!("No migration files to apply"),
            }
        }
        Commands::Redo => {
            let (reverted, applied) = migrate::redo(session).await?;
            print_report("Reverted", &reverted);
            print_report("Applied", &applied);
        }
        Commands::Status => status::print_status(&status::status(session).await?),
        Commands::List { json } => {
            status::print_list(&status::list(session).await?, json)?;
        }
        untracked => {
            return Err(MigrateError::Configuration(format!(
                "{:?} does not run against the tracker",
                untracked
            )))
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_migrate() {
        let cli = Cli::try_parse_from(["ez-migrate"]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.verbose);
    }

    #[test]
    fn test_parse_subcommands() {
        let cli = Cli::try_parse_from(["ez-migrate", "make", "create users"]).unwrap();
        assert_eq!(
            cli.command,
            Some(Commands::Make {
                name: "create users".to_string()
            })
        );

        let cli = Cli::try_parse_from(["ez-migrate", "make-seed", "users"]).unwrap();
        assert_eq!(cli.command, Some(Commands::MakeSeed { name: "users".to_string() }));

        let cli = Cli::try_parse_from(["ez-migrate", "list", "--json", "--verbose"]).unwrap();
        assert_eq!(cli.command, Some(Commands::List { json: true }));
        assert!(cli.verbose);

        let cli =
            Cli::try_parse_from(["ez-migrate", "--config", "db/ez-migrate.json", "rollback"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("db/ez-migrate.json")));
        assert_eq!(cli.command, Some(Commands::Rollback));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code(&MigrateError::BatchIntegrity("mixed".to_string())), 2);
        assert_eq!(
            exit_code(&MigrateError::format("001-a.sql", "the up section is empty")),
            2
        );
        assert_eq!(exit_code(&MigrateError::sql_execution("001-a.sql", "syntax error")), 1);
        assert_eq!(exit_code(&MigrateError::Tracker("locked".to_string())), 1);
    }

    #[test]
    fn test_make_requires_a_name() {
        assert!(Cli::try_parse_from(["ez-migrate", "make"]).is_err());
    }
}
