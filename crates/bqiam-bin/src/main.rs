#![warn(
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::pedantic
)]
#![forbid(unsafe_code)]
#![allow(clippy::module_name_repetitions)]

use std::path::PathBuf;

use anyhow::Context as _;
use bqiam::{
    Config, LogFormat,
    completion::CandidateKind,
    reconcile::Intent,
    role::{DatasetRole, ProjectRole, RoleParseError},
};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use tracing_subscriber::{EnvFilter, filter::LevelFilter};

mod access;
mod cache;
mod completion;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(
    name = "bqiam",
    version,
    about = "bqiam is a tool for BigQuery administrators",
    long_about = None
)]
pub(crate) struct Cli {
    /// Config file (default is $HOME/.bqiam.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Cache refresh threshold in hours
    #[arg(short = 'r', long = "refresh", global = true)]
    refresh: Option<u64>,
    /// Increase log verbosity (-v for info, -vv for debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Permit some users to access some datasets or a whole project
    Permit {
        #[command(subcommand)]
        target: AccessTarget,
    },
    /// Revoke some users' access to some datasets or a whole project
    Revoke {
        #[command(subcommand)]
        target: AccessTarget,
    },
    /// Fetch BigQuery datasets' metadata and store it in the local cache file
    Cache {},
    /// List datasets that the given user or service account can access
    Dataset {
        /// User, group or service account email
        entity: String,
    },
    /// Update the completion list and print a shell completion script
    Completion {
        #[arg(value_enum)]
        shell: CompletionShell,
    },
    /// Print completion candidates from the completion list
    #[command(hide = true)]
    Complete {
        #[arg(value_parser = parse_candidate_kind)]
        kind: CandidateKind,
        #[arg(default_value = "")]
        prefix: String,
    },
    /// Print the version of bqiam
    Version {},
}

#[derive(Subcommand, Debug)]
pub(crate) enum AccessTarget {
    /// Dataset access as READER, WRITER or OWNER
    ///
    /// For example: bqiam permit dataset READER -p bq-project-id -u user1@email.com -u user2@email.com -d dataset1 -d dataset2
    Dataset {
        #[arg(value_parser = parse_dataset_role)]
        role: DatasetRole,
        /// GCP project id
        #[arg(short, long)]
        project: String,
        /// User, group or service account email(s)
        #[arg(short, long = "users", value_delimiter = ',', required = true)]
        users: Vec<String>,
        /// Dataset id(s)
        #[arg(short, long = "datasets", value_delimiter = ',', required = true)]
        datasets: Vec<String>,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// PROJECT-WIDE access as READER (roles/viewer) or WRITER (roles/editor)
    Project {
        #[arg(value_parser = parse_project_role)]
        role: ProjectRole,
        /// GCP project id
        #[arg(short, long)]
        project: String,
        /// User, group or service account email(s)
        #[arg(short, long = "users", value_delimiter = ',', required = true)]
        users: Vec<String>,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CompletionShell {
    Bash,
    Zsh,
}

impl From<CompletionShell> for clap_complete::Shell {
    fn from(shell: CompletionShell) -> Self {
        match shell {
            CompletionShell::Bash => clap_complete::Shell::Bash,
            CompletionShell::Zsh => clap_complete::Shell::Zsh,
        }
    }
}

fn parse_dataset_role(role: &str) -> Result<DatasetRole, RoleParseError> {
    DatasetRole::parse(role)
}

fn parse_project_role(role: &str) -> Result<ProjectRole, RoleParseError> {
    role.parse()
}

fn parse_candidate_kind(kind: &str) -> Result<CandidateKind, String> {
    kind.parse()
        .map_err(|_| format!("users, datasets or projects must be specified, got `{kind}`"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(hours) = cli.refresh {
        config.cache_refresh_hour = hours;
    }
    init_tracing(cli.verbose, &config);

    match cli.command {
        Commands::Permit { target } => access::run(Intent::Grant, target).await?,
        Commands::Revoke { target } => access::run(Intent::Revoke, target).await?,
        Commands::Cache {} => cache::update(&config).await?,
        Commands::Dataset { entity } => cache::datasets_of(&config, &entity).await?,
        Commands::Completion { shell } => completion::generate(&config, shell).await?,
        Commands::Complete { kind, prefix } => completion::complete(&config, kind, &prefix)?,
        Commands::Version {} => println!("{VERSION}"),
    }

    Ok(())
}

fn init_tracing(verbose: u8, config: &Config) {
    let level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        _ => LevelFilter::DEBUG,
    };
    let subscriber = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_file(config.debug.extended_logs)
        .with_line_number(config.debug.extended_logs)
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        );
    match config.log_format {
        LogFormat::Json => subscriber
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .init(),
        LogFormat::Pretty => subscriber.init(),
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_permit_dataset_arguments() {
        let cli = Cli::try_parse_from([
            "bqiam", "permit", "dataset", "WRITER", "-p", "bq-project", "-u", "a@example.com",
            "-u", "b@example.com,c@example.com", "-d", "sales", "--yes",
        ])
        .unwrap();
        let Commands::Permit {
            target:
                AccessTarget::Dataset {
                    role,
                    project,
                    users,
                    datasets,
                    yes,
                },
        } = cli.command
        else {
            panic!("expected permit dataset");
        };
        assert_eq!(role, DatasetRole::Writer);
        assert_eq!(project, "bq-project");
        assert_eq!(users, vec!["a@example.com", "b@example.com", "c@example.com"]);
        assert_eq!(datasets, vec!["sales"]);
        assert!(yes);
    }

    #[test]
    fn test_project_owner_is_rejected_by_the_parser() {
        let err = Cli::try_parse_from([
            "bqiam", "permit", "project", "OWNER", "-p", "bq-project", "-u", "a@example.com",
        ])
        .unwrap_err();
        assert!(err.to_string().contains("OWNER cannot be granted project-wide"));

        assert!(
            Cli::try_parse_from([
                "bqiam", "revoke", "project", "READER", "-p", "bq-project", "-u", "a@example.com",
            ])
            .is_ok()
        );
    }

    #[test]
    fn test_users_are_required() {
        assert!(
            Cli::try_parse_from(["bqiam", "permit", "dataset", "READER", "-p", "p", "-d", "sales"])
                .is_err()
        );
    }

    #[test]
    fn test_global_refresh_flag() {
        let cli = Cli::try_parse_from(["bqiam", "dataset", "a@example.com", "-r", "6"]).unwrap();
        assert_eq!(cli.refresh, Some(6));
    }
}
