use std::io::Write;

use anyhow::Context as _;
use bqiam::{
    Config,
    completion::{CandidateKind, CompletionList, build_completion_list},
    gcp::GcpClient,
};
use clap::CommandFactory as _;

use crate::{Cli, CompletionShell};

/// Sends `-u`, `-d` and `-p` values to `bqiam complete`, everything else to `_bqiam`.
const BASH_CANDIDATES: &str = r#"
_bqiam_candidates() {
    local cur="${COMP_WORDS[COMP_CWORD]}"
    case "${COMP_WORDS[COMP_CWORD-1]}" in
        -u|--users)
            COMPREPLY=($(bqiam complete users "${cur}" 2>/dev/null))
            ;;
        -d|--datasets)
            COMPREPLY=($(bqiam complete datasets "${cur}" 2>/dev/null))
            ;;
        -p|--project)
            COMPREPLY=($(bqiam complete projects "${cur}" 2>/dev/null))
            ;;
        *)
            _bqiam "$@"
            ;;
    esac
}

complete -F _bqiam_candidates -o bashdefault -o default bqiam
"#;

const ZSH_CANDIDATES: &str = r#"
_bqiam_candidates() {
    case "${words[CURRENT-1]}" in
        -u|--users)
            compadd -- ${(f)"$(bqiam complete users "${words[CURRENT]}" 2>/dev/null)"}
            ;;
        -d|--datasets)
            compadd -- ${(f)"$(bqiam complete datasets "${words[CURRENT]}" 2>/dev/null)"}
            ;;
        -p|--project)
            compadd -- ${(f)"$(bqiam complete projects "${words[CURRENT]}" 2>/dev/null)"}
            ;;
        *)
            _bqiam "$@"
            ;;
    esac
}

compdef _bqiam_candidates bqiam
"#;

/// Rebuild the completion list, then print the completion script for `shell`.
pub(crate) async fn generate(config: &Config, shell: CompletionShell) -> anyhow::Result<()> {
    let path = config.completion_path();
    tracing::info!("creating completion file: {}", path.display());

    let client = GcpClient::from_default_credentials()
        .await
        .context("Failed to create GCP client")?;
    let list = build_completion_list(
        &client,
        &config.bigquery_projects,
        config.completion_display_size_limit,
    )
    .await?;
    list.save(&path)?;

    write_script(shell, &mut std::io::stdout().lock())?;
    Ok(())
}

/// The clap generated script followed by a wrapper that completes user,
/// dataset and project values from the completion list.
fn write_script(shell: CompletionShell, out: &mut impl Write) -> std::io::Result<()> {
    clap_complete::generate(
        clap_complete::Shell::from(shell),
        &mut Cli::command(),
        "bqiam",
        &mut *out,
    );
    let candidates = match shell {
        CompletionShell::Bash => BASH_CANDIDATES,
        CompletionShell::Zsh => ZSH_CANDIDATES,
    };
    out.write_all(candidates.as_bytes())
}

pub(crate) fn complete(config: &Config, kind: CandidateKind, prefix: &str) -> anyhow::Result<()> {
    let list = CompletionList::load(&config.completion_path())?;
    for candidate in list.candidates(kind, prefix) {
        println!("{candidate}");
    }
    Ok(())
}
