use std::io::{BufRead as _, Write as _};
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use grove_core::{ChatRequest, Config, Fragment, RagService, RepoRef, build_service};
use tokio_util::sync::CancellationToken;

const DEFAULT_CONFIG: &str = "grove.toml";
const DEFAULT_SESSION: &str = "cli";

/// Ask questions about a code repository.
#[derive(Debug, Parser)]
#[command(name = "grove", version)]
struct Cli {
    /// TOML configuration file. Falls back to `GROVE_CONFIG`, then `grove.toml`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Build the corpus of a repository, or load it from the cache.
    Index {
        repo: String,
        /// Ignore the cached corpus and walk the repository again.
        #[arg(long)]
        rebuild: bool,
    },

    /// Drop the cached corpus of a repository.
    Forget { repo: String },

    /// Print the files that best match a query.
    Search {
        repo: String,
        query: String,
        /// Show at most this many results.
        #[arg(long, short = 'n')]
        limit: Option<usize>,
    },

    /// Stream an answer. Without a query, questions are read from stdin line by line
    /// and share one conversation.
    Ask {
        repo: String,
        query: Option<String>,
        /// File (relative to the repository root) to include in the prompt.
        #[arg(long)]
        file: Option<String>,
        #[arg(long)]
        session: Option<String>,
    },
}

impl Command {
    fn needs_generation(&self) -> bool {
        matches!(self, Self::Ask { .. })
    }
}

fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var("GROVE_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from(DEFAULT_CONFIG)
}

fn init_subscriber() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_subscriber();

    let config_path = resolve_config_path(cli.config.as_deref());
    let config = Config::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let service = build_service(&config, cli.command.needs_generation()).await?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {e:#}");
            return;
        }
        tracing::info!("received shutdown signal");
        on_signal.cancel();
    });

    let result = run(&service, cli.command, &cancel).await;
    service.registry().close_all().await;
    result
}

async fn run(service: &RagService, command: Command, cancel: &CancellationToken) -> anyhow::Result<()> {
    match command {
        Command::Index { repo, rebuild } => {
            let repo = RepoRef::new(repo);
            let prepared = if rebuild {
                service.rebuild(&repo, cancel).await?
            } else {
                service.prepare(&repo, cancel).await?
            };
            let report = &prepared.report;
            println!(
                "{}: {} documents ({} scanned, {} oversized, {} unreadable){}",
                prepared.root.display(),
                report.files_indexed,
                report.files_scanned,
                report.skipped_oversized,
                report.skipped_unreadable,
                if report.cache_hit { ", cached" } else { "" }
            );
        }
        Command::Forget { repo } => {
            if service.forget(&RepoRef::new(repo.clone())).await? {
                println!("{repo}: corpus dropped");
            } else {
                println!("{repo}: nothing cached");
            }
        }
        Command::Search { repo, query, limit } => {
            let mut hits = service
                .search(&RepoRef::new(repo), &query, None, cancel)
                .await?;
            if let Some(limit) = limit {
                hits.truncate(limit);
            }
            for hit in hits {
                println!("{:>8.3}  {}", hit.score, hit.document.metadata().file_path);
            }
        }
        Command::Ask {
            repo,
            query: Some(query),
            file,
            session,
        } => {
            let mut request = ChatRequest::new(RepoRef::new(repo), query)
                .with_session(session.unwrap_or_else(|| DEFAULT_SESSION.into()));
            request.file_path = file;
            ask(service, request, cancel).await?;
        }
        Command::Ask {
            repo,
            query: None,
            file,
            session,
        } => {
            let session = session.unwrap_or_else(|| DEFAULT_SESSION.into());
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let query = line.context("reading question")?;
                if query.trim().is_empty() {
                    continue;
                }
                let mut request =
                    ChatRequest::new(RepoRef::new(repo.clone()), query).with_session(session.clone());
                request.file_path.clone_from(&file);
                ask(service, request, cancel).await?;
                if cancel.is_cancelled() {
                    break;
                }
            }
        }
    }
    Ok(())
}

async fn ask(service: &RagService, request: ChatRequest, cancel: &CancellationToken) -> anyhow::Result<()> {
    let mut stream = service.chat(request, cancel).await?;
    let mut stdout = std::io::stdout();
    while let Some(fragment) = stream.next().await {
        match fragment {
            Fragment::Text(text) => {
                stdout.write_all(text.as_bytes())?;
                stdout.flush()?;
            }
            Fragment::Error(e) => {
                writeln!(stdout)?;
                bail!("generation failed: {e}");
            }
        }
    }
    writeln!(stdout)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    #[test]
    fn parse_ask_with_options() {
        let cli = Cli::try_parse_from([
            "grove", "ask", "./repo", "how?", "--file", "src/lib.rs", "--session", "s1",
        ])
        .unwrap();
        match cli.command {
            Command::Ask {
                repo,
                query,
                file,
                session,
            } => {
                assert_eq!(repo, "./repo");
                assert_eq!(query.as_deref(), Some("how?"));
                assert_eq!(file.as_deref(), Some("src/lib.rs"));
                assert_eq!(session.as_deref(), Some("s1"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn ask_without_query_is_interactive() {
        let cli = Cli::try_parse_from(["grove", "ask", "."]).unwrap();
        assert!(matches!(cli.command, Command::Ask { query: None, .. }));
        assert!(cli.command.needs_generation());
    }

    #[test]
    fn search_limit_and_global_config() {
        let cli =
            Cli::try_parse_from(["grove", "search", ".", "auth", "-n", "3", "--config", "x.toml"])
                .unwrap();
        assert_eq!(cli.config.as_deref(), Some(Path::new("x.toml")));
        assert!(matches!(cli.command, Command::Search { limit: Some(3), .. }));
        assert!(!cli.command.needs_generation());
    }

    #[test]
    fn index_rebuild_and_forget() {
        let cli = Cli::try_parse_from(["grove", "index", ".", "--rebuild"]).unwrap();
        assert!(matches!(cli.command, Command::Index { rebuild: true, .. }));
        assert!(!cli.command.needs_generation());

        let cli = Cli::try_parse_from(["grove", "index", "."]).unwrap();
        assert!(matches!(cli.command, Command::Index { rebuild: false, .. }));

        let cli = Cli::try_parse_from(["grove", "forget", "./repo"]).unwrap();
        match cli.command {
            Command::Forget { repo } => assert_eq!(repo, "./repo"),
            other => panic!("unexpected command: {other:?}"),
        }
        assert!(Cli::try_parse_from(["grove", "forget"]).is_err());
    }

    #[test]
    fn missing_subcommand_is_rejected() {
        assert!(Cli::try_parse_from(["grove"]).is_err());
        assert!(Cli::try_parse_from(["grove", "search", "."]).is_err());
    }

    #[test]
    #[serial]
    fn config_path_precedence() {
        unsafe { std::env::remove_var("GROVE_CONFIG") };
        assert_eq!(resolve_config_path(None), PathBuf::from(DEFAULT_CONFIG));

        unsafe { std::env::set_var("GROVE_CONFIG", "/etc/grove.toml") };
        assert_eq!(resolve_config_path(None), PathBuf::from("/etc/grove.toml"));
        assert_eq!(
            resolve_config_path(Some(Path::new("local.toml"))),
            PathBuf::from("local.toml")
        );
        unsafe { std::env::remove_var("GROVE_CONFIG") };
    }
}
