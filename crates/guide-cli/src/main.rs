//! guide-cli: Drive a guide editing session from the command line.
//!
//! Each run opens a session over a JSON-file remote store (`<data>/remote.json`)
//! and a directory-backed local store (`<data>/local/`), performs one command,
//! closes the session so pending edits are flushed, then writes the remote
//! state back.

use anyhow::{bail, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use guide_cli::{FileStore, RemoteFile};
use guide_core::{EngineConfig, GuideRemote, GuideSession, LocalStore, Scope};

#[derive(Parser, Debug)]
#[command(name = "guide-cli")]
#[command(about = "Edit guide notes with local drafts and autosave")]
struct Args {
    /// Directory holding the remote state file and the local store
    #[arg(short, long)]
    data: PathBuf,

    /// Guide list to work on (defaults to the last one used)
    #[arg(short, long, value_enum)]
    scope: Option<TabArg>,

    /// Active conversation id
    #[arg(short, long)]
    conversation: Option<String>,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum TabArg {
    Global,
    Conversation,
}

impl From<TabArg> for Scope {
    fn from(tab: TabArg) -> Self {
        match tab {
            TabArg::Global => Scope::Global,
            TabArg::Conversation => Scope::Conversation,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List guides in display order; `*` marks the open guide
    List,
    /// Create a guide and open it
    Create {
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        content: Option<String>,
    },
    /// Open a guide and change its title and/or content
    Edit {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        content: Option<String>,
    },
    /// Move the guide at position FROM to position TO
    Reorder { from: usize, to: usize },
    /// Merge guides into whichever of them comes first in the list order
    ///
    /// The order of the ids on the command line does not matter; use
    /// `reorder` first to pick the primary.
    Merge {
        #[arg(required = true, num_args = 2..)]
        ids: Vec<String>,
    },
    /// Delete a guide
    Delete { id: String },
    /// Print the local draft store as JSON
    Drafts,
}

async fn run<R: GuideRemote + 'static>(session: &GuideSession<R>, command: Command) -> Result<()> {
    match command {
        Command::List => print_guides(session),
        Command::Create { title, content } => {
            let created = session.create_guide().await?;
            match title {
                Some(title) => {
                    session.set_rename_text(title);
                    session.commit_rename().await?;
                }
                None => session.cancel_rename(),
            }
            if let Some(content) = content {
                session.edit_content(content)?;
            }
            println!("{}", created.id);
        }
        Command::Edit { id, title, content } => {
            if title.is_none() && content.is_none() {
                bail!("Nothing to edit: pass --title and/or --content");
            }
            session.select(&id, false).await?;
            if let Some(title) = title {
                session.edit_title(title)?;
            }
            if let Some(content) = content {
                session.edit_content(content)?;
            }
        }
        Command::Reorder { from, to } => {
            if !session.reorder(from, to).await? {
                warn!("Nothing to move");
            }
            print_guides(session);
        }
        Command::Merge { ids } => {
            ensure_distinct(&ids)?;
            session.clear_merge_selection();
            for id in &ids {
                session.toggle_merge_selection(id)?;
            }
            match session.merge_selected().await? {
                Some(report) => {
                    println!("{}\t{}", report.merged.id, report.merged.title);
                    for id in &report.failed {
                        warn!("Guide {} could not be deleted and was kept", id);
                    }
                }
                None => bail!("Select at least two guides from the same list"),
            }
        }
        Command::Delete { id } => session.delete_guide(&id).await?,
        Command::Drafts => println!("{}", serde_json::to_string_pretty(&session.drafts())?),
    }
    Ok(())
}

/// Selecting an id twice would toggle it back out of the merge.
fn ensure_distinct(ids: &[String]) -> Result<()> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id.as_str()) {
            bail!("Guide {} was given more than once", id);
        }
    }
    Ok(())
}

fn print_guides<R: GuideRemote + 'static>(session: &GuideSession<R>) {
    let editing = session.editing().map(|g| g.id);
    for (index, guide) in session.guides().iter().enumerate() {
        let marker = if editing.as_deref() == Some(guide.id.as_str()) {
            "*"
        } else {
            " "
        };
        let title = if guide.title.is_empty() {
            "(untitled)"
        } else {
            guide.title.as_str()
        };
        println!(
            "{} {:>2}  {}  {}  [{} file(s)]",
            marker,
            index,
            guide.id,
            title,
            guide.files.len()
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging - respects RUST_LOG env var, defaults to info (or debug with --verbose)
    let default_filter = if args.verbose {
        "debug,guide_core=debug,guide_cli=debug"
    } else {
        "info,guide_core=info,guide_cli=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = EngineConfig::from_env()?;
    debug!("Engine config: {:?}", config);
    info!("Data directory: {:?}", args.data);

    let remote_file = RemoteFile::new(&args.data);
    let remote = Arc::new(remote_file.open_remote()?);
    let store: Arc<dyn LocalStore> = Arc::new(FileStore::new(args.data.join("local")));
    let session = GuideSession::new(Arc::clone(&remote), store, config);

    session.open().await?;
    if args.conversation.is_some() {
        session.set_conversation(args.conversation).await?;
    }
    if let Some(scope) = args.scope {
        session.switch_tab(scope.into()).await?;
    }

    let outcome = run(&session, args.command).await;

    match session.close().await {
        Ok(flushed) => debug!("Session closed, wrote={}", flushed.wrote()),
        Err(e) => warn!("Pending edits kept as local drafts: {}", e),
    }
    remote_file.save(&remote)?;
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_rejects_repeated_ids() {
        let ids = |list: &[&str]| list.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        assert!(ensure_distinct(&ids(&["a", "b"])).is_ok());
        let err = ensure_distinct(&ids(&["a", "b", "a"])).unwrap_err();
        assert!(err.to_string().contains("Guide a"));
    }

    #[test]
    fn test_merge_command_parses_ids() {
        let args = Args::try_parse_from(["guide-cli", "--data", "d", "merge", "b", "a"]).unwrap();
        match args.command {
            Command::Merge { ids } => assert_eq!(ids, vec!["b", "a"]),
            other => panic!("unexpected command {:?}", other),
        }
        assert!(Args::try_parse_from(["guide-cli", "--data", "d", "merge", "a"]).is_err());
    }
}
