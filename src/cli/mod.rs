//! 命令行：clap 4 derive 定义与子命令分发

pub mod repl;

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use futures_util::StreamExt;

use crate::commands::topics_listing;
use crate::config::{load_config, AppConfig};
use crate::llm::create_connector;
use crate::memory::Message;
use crate::vault::{sanitize_topic, templates, VaultStore};

/// Socratic study companion backed by a markdown vault
#[derive(Parser, Debug)]
#[command(name = "study")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Topic to study (skips the picker)
    #[arg(short, long, global = true)]
    pub topic: Option<String>,

    /// Config file (default: ~/.study/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List all topics in the vault
    Ls,

    /// Ask a one-off question (streamed, no vault writes)
    Ask {
        /// The question
        #[arg(num_args = 1.., required = true)]
        question: Vec<String>,
    },

    /// Reset vault data
    Reset {
        /// What to reset
        #[arg(value_enum)]
        scope: ResetScope,

        /// Topic name (required for `topic`)
        name: Option<String>,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResetScope {
    /// One topic, back to the blank template
    Topic,
    /// Delete every topic note
    Topics,
    /// Delete every daily log
    Daily,
    /// Reset the learner profile
    Profile,
    /// Topics, daily logs and profile
    All,
}

/// 解析后的入口
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.clone()).context("Failed to load config")?;
    match cli.command {
        None => repl::run_session(&config, cli.topic).await,
        Some(Commands::Ls) => list_topics(&config),
        Some(Commands::Ask { question }) => ask(&config, &question.join(" ")).await,
        Some(Commands::Reset { scope, name, yes }) => reset(&config, scope, name.or(cli.topic), yes),
    }
}

fn open_vault(config: &AppConfig) -> anyhow::Result<Arc<VaultStore>> {
    let store = Arc::new(VaultStore::new(config.vault.resolved_path()));
    store
        .init()
        .with_context(|| format!("Failed to initialise vault at {}", store.root().display()))?;
    Ok(store)
}

fn list_topics(config: &AppConfig) -> anyhow::Result<()> {
    let store = open_vault(config)?;
    println!("{}", topics_listing(&store)?);
    Ok(())
}

async fn ask(config: &AppConfig, question: &str) -> anyhow::Result<()> {
    let store = open_vault(config)?;
    let connector = create_connector(&config.llm)?;
    let framework = store
        .read_framework()?
        .unwrap_or_else(|| templates::FRAMEWORK.to_string());
    let messages = vec![Message::system(framework), Message::user(question)];

    let mut stream = connector
        .stream(&messages, &[])
        .await
        .with_context(|| format!("{} connector failed", connector.name()))?;
    let mut stdout = std::io::stdout();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("Stream interrupted")?;
        write!(stdout, "{chunk}")?;
        stdout.flush()?;
    }
    writeln!(stdout)?;
    Ok(())
}

fn reset(config: &AppConfig, scope: ResetScope, name: Option<String>, yes: bool) -> anyhow::Result<()> {
    let store = open_vault(config)?;
    let topic = match (scope, name) {
        (ResetScope::Topic, Some(name)) => {
            let topic = sanitize_topic(&name);
            if !store.topic_exists(&topic) {
                bail!("No topic named '{topic}' in the vault");
            }
            Some(topic)
        }
        (ResetScope::Topic, None) => bail!("Usage: study reset topic <NAME>"),
        _ => None,
    };

    if !yes {
        let label = match scope {
            ResetScope::All => "the entire vault (all topics, daily logs, and profile)".to_string(),
            ResetScope::Topics => "all topics".to_string(),
            ResetScope::Topic => format!("topic '{}'", topic.as_deref().unwrap_or_default()),
            ResetScope::Daily => "all daily logs".to_string(),
            ResetScope::Profile => "the learner profile".to_string(),
        };
        if !repl::confirm(&format!("This will permanently delete {label}. Continue? [y/N] "))? {
            println!("Reset cancelled.");
            return Ok(());
        }
    }

    match (scope, topic) {
        (ResetScope::All, _) => {
            let topics = store.reset_all_topics()?;
            let daily = store.reset_daily_logs()?;
            store.reset_profile()?;
            println!("Reset complete: {topics} topic(s), {daily} daily log(s) deleted, profile cleared.");
        }
        (ResetScope::Topics, _) => println!("Deleted {} topic file(s).", store.reset_all_topics()?),
        (ResetScope::Topic, Some(topic)) => {
            store.reset_topic(&topic)?;
            println!("Topic '{topic}' reset to blank template.");
        }
        (ResetScope::Topic, None) => {}
        (ResetScope::Daily, _) => println!("Deleted {} daily log(s).", store.reset_daily_logs()?),
        (ResetScope::Profile, _) => {
            store.reset_profile()?;
            println!("Learner profile reset.");
        }
    }
    tracing::info!(?scope, "vault reset");
    Ok(())
}
