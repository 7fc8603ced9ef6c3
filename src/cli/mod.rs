//! Command-line interface parsing and handling
//!
//! This module handles parsing command-line arguments and executing the appropriate commands.

pub mod agents;
pub mod chat;
pub mod say;

use std::error::Error;
use std::io::Write;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::cli::agents::list_agents;
use crate::cli::chat::run_chat;
use crate::cli::say::run_say;
use crate::core::config::Config;
use crate::core::session::ChatSession;
use crate::core::store::StoreUpdate;
use crate::utils::logging::TranscriptLog;

#[derive(Parser)]
#[command(name = "arcdesk")]
#[command(about = "Chat with locally hosted language models")]
#[command(
    long_about = "Arcdesk streams replies from a local model server (Ollama, LM Studio or a \
llama.cpp server) into a conversation with one of several agents. Without a configured \
server it answers with built-in mock responses.\n\n\
Environment Variables:\n\
  ARCDESK_LOG       Diagnostic log filter (e.g. debug, arcdesk=trace); RUST_LOG also works\n\n\
Chat commands:\n\
  /new [agent]      Start a new conversation, optionally with another agent\n\
  /agents           List agents\n\
  /archive          Archive the current conversation and start a new one\n\
  /stop             Interrupt the reply being streamed\n\
  /log              Pause or resume the --log transcript\n\
  /quit             Leave the chat"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Backend to use: ollama, lmstudio, llamacpp or mock
    #[arg(short = 'p', long, global = true, value_name = "PROVIDER")]
    pub provider: Option<String>,

    /// Base URL of the backend server
    #[arg(long, global = true, value_name = "URL")]
    pub base_url: Option<String>,

    /// Model to use for every agent
    #[arg(short = 'm', long, global = true, value_name = "MODEL")]
    pub model: Option<String>,

    /// Agent for the conversation
    #[arg(short = 'a', long, global = true, value_name = "AGENT")]
    pub agent: Option<String>,

    /// Append the conversation to this file
    #[arg(short = 'l', long, global = true)]
    pub log: Option<PathBuf>,

    /// Read configuration from this file instead of the default location
    #[arg(short = 'c', long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start an interactive chat (default)
    Chat,
    /// Send one prompt and print the reply
    Say {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        prompt: Vec<String>,
    },
    /// List configured agents
    Agents {
        /// Also list the models the backend offers
        #[arg(long)]
        models: bool,
    },
}

impl Args {
    /// Config file contents with command-line overrides applied.
    pub fn resolve_config(&self) -> Result<Config, Box<dyn Error>> {
        let mut config = Config::load(self.config.as_deref())?;
        if let Some(provider) = &self.provider {
            config.provider.kind = Some(provider.clone());
        }
        if let Some(base_url) = &self.base_url {
            config.provider.base_url = Some(base_url.clone());
        }
        if let Some(model) = &self.model {
            config.provider.model = Some(model.clone());
        }
        if let Some(agent) = &self.agent {
            config.default_agent = Some(agent.clone());
        }
        Ok(config)
    }

    pub fn build_session(&self, config: &Config) -> Result<ChatSession, Box<dyn Error>> {
        let transcript = match &self.log {
            Some(path) => TranscriptLog::to_file(path)
                .map_err(|err| format!("Cannot write log file {}: {err}", path.display()))?,
            None => TranscriptLog::disabled(),
        };
        Ok(ChatSession::from_config(config).with_transcript(transcript))
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("ARCDESK_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    // A second initialisation (tests, embedding) is harmless.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Print the text an update adds to the reply; failures go to stderr.
pub(crate) fn render_update(update: &StoreUpdate) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    match update {
        StoreUpdate::Appended { content, .. } => {
            write!(stdout, "{content}")?;
            stdout.flush()
        }
        StoreUpdate::Settled { content, .. } => {
            writeln!(stdout, "{content}")?;
            stdout.flush()
        }
        StoreUpdate::Failed { error, .. } => {
            writeln!(stdout)?;
            eprintln!("Error: {error}");
            Ok(())
        }
        StoreUpdate::Ignored => Ok(()),
    }
}

pub fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();
    tokio::runtime::Runtime::new()?.block_on(async_main())
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let config = args.resolve_config()?;

    match &args.command {
        None | Some(Commands::Chat) => {
            let session = args.build_session(&config)?;
            run_chat(session, config.default_agent()).await
        }
        Some(Commands::Say { prompt }) => {
            let session = args.build_session(&config)?;
            run_say(session, config.default_agent(), prompt).await
        }
        Some(Commands::Agents { models }) => {
            let session = ChatSession::from_config(&config);
            list_agents(&session, *models).await
        }
    }
}
