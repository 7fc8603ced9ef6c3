//! Line-oriented interactive chat.

use std::error::Error;

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::cli::render_update;
use crate::core::session::ChatSession;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatInput {
    Message(String),
    New(Option<String>),
    Agents,
    Archive,
    Stop,
    Log,
    Quit,
    Unknown(String),
    Empty,
}

impl ChatInput {
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return ChatInput::Empty;
        }
        let Some(command) = trimmed.strip_prefix('/') else {
            return ChatInput::Message(trimmed.to_string());
        };

        let mut parts = command.split_whitespace();
        let name = parts.next().unwrap_or_default();
        let arg = parts.next().map(str::to_string);
        match name {
            "new" => ChatInput::New(arg),
            "agents" => ChatInput::Agents,
            "archive" => ChatInput::Archive,
            "stop" => ChatInput::Stop,
            "log" => ChatInput::Log,
            "quit" | "exit" => ChatInput::Quit,
            other => ChatInput::Unknown(other.to_string()),
        }
    }
}

fn start_conversation(session: &mut ChatSession, agent_id: &str) -> Result<(), Box<dyn Error>> {
    session.store_mut().create_conversation(agent_id, None)?;
    if let Some(conversation) = session.store().active_conversation() {
        eprintln!("[{}]", conversation.title);
    }
    Ok(())
}

fn toggle_transcript(session: &mut ChatSession) {
    let transcript = session.transcript_mut();
    let Some(path) = transcript.file_path().map(|p| p.display().to_string()) else {
        eprintln!("No log file; start with --log <file> to record the chat.");
        return;
    };
    if transcript.is_active() {
        transcript.pause();
        eprintln!("Logging paused ({path})");
    } else {
        transcript.resume();
        eprintln!("Logging resumed ({path})");
    }
}

pub async fn run_chat(mut session: ChatSession, default_agent: &str) -> Result<(), Box<dyn Error>> {
    start_conversation(&mut session, default_agent)?;
    eprintln!(
        "Provider: {}. Type /quit to leave, /stop to interrupt a reply.",
        session.adapter().kind()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        if session.is_streaming() {
            tokio::select! {
                update = session.next_update() => {
                    if let Some(update) = update {
                        render_update(&update)?;
                    }
                }
                line = lines.next_line() => {
                    match line?.as_deref().map(ChatInput::parse) {
                        Some(ChatInput::Stop) => {
                            session.cancel();
                            println!();
                            eprintln!("(stopped)");
                        }
                        Some(ChatInput::Quit) | None => {
                            session.cancel();
                            break;
                        }
                        Some(_) => eprintln!("A reply is still streaming; /stop interrupts it."),
                    }
                }
            }
            continue;
        }

        let Some(line) = lines.next_line().await? else {
            break;
        };
        match ChatInput::parse(&line) {
            ChatInput::Empty | ChatInput::Stop => {}
            ChatInput::Quit => break,
            ChatInput::Message(text) => {
                if let Err(err) = session.send_message(&text, None) {
                    eprintln!("❌ {err}");
                }
            }
            ChatInput::New(agent) => {
                let agent = agent.unwrap_or_else(|| {
                    session
                        .store()
                        .active_conversation()
                        .map(|c| c.agent_id.clone())
                        .unwrap_or_else(|| default_agent.to_string())
                });
                if let Err(err) = start_conversation(&mut session, &agent) {
                    eprintln!("❌ {err}");
                }
            }
            ChatInput::Agents => {
                for agent in session.store().agent_configs() {
                    let marker = if agent.enabled { " " } else { "-" };
                    eprintln!("{marker} {:<10} {}", agent.id, agent.model);
                }
            }
            ChatInput::Archive => {
                if let Some(conversation) = session.store().active_conversation() {
                    let id = conversation.id.clone();
                    let agent = conversation.agent_id.clone();
                    session.store_mut().archive_conversation(&id)?;
                    start_conversation(&mut session, &agent)?;
                }
            }
            ChatInput::Log => toggle_transcript(&mut session),
            ChatInput::Unknown(name) => eprintln!("Unknown command: /{name}"),
        }
    }

    Ok(())
}
