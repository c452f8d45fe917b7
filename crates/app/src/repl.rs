//! Line-oriented front end: plain lines are chat messages, `/` lines are
//! commands.

use crate::terminal::TerminalSink;
use crate::utils;
use anyhow::{anyhow, Result};
use chat_host::{ChatSession, TurnState};
use providers::{ChatError, Provider};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};

const HELP: &str = "\
Commands:
  /model [id]            show or switch the model
  /key <provider> <key>  store an API key (deepseek, qwen, hunyuan)
  /unkey <provider>      forget a stored API key
  /keys                  list which providers have a key
  /save [dir]            export the conversation as a text file
  /dark                  toggle dark mode
  /reset                 start a new conversation
  /help                  show this help
  /quit                  exit";

#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Model(Option<String>),
    Key { provider: Provider, key: String },
    Unkey(Provider),
    Keys,
    Save(Option<PathBuf>),
    Dark,
    Reset,
    Help,
    Quit,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Input {
    Message(String),
    Command(Command),
    Empty,
}

impl Input {
    pub fn parse(line: &str) -> Result<Input> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(Input::Empty);
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Ok(Input::Message(line.to_string()));
        };
        let mut parts = rest.split_whitespace();
        let name = parts.next().unwrap_or_default();
        let arg = parts.next();
        let command = match name {
            "model" => Command::Model(arg.map(str::to_string)),
            "key" => {
                let provider = arg.ok_or_else(|| anyhow!("usage: /key <provider> <key>"))?;
                let key = parts
                    .next()
                    .ok_or_else(|| anyhow!("usage: /key <provider> <key>"))?;
                Command::Key {
                    provider: provider.parse()?,
                    key: key.to_string(),
                }
            }
            "unkey" => Command::Unkey(
                arg.ok_or_else(|| anyhow!("usage: /unkey <provider>"))?
                    .parse()?,
            ),
            "keys" => Command::Keys,
            "save" => Command::Save(arg.map(PathBuf::from)),
            "dark" => Command::Dark,
            "reset" => Command::Reset,
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => return Err(anyhow!("Unknown command: /{} (try /help)", other)),
        };
        Ok(Input::Command(command))
    }
}

fn prompt(session: &ChatSession) {
    let label = if session.state() == TurnState::PendingAuth {
        "key".to_string()
    } else {
        session.selected_model().to_string()
    };
    print!("{}> ", label);
    if let Err(e) = std::io::stdout().flush() {
        tracing::debug!(error = %e, "stdout flush failed");
    }
}

/// Print errors the session did not already show through the sink.
fn report(sink: &TerminalSink, err: &ChatError) {
    if !utils::is_rendered(err) {
        sink.warn(&err.to_string());
    }
}

pub async fn run(
    session: &mut ChatSession,
    sink: &TerminalSink,
    transcript_dir: &Path,
) -> Result<()> {
    sink.notice(&format!(
        "Chatting with {} ({}). Type /help for commands.",
        session.binding().provider,
        session.selected_model()
    ));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt(session);
        let Some(line) = lines.next_line().await? else {
            break;
        };

        let input = match Input::parse(&line) {
            Ok(input) => input,
            Err(e) => {
                sink.warn(&e.to_string());
                continue;
            }
        };

        match input {
            Input::Empty => {}
            Input::Message(text) => {
                let result = if session.state() == TurnState::PendingAuth {
                    session.submit_api_key(&text).await
                } else {
                    session.submit(&text).await
                };
                if let Err(e) = result {
                    report(sink, &e);
                }
            }
            Input::Command(Command::Quit) => break,
            Input::Command(command) => {
                if let Err(e) = run_command(session, sink, transcript_dir, command).await {
                    sink.warn(&format!("{:#}", e));
                }
            }
        }
    }
    tracing::debug!(session = %session.id(), turns = session.log().len(), "exiting");
    Ok(())
}

async fn run_command(
    session: &mut ChatSession,
    sink: &TerminalSink,
    transcript_dir: &Path,
    command: Command,
) -> Result<()> {
    match command {
        Command::Model(None) => {
            let binding = session.binding();
            sink.notice(&format!(
                "Model: {} ({}{})",
                session.selected_model(),
                binding.provider,
                if binding.fallback { ", fallback" } else { "" }
            ));
        }
        Command::Model(Some(model)) => {
            session.select_model(&model)?;
            sink.notice(&format!(
                "Switched to {} ({})",
                session.selected_model(),
                session.binding().provider
            ));
        }
        Command::Key { provider, key } => {
            // Resends a message that was waiting for this provider's key.
            match session.provide_api_key(provider, &key).await {
                Ok(_) => sink.notice(&format!("{} API key saved.", provider)),
                Err(e) if utils::is_rendered(&e) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Command::Unkey(provider) => {
            session.remove_api_key(provider)?;
            sink.notice(&format!("{} API key removed.", provider));
        }
        Command::Keys => {
            for (provider, present) in session.key_status() {
                sink.notice(&format!(
                    "{:<10} {}",
                    provider.id(),
                    if present { "set" } else { "not set" }
                ));
            }
        }
        Command::Save(dir) => {
            let transcript = session
                .transcript()
                .ok_or_else(|| anyhow!("Nothing to save yet."))?;
            let path = transcript.save_in(dir.as_deref().unwrap_or(transcript_dir))?;
            sink.notice(&format!("Saved {}", path.display()));
        }
        Command::Dark => {
            let dark = session.toggle_dark_mode()?;
            sink.set_dark(dark);
            sink.notice(if dark { "Dark mode on." } else { "Dark mode off." });
        }
        Command::Reset => {
            session.reset();
            sink.notice("Conversation cleared.");
        }
        Command::Help => println!("{}", HELP),
        Command::Quit => {}
    }
    Ok(())
}
