//! Plain-text export of a conversation.

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use shared::agent_api::ChatMessage;
use std::fs;
use std::path::{Path, PathBuf};

const SEPARATOR: &str = "----------------------------------------";

pub struct Transcript<'a> {
    turns: &'a [ChatMessage],
    model: &'a str,
    saved_at: DateTime<Local>,
}

impl<'a> Transcript<'a> {
    pub fn new(turns: &'a [ChatMessage], model: &'a str, saved_at: DateTime<Local>) -> Self {
        Self {
            turns,
            model,
            saved_at,
        }
    }

    pub fn now(turns: &'a [ChatMessage], model: &'a str) -> Self {
        Self::new(turns, model, Local::now())
    }

    pub fn render(&self) -> String {
        let mut out = String::from("Chat History\n\n");
        out.push_str(&format!(
            "Saved at: {}\n",
            self.saved_at.format("%Y-%m-%d %H:%M:%S")
        ));
        out.push_str(&format!("Model: {}\n\n", self.model));
        out.push_str("Conversation:\n");
        out.push_str(SEPARATOR);
        out.push_str("\n\n");
        for turn in self.turns {
            out.push_str(&format!(
                "{}:\n{}\n\n",
                turn.role.transcript_label(),
                turn.content
            ));
        }
        out
    }

    /// `chat_history_<UTC timestamp>.txt`, with `:` and `.` made file-safe.
    pub fn file_name(&self) -> String {
        let stamp = self
            .saved_at
            .with_timezone(&Utc)
            .format("%Y-%m-%dT%H:%M:%S%.3fZ")
            .to_string()
            .replace([':', '.'], "-");
        format!("chat_history_{}.txt", stamp)
    }

    /// Write the transcript into `dir` and return the file's path.
    pub fn save_in(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        let path = dir.join(self.file_name());
        fs::write(&path, self.render())
            .with_context(|| format!("writing transcript {}", path.display()))?;
        tracing::info!(path = %path.display(), turns = self.turns.len(), "transcript saved");
        Ok(path)
    }
}
