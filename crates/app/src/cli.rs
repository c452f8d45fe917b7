use clap::Parser;
use shared::settings::DEFAULT_SYSTEM_PROMPT;
use std::path::PathBuf;

/// Chat with Deepseek, Qwen or Hunyuan models from the terminal.
#[derive(Debug, Parser)]
#[command(name = "stream-chat", version, about)]
pub struct Cli {
    /// Model to use (e.g. deepseek-chat, qwen-max, hunyuan-turbo). Saved as
    /// the new default.
    #[arg(short, long)]
    pub model: Option<String>,

    /// Key-value store holding API keys and preferences.
    #[arg(long, env = "STREAM_CHAT_STORE")]
    pub store: Option<PathBuf>,

    /// System prompt sent ahead of the conversation.
    #[arg(long, default_value = DEFAULT_SYSTEM_PROMPT)]
    pub system_prompt: String,

    /// Where `/save` writes transcripts when no directory is given.
    #[arg(long, default_value = ".")]
    pub transcript_dir: PathBuf,
}
