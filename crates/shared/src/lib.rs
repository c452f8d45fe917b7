pub mod storage;

pub mod agent_api {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum Role {
        System,
        User,
        Assistant,
    }

    impl Role {
        pub fn as_str(&self) -> &'static str {
            match self {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
            }
        }

        /// Label used when a conversation is exported as plain text.
        pub fn transcript_label(&self) -> &'static str {
            match self {
                Role::User => "User",
                Role::System | Role::Assistant => "AI",
            }
        }
    }

    /// One turn of a conversation, in the shape chat-completion endpoints expect.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ChatMessage {
        pub role: Role,
        pub content: String,
    }

    impl ChatMessage {
        pub fn new(role: Role, content: impl Into<String>) -> Self {
            Self {
                role,
                content: content.into(),
            }
        }

        pub fn system(content: impl Into<String>) -> Self {
            Self::new(Role::System, content)
        }

        pub fn user(content: impl Into<String>) -> Self {
            Self::new(Role::User, content)
        }

        pub fn assistant(content: impl Into<String>) -> Self {
            Self::new(Role::Assistant, content)
        }
    }
}

pub mod settings {
    use crate::storage::KeyValueStore;
    use anyhow::Result;

    pub const SELECTED_MODEL_KEY: &str = "selectedModel";
    pub const DARK_MODE_KEY: &str = "darkMode";

    pub const DEFAULT_MODEL: &str = "deepseek-chat";
    pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

    /// User preferences that live next to the API keys in the key-value store.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Preferences {
        pub selected_model: String,
        pub dark_mode: bool,
    }

    impl Default for Preferences {
        fn default() -> Self {
            Self {
                selected_model: DEFAULT_MODEL.into(),
                dark_mode: false,
            }
        }
    }

    impl Preferences {
        /// Read preferences, falling back to defaults for anything missing.
        pub fn load(store: &dyn KeyValueStore) -> Self {
            let defaults = Self::default();
            let selected_model = store
                .get(SELECTED_MODEL_KEY)
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty())
                .unwrap_or(defaults.selected_model);
            let dark_mode = store
                .get(DARK_MODE_KEY)
                .map(|v| v.trim() == "true")
                .unwrap_or(defaults.dark_mode);
            Self {
                selected_model,
                dark_mode,
            }
        }

        pub fn save(&self, store: &dyn KeyValueStore) -> Result<()> {
            store.set(SELECTED_MODEL_KEY, &self.selected_model)?;
            store.set(DARK_MODE_KEY, if self.dark_mode { "true" } else { "false" })?;
            Ok(())
        }
    }

}
