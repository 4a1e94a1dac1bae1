//! Display blocks, serialized in the Slack Block Kit shape.

use serde::{Deserialize, Serialize};

/// Block Kit rejects messages with more blocks than this.
pub const MAX_BLOCKS: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextObject {
    PlainText {
        text: String,
        #[serde(default)]
        emoji: bool,
    },
    Mrkdwn {
        text: String,
    },
}

impl TextObject {
    pub fn text(&self) -> &str {
        match self {
            TextObject::PlainText { text, .. } | TextObject::Mrkdwn { text } => text,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Header { text: TextObject },
    Divider,
    Section { text: TextObject },
    Context { elements: Vec<TextObject> },
}

impl Block {
    pub fn header(text: impl Into<String>) -> Self {
        Block::Header {
            text: TextObject::PlainText {
                text: text.into(),
                emoji: true,
            },
        }
    }

    pub fn section(text: impl Into<String>) -> Self {
        Block::Section {
            text: TextObject::Mrkdwn { text: text.into() },
        }
    }

    pub fn context(text: impl Into<String>) -> Self {
        Block::Context {
            elements: vec![TextObject::Mrkdwn { text: text.into() }],
        }
    }

    /// All text carried by the block, for previews and assertions.
    pub fn text(&self) -> String {
        match self {
            Block::Header { text } | Block::Section { text } => text.text().to_string(),
            Block::Context { elements } => elements
                .iter()
                .map(TextObject::text)
                .collect::<Vec<_>>()
                .join("\n"),
            Block::Divider => String::new(),
        }
    }
}

/// A finished chat message: blocks plus the plain-text notification preview.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RenderedMessage {
    pub text: String,
    pub blocks: Vec<Block>,
}

impl RenderedMessage {
    pub fn new(text: impl Into<String>, blocks: Vec<Block>) -> Self {
        Self {
            text: text.into(),
            blocks,
        }
    }

    pub fn contains_text(&self, needle: &str) -> bool {
        self.blocks.iter().any(|b| b.text().contains(needle))
    }
}
