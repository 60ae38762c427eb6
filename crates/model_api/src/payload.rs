use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

/// Request body for the streaming endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelApiRequest {
    pub model: String,
    pub system: String,
    pub messages: Vec<WireMessage>,
    /// Default: true.
    #[serde(default = "default_true")]
    pub stream: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: String,
    pub content: Vec<WireContent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireContent {
    Text { text: String },
    Image { image: String },
}

impl ModelApiRequest {
    pub fn new(model: impl Into<String>, system: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system: system.into(),
            messages: Vec::new(),
            stream: true,
        }
    }

    pub fn with_message(mut self, message: WireMessage) -> Self {
        self.messages.push(message);
        self
    }
}

impl WireMessage {
    pub fn user(content: Vec<WireContent>) -> Self {
        Self {
            role: "user".to_string(),
            content,
        }
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: vec![WireContent::Text { text: text.into() }],
        }
    }
}

/// Encodes raw PNG bytes as an inline `data:` URL.
pub fn png_data_url(bytes: &[u8]) -> String {
    format!("data:image/png;base64,{}", STANDARD.encode(bytes))
}

/// Returns `true` for `data:<mime>;base64,<payload>` URLs whose payload decodes.
pub fn is_valid_data_url(url: &str) -> bool {
    let Some(rest) = url.strip_prefix("data:") else {
        return false;
    };
    let Some((header, payload)) = rest.split_once(',') else {
        return false;
    };
    header.ends_with(";base64") && STANDARD.decode(payload).is_ok()
}
