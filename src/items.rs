//! Conversation items and the action vocabulary, in the wire shape the
//! Responses API produces and consumes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl Content {
    /// Concatenated text of the content, image parts skipped.
    pub fn text(&self) -> String {
        match self {
            Content::Text(t) => t.clone(),
            Content::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::InputText { text } | ContentPart::OutputText { text } => {
                        Some(text.as_str())
                    }
                    ContentPart::InputImage { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    InputText { text: String },
    InputImage { image_url: String },
    OutputText { text: String },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SafetyCheck {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub code: String,
    pub message: String,
}

/// Payload of a `computer_call_output`: a screenshot data URL plus, for
/// URL-addressable environments, the location it was taken at.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    #[serde(rename = "type")]
    pub kind: String, // "input_image"
    pub image_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_url: Option<String>,
}

impl Observation {
    pub fn screenshot(b64_png: &str) -> Self {
        Self {
            kind: "input_image".into(),
            image_url: png_data_url(b64_png),
            current_url: None,
        }
    }
}

pub fn png_data_url(b64: &str) -> String {
    format!("data:image/png;base64,{b64}")
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Item {
    Message {
        role: Role,
        content: Content,
    },
    ComputerCall {
        call_id: String,
        action: Action,
        #[serde(default)]
        pending_safety_checks: Vec<SafetyCheck>,
    },
    ComputerCallOutput {
        call_id: String,
        #[serde(default)]
        acknowledged_safety_checks: Vec<SafetyCheck>,
        output: Observation,
    },
    /// Reasoning items interleave with messages and calls in responses and
    /// must be sent back verbatim; the body is carried opaquely.
    Reasoning {
        #[serde(flatten)]
        body: Value,
    },
}

impl Item {
    pub fn user_text(text: impl Into<String>) -> Self {
        Item::Message {
            role: Role::User,
            content: Content::Text(text.into()),
        }
    }

    pub fn role(&self) -> Option<Role> {
        match self {
            Item::Message { role, .. } => Some(*role),
            _ => None,
        }
    }

    pub fn call_id(&self) -> Option<&str> {
        match self {
            Item::ComputerCall { call_id, .. } | Item::ComputerCallOutput { call_id, .. } => {
                Some(call_id)
            }
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: i64,
    pub y: i64,
}

/// Kind-tagged action directive. Unknown kinds fail decoding outright rather
/// than being carried as an opaque blob the executor cannot dispatch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Click {
        x: i64,
        y: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        button: Option<String>,
    },
    DoubleClick {
        x: i64,
        y: i64,
    },
    Move {
        x: i64,
        y: i64,
    },
    Scroll {
        x: i64,
        y: i64,
        scroll_x: i64,
        scroll_y: i64,
    },
    Type {
        text: String,
    },
    Keypress {
        keys: Vec<String>,
    },
    Drag {
        path: Vec<Point>,
    },
    Wait,
    Screenshot,
    Goto {
        url: String,
    },
    Back,
}
