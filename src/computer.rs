use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::SessionError;
use crate::items::Point;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Browser,
    Windows,
    Mac,
    Linux,
}

impl Environment {
    /// Whether actions land somewhere addressable by URL, which makes the
    /// post-action location fetch and deny-list check applicable.
    pub fn is_url_addressable(&self) -> bool {
        matches!(self, Environment::Browser)
    }
}

/// The controllable environment: one named method per action kind, plus
/// observation capture. `current_url`, `goto` and `back` only make sense for
/// browser-like environments and default to an error elsewhere.
#[async_trait]
pub trait Computer: Send + Sync {
    fn environment(&self) -> Environment;
    fn dimensions(&self) -> (u32, u32);

    /// Base64-encoded PNG of the current screen.
    async fn screenshot(&self) -> Result<String, SessionError>;

    async fn current_url(&self) -> Result<String, SessionError> {
        Err(SessionError::Computer(
            "environment is not url-addressable".into(),
        ))
    }

    async fn click(&self, x: i64, y: i64, button: &str) -> Result<(), SessionError>;
    async fn double_click(&self, x: i64, y: i64) -> Result<(), SessionError>;
    async fn move_mouse(&self, x: i64, y: i64) -> Result<(), SessionError>;
    async fn scroll(
        &self,
        x: i64,
        y: i64,
        scroll_x: i64,
        scroll_y: i64,
    ) -> Result<(), SessionError>;
    async fn type_text(&self, text: &str) -> Result<(), SessionError>;
    async fn keypress(&self, keys: &[String]) -> Result<(), SessionError>;
    async fn drag(&self, path: &[Point]) -> Result<(), SessionError>;
    async fn wait(&self) -> Result<(), SessionError>;

    async fn goto(&self, _url: &str) -> Result<(), SessionError> {
        Err(SessionError::Computer(
            "environment is not url-addressable".into(),
        ))
    }

    async fn back(&self) -> Result<(), SessionError> {
        Err(SessionError::Computer(
            "environment is not url-addressable".into(),
        ))
    }
}

/// Tool declaration sent with every model request.
pub fn computer_tool(computer: &dyn Computer) -> Value {
    let (width, height) = computer.dimensions();
    json!({
        "type": "computer_use_preview",
        "display_width": width,
        "display_height": height,
        "environment": computer.environment(),
    })
}
