//! Scripted collaborators for exercising the turn machinery without a
//! browser, a network, or a terminal.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::computer::{Computer, Environment};
use crate::error::SessionError;
use crate::items::{Action, Content, Item, Point, Role};
use crate::model::ModelClient;
use crate::prompt::Prompter;

pub(crate) fn call(id: &str, action: Action) -> Item {
    Item::ComputerCall {
        call_id: id.into(),
        action,
        pending_safety_checks: vec![],
    }
}

pub(crate) fn assistant(text: &str) -> Item {
    Item::Message {
        role: Role::Assistant,
        content: Content::Text(text.into()),
    }
}

/// Records every invocation; `goto` also moves the reported location.
#[derive(Clone)]
pub(crate) struct FakeComputer {
    environment: Environment,
    location: Arc<Mutex<String>>,
    invoked: Arc<Mutex<Vec<String>>>,
}

impl FakeComputer {
    pub fn browser(url: &str) -> Self {
        Self {
            environment: Environment::Browser,
            location: Arc::new(Mutex::new(url.into())),
            invoked: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn desktop() -> Self {
        Self {
            environment: Environment::Linux,
            location: Arc::new(Mutex::new(String::new())),
            invoked: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn invoked(&self) -> Vec<String> {
        self.invoked.lock().unwrap().clone()
    }

    fn record(&self, entry: String) {
        self.invoked.lock().unwrap().push(entry);
    }
}

#[async_trait]
impl Computer for FakeComputer {
    fn environment(&self) -> Environment {
        self.environment
    }

    fn dimensions(&self) -> (u32, u32) {
        (1280, 800)
    }

    async fn screenshot(&self) -> Result<String, SessionError> {
        self.record("screenshot".into());
        Ok("c2NyZWVu".into())
    }

    async fn current_url(&self) -> Result<String, SessionError> {
        self.record("current_url".into());
        Ok(self.location.lock().unwrap().clone())
    }

    async fn click(&self, x: i64, y: i64, button: &str) -> Result<(), SessionError> {
        self.record(format!("click {x},{y} {button}"));
        Ok(())
    }

    async fn double_click(&self, x: i64, y: i64) -> Result<(), SessionError> {
        self.record(format!("double_click {x},{y}"));
        Ok(())
    }

    async fn move_mouse(&self, x: i64, y: i64) -> Result<(), SessionError> {
        self.record(format!("move {x},{y}"));
        Ok(())
    }

    async fn scroll(
        &self,
        x: i64,
        y: i64,
        scroll_x: i64,
        scroll_y: i64,
    ) -> Result<(), SessionError> {
        self.record(format!("scroll {x},{y} by {scroll_x},{scroll_y}"));
        Ok(())
    }

    async fn type_text(&self, text: &str) -> Result<(), SessionError> {
        self.record(format!("type {text}"));
        Ok(())
    }

    async fn keypress(&self, keys: &[String]) -> Result<(), SessionError> {
        self.record(format!("keypress {}", keys.join("+")));
        Ok(())
    }

    async fn drag(&self, path: &[Point]) -> Result<(), SessionError> {
        self.record(format!("drag {} points", path.len()));
        Ok(())
    }

    async fn wait(&self) -> Result<(), SessionError> {
        self.record("wait".into());
        Ok(())
    }

    async fn goto(&self, url: &str) -> Result<(), SessionError> {
        self.record(format!("goto {url}"));
        *self.location.lock().unwrap() = url.to_string();
        Ok(())
    }

    async fn back(&self) -> Result<(), SessionError> {
        self.record("back".into());
        Ok(())
    }
}

/// Replays canned response batches and captures every input it was sent.
#[derive(Clone)]
pub(crate) struct ScriptedModel {
    batches: Arc<Mutex<VecDeque<Vec<Item>>>>,
    sent: Arc<Mutex<Vec<Vec<Item>>>>,
}

impl ScriptedModel {
    pub fn new(batches: Vec<Vec<Item>>) -> Self {
        Self {
            batches: Arc::new(Mutex::new(batches.into())),
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn sent(&self) -> Vec<Vec<Item>> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn send(&self, input: &[Item], _tools: &[Value]) -> Result<Vec<Item>, SessionError> {
        self.sent.lock().unwrap().push(input.to_vec());
        self.batches
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| SessionError::ModelProtocol("model script exhausted".into()))
    }
}

/// Queued lines and consent answers; an exhausted line queue reads as end of
/// input, an exhausted consent queue approves.
#[derive(Clone)]
pub(crate) struct ScriptedPrompter {
    lines: Arc<Mutex<VecDeque<Option<String>>>>,
    confirms: Arc<Mutex<VecDeque<bool>>>,
    confirmed: Arc<Mutex<Vec<String>>>,
    shown: Arc<Mutex<Vec<String>>>,
}

impl ScriptedPrompter {
    pub fn new(lines: Vec<Option<&str>>, confirms: Vec<bool>) -> Self {
        Self {
            lines: Arc::new(Mutex::new(
                lines
                    .into_iter()
                    .map(|l| l.map(String::from))
                    .collect(),
            )),
            confirms: Arc::new(Mutex::new(confirms.into())),
            confirmed: Arc::new(Mutex::new(Vec::new())),
            shown: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn confirmed_messages(&self) -> Vec<String> {
        self.confirmed.lock().unwrap().clone()
    }

    pub fn shown(&self) -> Vec<String> {
        self.shown.lock().unwrap().clone()
    }
}

#[async_trait]
impl Prompter for ScriptedPrompter {
    async fn read_line(&self, _prompt: &str) -> Result<Option<String>, SessionError> {
        Ok(self.lines.lock().unwrap().pop_front().flatten())
    }

    async fn confirm(&self, message: &str) -> Result<bool, SessionError> {
        self.confirmed.lock().unwrap().push(message.to_string());
        Ok(self.confirms.lock().unwrap().pop_front().unwrap_or(true))
    }

    fn show(&self, text: &str) {
        self.shown.lock().unwrap().push(text.to_string());
    }
}
