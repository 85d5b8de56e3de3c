use std::io::{self, Write};

use async_trait::async_trait;

use crate::error::SessionError;

/// Line-oriented human I/O: instructions, critique text, and y/n consent.
#[async_trait]
pub trait Prompter: Send + Sync {
    /// Reads one line, `None` on end of input.
    async fn read_line(&self, prompt: &str) -> Result<Option<String>, SessionError>;

    /// Presents a safety-check message and reads a binary decision.
    async fn confirm(&self, message: &str) -> Result<bool, SessionError>;

    fn show(&self, text: &str);
}

pub struct StdioPrompter;

impl StdioPrompter {
    fn blocking_read(prompt: String) -> io::Result<Option<String>> {
        let mut out = io::stdout();
        write!(out, "{prompt}")?;
        out.flush()?;
        let mut buf = String::new();
        let n = io::stdin().read_line(&mut buf)?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(buf.trim_end_matches(['\r', '\n']).to_string()))
    }
}

#[async_trait]
impl Prompter for StdioPrompter {
    async fn read_line(&self, prompt: &str) -> Result<Option<String>, SessionError> {
        let prompt = prompt.to_string();
        let line = tokio::task::spawn_blocking(move || Self::blocking_read(prompt))
            .await
            .map_err(|e| SessionError::Io(io::Error::other(e)))??;
        Ok(line)
    }

    async fn confirm(&self, message: &str) -> Result<bool, SessionError> {
        let prompt = format!("safety check: {message}\nacknowledge and proceed? [y/N] ");
        let answer = self.read_line(&prompt).await?.unwrap_or_default();
        Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
    }

    fn show(&self, text: &str) {
        println!("{text}");
    }
}
