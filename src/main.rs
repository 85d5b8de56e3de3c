use anyhow::Result;
use tracing_subscriber::EnvFilter;

use backseat::{
    BrowserSettings, ChromiumComputer, Computer, ModelConfig, ResponsesClient, Session,
    SessionConfig, StdioPrompter, UrlPolicy,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let headless = std::env::var("BACKSEAT_HEADLESS").map(|v| v != "0").unwrap_or(false);
    let settings = BrowserSettings {
        headless,
        ..Default::default()
    };
    let computer = match std::env::var("BACKSEAT_CHROME_WS") {
        Ok(ws) if !ws.trim().is_empty() => ChromiumComputer::connect(&ws, settings).await?,
        _ => ChromiumComputer::launch(settings).await?,
    };

    let start_url = std::env::var("BACKSEAT_START_URL")
        .unwrap_or_else(|_| "https://www.bing.com".to_string());
    computer.goto(&start_url).await?;

    let model = ResponsesClient::new(ModelConfig::default())?;
    let mut session = Session::new(
        computer,
        model,
        StdioPrompter,
        UrlPolicy::default(),
        SessionConfig::default(),
    );
    session.run().await?;
    Ok(())
}
