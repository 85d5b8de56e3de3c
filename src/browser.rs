use anyhow::Result;
use base64::{engine::general_purpose::STANDARD, Engine};
use chromiumoxide::browser::Browser as OxideBrowser;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchMouseEventParams, DispatchMouseEventType, InsertTextParams, MouseButton,
};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::layout::Point as CdpPoint;
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::sleep;

use async_trait::async_trait;

use crate::computer::{Computer, Environment};
use crate::error::SessionError;
use crate::items::Point;

#[derive(Clone)]
pub struct BrowserSettings {
    pub headless: bool,
    pub user_agent: Option<String>,
    pub dimensions: (u32, u32),
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            user_agent: None,
            dimensions: (1280, 800),
        }
    }
}

/// Chromium-driven [`Computer`]: environment `browser`, actions dispatched
/// over CDP against a single page.
pub struct ChromiumComputer {
    page: Page,
    dimensions: (u32, u32),
    _browser: OxideBrowser,
}

fn cap(e: impl std::fmt::Display) -> SessionError {
    SessionError::Computer(e.to_string())
}

impl ChromiumComputer {
    pub async fn launch(settings: BrowserSettings) -> Result<Self, SessionError> {
        let mut builder = chromiumoxide::browser::BrowserConfig::builder();
        if !settings.headless {
            builder = builder.with_head();
        }
        // Unique user data dir per run to avoid ProcessSingleton profile lock
        // conflicts when Chromium restarts rapidly.
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let mut profile_dir: PathBuf = std::env::temp_dir();
        profile_dir.push(format!("backseat-profile-{}-{}", std::process::id(), ts));
        let _ = std::fs::create_dir_all(&profile_dir);
        builder = builder.user_data_dir(profile_dir.clone());
        builder = builder
            .arg(format!("--user-data-dir={}", profile_dir.display()))
            .arg("--no-first-run")
            .arg("--no-default-browser-check");
        let bcfg = builder.build().map_err(cap)?;
        let (browser, mut handler) = OxideBrowser::launch(bcfg).await.map_err(cap)?;
        tokio::spawn(async move { while let Some(_ev) = handler.next().await {} });
        let page = browser.new_page("about:blank").await.map_err(cap)?;
        Self::setup(page, browser, settings).await
    }

    pub async fn connect(ws_url: &str, settings: BrowserSettings) -> Result<Self, SessionError> {
        let (browser, mut handler) = OxideBrowser::connect(ws_url).await.map_err(cap)?;
        tokio::spawn(async move { while let Some(_ev) = handler.next().await {} });
        let page = browser.new_page("about:blank").await.map_err(cap)?;
        Self::setup(page, browser, settings).await
    }

    async fn setup(
        page: Page,
        browser: OxideBrowser,
        settings: BrowserSettings,
    ) -> Result<Self, SessionError> {
        if let Some(ua) = settings.user_agent {
            page.set_user_agent(ua).await.map_err(cap)?;
        }
        let computer = Self {
            page,
            dimensions: settings.dimensions,
            _browser: browser,
        };
        // Non-zero viewport or screenshots come back zero-width
        let _ = computer.override_viewport().await;
        Ok(computer)
    }

    async fn override_viewport(&self) -> Result<()> {
        self.page
            .execute(
                SetDeviceMetricsOverrideParams::builder()
                    .width(self.dimensions.0 as i64)
                    .height(self.dimensions.1 as i64)
                    .device_scale_factor(1.0)
                    .mobile(false)
                    .build()
                    .map_err(|e| anyhow::anyhow!(e))?,
            )
            .await?;
        Ok(())
    }

    async fn eval(&self, js: String) -> Result<()> {
        let eval = EvaluateParams::builder()
            .expression(js)
            .build()
            .map_err(|e| anyhow::anyhow!(e))?;
        self.page.execute(eval).await?;
        Ok(())
    }

    /// Rewrites new-tab escapes so the page stays controllable.
    async fn force_same_tab(&self) -> Result<()> {
        self.eval(
            r#"(() => {
                window.open = (u) => { if (u) location.href = u; return window; };
                for (const a of document.querySelectorAll('a[target="_blank"]')) a.target = '_self';
            })()"#
                .to_string(),
        )
        .await
    }

    async fn press_mouse(&self, x: i64, y: i64, button: MouseButton, clicks: i64) -> Result<()> {
        let cmd = DispatchMouseEventParams::builder()
            .x(x as f64)
            .y(y as f64)
            .button(button)
            .click_count(clicks);
        self.page
            .move_mouse(CdpPoint {
                x: x as f64,
                y: y as f64,
            })
            .await?
            .execute(
                cmd.clone()
                    .r#type(DispatchMouseEventType::MousePressed)
                    .build()
                    .map_err(|e| anyhow::anyhow!(e))?,
            )
            .await?;
        self.page
            .execute(
                cmd.r#type(DispatchMouseEventType::MouseReleased)
                    .build()
                    .map_err(|e| anyhow::anyhow!(e))?,
            )
            .await?;
        Ok(())
    }

    async fn settle(&self) {
        sleep(Duration::from_millis(400)).await;
    }
}

fn mouse_button(name: &str) -> MouseButton {
    match name {
        "right" => MouseButton::Right,
        "middle" => MouseButton::Middle,
        _ => MouseButton::Left,
    }
}

/// Model key names to DOM `KeyboardEvent.key` values.
fn dom_key(name: &str) -> String {
    match name.to_ascii_uppercase().as_str() {
        "ENTER" | "RETURN" => "Enter",
        "TAB" => "Tab",
        "ESC" | "ESCAPE" => "Escape",
        "BACKSPACE" => "Backspace",
        "DELETE" | "DEL" => "Delete",
        "SPACE" => " ",
        "CTRL" | "CONTROL" => "Control",
        "ALT" | "OPTION" => "Alt",
        "SHIFT" => "Shift",
        "CMD" | "META" | "WIN" | "SUPER" => "Meta",
        "UP" | "ARROWUP" => "ArrowUp",
        "DOWN" | "ARROWDOWN" => "ArrowDown",
        "LEFT" | "ARROWLEFT" => "ArrowLeft",
        "RIGHT" | "ARROWRIGHT" => "ArrowRight",
        "HOME" => "Home",
        "END" => "End",
        "PAGEUP" => "PageUp",
        "PAGEDOWN" => "PageDown",
        _ => return name.to_string(),
    }
    .to_string()
}

#[async_trait]
impl Computer for ChromiumComputer {
    fn environment(&self) -> Environment {
        Environment::Browser
    }

    fn dimensions(&self) -> (u32, u32) {
        self.dimensions
    }

    async fn screenshot(&self) -> Result<String, SessionError> {
        use chromiumoxide::page::ScreenshotParamsBuilder;
        let take = || async {
            self.page
                .screenshot(
                    ScreenshotParamsBuilder::default()
                        .full_page(false)
                        .omit_background(true)
                        .build(),
                )
                .await
        };
        match take().await {
            Ok(bytes) => Ok(STANDARD.encode(bytes)),
            Err(e) => {
                let msg = format!("{e}");
                if msg.contains("0 width") || msg.contains("0 height") {
                    // viewport collapsed after navigation; force it and retry once
                    let _ = self.override_viewport().await;
                    sleep(Duration::from_millis(50)).await;
                    let bytes = take().await.map_err(cap)?;
                    return Ok(STANDARD.encode(bytes));
                }
                Err(cap(e))
            }
        }
    }

    async fn current_url(&self) -> Result<String, SessionError> {
        Ok(self.page.url().await.map_err(cap)?.unwrap_or_default())
    }

    async fn click(&self, x: i64, y: i64, button: &str) -> Result<(), SessionError> {
        self.press_mouse(x, y, mouse_button(button), 1)
            .await
            .map_err(cap)?;
        // clicks are the usual new-tab trigger
        let _ = self.force_same_tab().await;
        Ok(())
    }

    async fn double_click(&self, x: i64, y: i64) -> Result<(), SessionError> {
        self.press_mouse(x, y, MouseButton::Left, 2)
            .await
            .map_err(cap)
    }

    async fn move_mouse(&self, x: i64, y: i64) -> Result<(), SessionError> {
        self.page
            .move_mouse(CdpPoint {
                x: x as f64,
                y: y as f64,
            })
            .await
            .map_err(cap)?;
        Ok(())
    }

    async fn scroll(
        &self,
        x: i64,
        y: i64,
        scroll_x: i64,
        scroll_y: i64,
    ) -> Result<(), SessionError> {
        self.page
            .move_mouse(CdpPoint {
                x: x as f64,
                y: y as f64,
            })
            .await
            .map_err(cap)?;
        self.eval(format!("window.scrollBy({scroll_x}, {scroll_y});"))
            .await
            .map_err(cap)
    }

    async fn type_text(&self, text: &str) -> Result<(), SessionError> {
        // Input.insertText feeds the focused element
        self.page
            .execute(InsertTextParams {
                text: text.to_string(),
            })
            .await
            .map_err(cap)?;
        Ok(())
    }

    async fn keypress(&self, keys: &[String]) -> Result<(), SessionError> {
        let dom_keys: Vec<String> = keys.iter().map(|k| dom_key(k)).collect();
        let encoded = serde_json::to_string(&dom_keys).map_err(cap)?;
        // keydown in order, keyup in reverse, so combos read as held modifiers
        let js = format!(
            r#"(() => {{
                const el = document.activeElement || document.body;
                const keys = {encoded};
                for (const key of keys)
                    el.dispatchEvent(new KeyboardEvent("keydown", {{key, bubbles: true}}));
                for (const key of keys.slice().reverse())
                    el.dispatchEvent(new KeyboardEvent("keyup", {{key, bubbles: true}}));
            }})()"#
        );
        self.eval(js).await.map_err(cap)
    }

    async fn drag(&self, path: &[Point]) -> Result<(), SessionError> {
        let Some(first) = path.first() else {
            return Ok(());
        };
        let down = DispatchMouseEventParams::builder()
            .x(first.x as f64)
            .y(first.y as f64)
            .button(MouseButton::Left);
        let pressed = down
            .clone()
            .r#type(DispatchMouseEventType::MousePressed)
            .build()
            .map_err(cap)?;
        self.page
            .move_mouse(CdpPoint {
                x: first.x as f64,
                y: first.y as f64,
            })
            .await
            .map_err(cap)?
            .execute(pressed)
            .await
            .map_err(cap)?;
        for p in &path[1..] {
            self.page
                .move_mouse(CdpPoint {
                    x: p.x as f64,
                    y: p.y as f64,
                })
                .await
                .map_err(cap)?;
        }
        let released = down
            .r#type(DispatchMouseEventType::MouseReleased)
            .build()
            .map_err(cap)?;
        self.page.execute(released).await.map_err(cap)?;
        Ok(())
    }

    async fn wait(&self) -> Result<(), SessionError> {
        sleep(Duration::from_millis(1000)).await;
        Ok(())
    }

    async fn goto(&self, url: &str) -> Result<(), SessionError> {
        self.page.goto(url).await.map_err(cap)?;
        self.page.wait_for_navigation().await.map_err(cap)?;
        let _ = self.force_same_tab().await;
        self.settle().await;
        Ok(())
    }

    async fn back(&self) -> Result<(), SessionError> {
        self.eval("history.back();".to_string())
            .await
            .map_err(cap)?;
        self.settle().await;
        Ok(())
    }
}
