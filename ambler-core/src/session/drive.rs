use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType, DispatchMouseEventParams, DispatchMouseEventType,
    MouseButton,
};
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::page::Page;
use serde_json::Value;
use tokio::time::{sleep, timeout};
use tracing::debug;

use super::error::{SessionError, SessionResult};
use super::launcher::BrowserHandle;

/// The capability boundary to the page-automation driver. Element discovery,
/// frame walks, history and media state all compose from `eval` payload
/// scripts; input lands as trusted events.
#[async_trait]
pub trait PageDrive: Send {
    async fn goto(&mut self, url: &str) -> SessionResult<()>;
    /// Current address, `None` when the driver cannot report one.
    async fn current_url(&mut self) -> SessionResult<Option<String>>;
    async fn eval(&mut self, script: &str) -> SessionResult<Value>;
    async fn move_mouse(&mut self, x: f64, y: f64) -> SessionResult<()>;
    async fn click_at(&mut self, x: f64, y: f64, press_ms: u64) -> SessionResult<()>;
    async fn press_key(&mut self, key: &str) -> SessionResult<()>;
    async fn type_char(&mut self, ch: char) -> SessionResult<()>;
    async fn scroll_by(&mut self, delta_x: f64, delta_y: f64) -> SessionResult<()>;
    /// Releases the underlying automation handle.
    async fn close(&mut self);
}

/// Chromium implementation over a CDP page.
pub struct CdpDrive {
    page: Page,
    handle: Option<BrowserHandle>,
    nav_timeout: Duration,
}

impl CdpDrive {
    pub fn new(page: Page, handle: BrowserHandle, nav_timeout: Duration) -> Self {
        Self {
            page,
            handle: Some(handle),
            nav_timeout,
        }
    }

    pub fn proxy_address(&self) -> Option<String> {
        self.handle.as_ref().and_then(BrowserHandle::proxy_address)
    }

    fn key_event(key: &str) -> (String, String, Option<String>, Option<i64>, i64) {
        // (key, code, char text, windows virtual key code, modifier bits)
        match key {
            "Enter" => ("Enter".into(), "Enter".into(), Some("\r".into()), Some(13), 0),
            "Backspace" => ("Backspace".into(), "Backspace".into(), None, Some(8), 0),
            "Escape" => ("Escape".into(), "Escape".into(), None, Some(27), 0),
            "Control+Equal" => ("=".into(), "Equal".into(), None, Some(187), 2),
            "Control+Minus" => ("-".into(), "Minus".into(), None, Some(189), 2),
            "Control+Digit0" => ("0".into(), "Digit0".into(), None, Some(48), 2),
            other => (other.into(), other.into(), None, None, 0),
        }
    }
}

#[async_trait]
impl PageDrive for CdpDrive {
    async fn goto(&mut self, url: &str) -> SessionResult<()> {
        let params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(SessionError::Configuration)?;
        self.page
            .goto(params)
            .await
            .map_err(|err| SessionError::Navigation(err.to_string()))?;
        timeout(self.nav_timeout, self.page.wait_for_navigation())
            .await
            .map_err(|_| SessionError::Navigation(format!("load of {url} timed out")))?
            .map_err(|err| SessionError::Navigation(err.to_string()))?;
        Ok(())
    }

    async fn current_url(&mut self) -> SessionResult<Option<String>> {
        Ok(self.page.url().await?)
    }

    async fn eval(&mut self, script: &str) -> SessionResult<Value> {
        let result = self.page.evaluate(script).await?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn move_mouse(&mut self, x: f64, y: f64) -> SessionResult<()> {
        let params = DispatchMouseEventParams::builder()
            .r#type(DispatchMouseEventType::MouseMoved)
            .x(x.floor().max(0.0))
            .y(y.floor().max(0.0))
            .build()
            .map_err(SessionError::Configuration)?;
        self.page.execute(params).await?;
        Ok(())
    }

    async fn click_at(&mut self, x: f64, y: f64, press_ms: u64) -> SessionResult<()> {
        self.move_mouse(x, y).await?;
        let x = x.floor().max(0.0);
        let y = y.floor().max(0.0);
        let down = DispatchMouseEventParams::builder()
            .r#type(DispatchMouseEventType::MousePressed)
            .x(x)
            .y(y)
            .button(MouseButton::Left)
            .click_count(1)
            .build()
            .map_err(SessionError::Configuration)?;
        self.page.execute(down).await?;
        sleep(Duration::from_millis(press_ms)).await;
        let up = DispatchMouseEventParams::builder()
            .r#type(DispatchMouseEventType::MouseReleased)
            .x(x)
            .y(y)
            .button(MouseButton::Left)
            .click_count(1)
            .build()
            .map_err(SessionError::Configuration)?;
        self.page.execute(up).await?;
        Ok(())
    }

    async fn press_key(&mut self, key: &str) -> SessionResult<()> {
        let (key_name, code, text, virtual_key, modifiers) = Self::key_event(key);
        let mut down = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::KeyDown)
            .key(key_name.clone())
            .code(code.clone());
        if let Some(vk) = virtual_key {
            down = down.windows_virtual_key_code(vk);
        }
        if modifiers != 0 {
            down = down.modifiers(modifiers);
        }
        self.page
            .execute(down.build().map_err(SessionError::Configuration)?)
            .await?;
        if let Some(text) = text {
            let char_event = DispatchKeyEventParams::builder()
                .r#type(DispatchKeyEventType::Char)
                .key(key_name.clone())
                .code(code.clone())
                .text(text)
                .build()
                .map_err(SessionError::Configuration)?;
            self.page.execute(char_event).await?;
        }
        let mut up = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::KeyUp)
            .key(key_name)
            .code(code);
        if let Some(vk) = virtual_key {
            up = up.windows_virtual_key_code(vk);
        }
        if modifiers != 0 {
            up = up.modifiers(modifiers);
        }
        self.page
            .execute(up.build().map_err(SessionError::Configuration)?)
            .await?;
        Ok(())
    }

    async fn type_char(&mut self, ch: char) -> SessionResult<()> {
        let params = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::Char)
            .text(ch.to_string())
            .build()
            .map_err(SessionError::Configuration)?;
        self.page.execute(params).await?;
        Ok(())
    }

    async fn scroll_by(&mut self, delta_x: f64, delta_y: f64) -> SessionResult<()> {
        let script =
            format!("window.scrollBy({{ left: {delta_x}, top: {delta_y}, behavior: 'smooth' }});");
        self.page.evaluate(script.as_str()).await?;
        Ok(())
    }

    async fn close(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.shutdown().await {
                debug!(error = %err, "browser shutdown reported an error");
            }
        }
    }
}

/// True for addresses the exploration loop can work on.
pub fn is_navigable(url: Option<&str>) -> bool {
    matches!(url, Some(value) if value.starts_with("http://") || value.starts_with("https://"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn navigable_requires_http_scheme() {
        assert!(is_navigable(Some("https://example.com/a")));
        assert!(is_navigable(Some("http://example.com")));
        assert!(!is_navigable(Some("about:blank")));
        assert!(!is_navigable(Some("chrome-error://chromewebdata/")));
        assert!(!is_navigable(None));
    }
}
