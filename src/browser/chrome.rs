//! Headless Chrome 后端
//!
//! 需启用 feature "browser" 且系统已安装 Chrome/Chromium。
//! headless_chrome 的调用都是阻塞的，统一放进 spawn_blocking；wait 动作用 tokio 计时，不占用阻塞线程。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::{Browser, LaunchOptions, Tab};

use crate::browser::{truncate_chars, Action, BrowserBackend, BrowserSession, PageSummary};
use crate::core::{ActionError, SessionError};

/// 选择器等待上限；动作整体超时由 TaskExecutor 控制
const ELEMENT_WAIT: Duration = Duration::from_secs(5);

/// Chrome 后端：每次 open 启动一个独立浏览器进程并打开一个页面
#[derive(Debug, Clone)]
pub struct ChromeBackend {
    headless: bool,
    window_size: (u32, u32),
    idle_timeout: Duration,
}

impl Default for ChromeBackend {
    fn default() -> Self {
        Self {
            headless: true,
            window_size: (1280, 720),
            idle_timeout: Duration::from_secs(120),
        }
    }
}

impl ChromeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }
}

#[async_trait]
impl BrowserBackend for ChromeBackend {
    async fn open(&self) -> Result<Box<dyn BrowserSession>, SessionError> {
        let backend = self.clone();
        let (browser, tab) = tokio::task::spawn_blocking(move || {
            let options = LaunchOptions::default_builder()
                .headless(backend.headless)
                .window_size(Some(backend.window_size))
                .idle_browser_timeout(backend.idle_timeout)
                .args(vec![
                    std::ffi::OsStr::new("--no-sandbox"),
                    std::ffi::OsStr::new("--disable-setuid-sandbox"),
                ])
                .build()
                .map_err(|e| format!("Invalid launch options: {}", e))?;
            let browser = Browser::new(options)
                .map_err(|e| format!("Chrome launch failed: {}. Install Chrome/Chromium.", e))?;
            let tab = browser
                .new_tab()
                .map_err(|e| format!("Browser tab failed: {}", e))?;
            Ok::<_, String>((browser, tab))
        })
        .await
        .map_err(|e| SessionError::Open(format!("Task join: {}", e)))?
        .map_err(SessionError::Open)?;

        tracing::info!("chrome session opened");
        Ok(Box::new(ChromeSession {
            browser: Some(browser),
            tab,
        }))
    }
}

/// 一个 Chrome 页面
pub struct ChromeSession {
    browser: Option<Browser>,
    tab: Arc<Tab>,
}

impl ChromeSession {
    /// 在阻塞线程上对 tab 执行操作
    async fn on_tab<T, F>(&self, f: F) -> Result<T, ActionError>
    where
        T: Send + 'static,
        F: FnOnce(&Tab) -> Result<T, String> + Send + 'static,
    {
        if self.browser.is_none() {
            return Err(ActionError::SessionLost("session already closed".to_string()));
        }
        let tab = Arc::clone(&self.tab);
        tokio::task::spawn_blocking(move || f(&tab))
            .await
            .map_err(|e| ActionError::SessionLost(format!("Task join: {}", e)))?
            .map_err(ActionError::Failed)
    }
}

#[async_trait]
impl BrowserSession for ChromeSession {
    async fn act(&mut self, action: &Action) -> Result<String, ActionError> {
        match action.clone() {
            Action::Navigate { url } => {
                self.on_tab(move |tab| {
                    tab.navigate_to(&url)
                        .map_err(|e| format!("Navigate failed: {}", e))?;
                    tab.wait_until_navigated()
                        .map_err(|e| format!("Page load failed: {}", e))?;
                    Ok(format!("loaded {}", tab.get_url()))
                })
                .await
            }
            Action::Click { selector } => {
                self.on_tab(move |tab| {
                    let element = tab
                        .wait_for_element_with_custom_timeout(&selector, ELEMENT_WAIT)
                        .map_err(|e| format!("Element {} not found: {}", selector, e))?;
                    element
                        .click()
                        .map_err(|e| format!("Click failed: {}", e))?;
                    Ok(format!("clicked {}", selector))
                })
                .await
            }
            Action::Type { selector, value } => {
                self.on_tab(move |tab| {
                    let element = tab
                        .wait_for_element_with_custom_timeout(&selector, ELEMENT_WAIT)
                        .map_err(|e| format!("Element {} not found: {}", selector, e))?;
                    element
                        .type_into(&value)
                        .map_err(|e| format!("Type failed: {}", e))?;
                    Ok(format!("typed into {}", selector))
                })
                .await
            }
            Action::Scroll => {
                self.on_tab(|tab| {
                    tab.evaluate("window.scrollBy(0, window.innerHeight)", false)
                        .map_err(|e| format!("Scroll failed: {}", e))?;
                    Ok("scrolled one viewport".to_string())
                })
                .await
            }
            Action::Wait { duration_ms } => {
                tokio::time::sleep(Duration::from_millis(duration_ms)).await;
                Ok(format!("waited {}ms", duration_ms))
            }
            Action::Screenshot => {
                let data = self.screenshot().await?;
                Ok(format!("screenshot taken ({} bytes base64)", data.len()))
            }
            Action::Extract => {
                let summary = self.extract_summary(200).await?;
                Ok(format!("extracted \"{}\"", summary.title))
            }
        }
    }

    async fn screenshot(&mut self) -> Result<String, ActionError> {
        let png = self
            .on_tab(|tab| {
                tab.capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true)
                    .map_err(|e| format!("Screenshot failed: {}", e))
            })
            .await?;
        Ok(BASE64.encode(png))
    }

    async fn extract_summary(&mut self, max_chars: usize) -> Result<PageSummary, ActionError> {
        self.on_tab(move |tab| {
            let title = tab
                .get_title()
                .map_err(|e| format!("Get title failed: {}", e))?;
            let url = tab.get_url();
            let content = tab
                .get_content()
                .map_err(|e| format!("Get content failed: {}", e))?;
            let text = html2text::from_read(content.as_bytes(), 120).unwrap_or(content);
            Ok(PageSummary {
                title,
                url,
                text_excerpt: truncate_chars(text.trim(), max_chars),
            })
        })
        .await
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        let Some(browser) = self.browser.take() else {
            return Ok(());
        };
        let tab = Arc::clone(&self.tab);
        let closed = tokio::task::spawn_blocking(move || {
            let result = tab
                .close(true)
                .map(|_| ())
                .map_err(|e| format!("Tab close failed: {}", e));
            drop(browser);
            result
        })
        .await
        .map_err(|e| SessionError::Close(format!("Task join: {}", e)))?;
        tracing::info!("chrome session closed");
        closed.map_err(SessionError::Close)
    }
}
