//! 集成测试共用的假浏览器后端：记录 open / close 次数与执行过的动作
//!
//! 按 selector 触发不同行为：`#missing` 失败，`#gone` 会话丢失，`#panic` 直接 panic。

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agis::browser::{Action, BrowserBackend, BrowserSession, PageSummary};
use agis::core::{ActionError, SessionError};
use async_trait::async_trait;

#[derive(Default)]
pub struct Counters {
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
    pub acted: Mutex<Vec<Action>>,
}

impl Counters {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn acted(&self) -> Vec<Action> {
        self.acted.lock().unwrap().clone()
    }
}

#[derive(Default)]
pub struct FakeBackend {
    pub counters: Arc<Counters>,
    pub fail_open: bool,
    pub fail_close: bool,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_open() -> Self {
        Self {
            fail_open: true,
            ..Self::default()
        }
    }

    pub fn failing_close() -> Self {
        Self {
            fail_close: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl BrowserBackend for FakeBackend {
    async fn open(&self) -> Result<Box<dyn BrowserSession>, SessionError> {
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        if self.fail_open {
            return Err(SessionError::Open("chrome not installed".to_string()));
        }
        Ok(Box::new(FakeSession {
            counters: Arc::clone(&self.counters),
            fail_close: self.fail_close,
            url: "about:blank".to_string(),
        }))
    }
}

struct FakeSession {
    counters: Arc<Counters>,
    fail_close: bool,
    url: String,
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn act(&mut self, action: &Action) -> Result<String, ActionError> {
        self.counters.acted.lock().unwrap().push(action.clone());
        match action {
            Action::Navigate { url } => {
                self.url = url.clone();
                Ok(format!("loaded {}", url))
            }
            Action::Click { selector } if selector == "#missing" => {
                Err(ActionError::Failed("selector not found".to_string()))
            }
            Action::Click { selector } if selector == "#gone" => {
                Err(ActionError::SessionLost("browser crashed".to_string()))
            }
            Action::Click { selector } if selector == "#panic" => panic!("unexpected driver state"),
            Action::Wait { duration_ms } => {
                tokio::time::sleep(Duration::from_millis(*duration_ms)).await;
                Ok(format!("waited {}ms", duration_ms))
            }
            _ => Ok("ok".to_string()),
        }
    }

    async fn screenshot(&mut self) -> Result<String, ActionError> {
        Ok("iVBORw0KGgoAAAANSUhEUg==".to_string())
    }

    async fn extract_summary(&mut self, max_chars: usize) -> Result<PageSummary, ActionError> {
        Ok(PageSummary {
            title: "Fake Page".to_string(),
            url: self.url.clone(),
            text_excerpt: "lorem ipsum dolor sit amet".chars().take(max_chars).collect(),
        })
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
        if self.fail_close {
            Err(SessionError::Close("browser process hung".to_string()))
        } else {
            Ok(())
        }
    }
}
