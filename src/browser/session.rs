//! 浏览器会话抽象
//!
//! BrowserBackend::open 产生一个独占的 BrowserSession（一个页面）。会话是有状态的：
//! 同一时刻只允许一个动作在执行，因此 act 等方法都取 `&mut self`。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::browser::Action;
use crate::core::{ActionError, SessionError};

/// 页面摘要：标题、URL、可见文本前 N 个字符
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSummary {
    pub title: String,
    pub url: String,
    pub text_excerpt: String,
}

/// 一个活动的浏览器页面
#[async_trait]
pub trait BrowserSession: Send {
    /// 执行一个动作，成功时返回简短说明
    async fn act(&mut self, action: &Action) -> Result<String, ActionError>;

    /// 当前页面截图（base64 编码的 PNG）
    async fn screenshot(&mut self) -> Result<String, ActionError>;

    /// 提取页面摘要；text_excerpt 不超过 max_chars 个字符
    async fn extract_summary(&mut self, max_chars: usize) -> Result<PageSummary, ActionError>;

    /// 关闭页面并释放浏览器资源
    async fn close(&mut self) -> Result<(), SessionError>;
}

/// 会话工厂
#[async_trait]
pub trait BrowserBackend: Send + Sync {
    async fn open(&self) -> Result<Box<dyn BrowserSession>, SessionError>;
}

/// 未启用浏览器时的后端：open 总是失败
#[derive(Debug, Default)]
pub struct UnavailableBackend;

#[async_trait]
impl BrowserBackend for UnavailableBackend {
    async fn open(&self) -> Result<Box<dyn BrowserSession>, SessionError> {
        Err(SessionError::Open(
            "browser automation is not available (build with feature \"browser\")".to_string(),
        ))
    }
}

/// 按字符截断（不会切断多字节字符）
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
