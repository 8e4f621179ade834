//! 动作执行层：网页动作词表、计划、浏览器会话抽象与 Chrome 实现

pub mod action;
pub mod session;

#[cfg(feature = "browser")]
pub mod chrome;

pub use action::{Action, ActionKind, Plan, DEFAULT_WAIT_MS};
pub use session::{truncate_chars, BrowserBackend, BrowserSession, PageSummary, UnavailableBackend};

#[cfg(feature = "browser")]
pub use chrome::ChromeBackend;
