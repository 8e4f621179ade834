//! 网页动作与计划
//!
//! Action 的 JSON 形态与规划提示中的词表一致：`{"type": "click", "selector": "..."}`。
//! Plan 构造后不可变，TaskExecutor 严格按顺序消费。

use std::fmt;

use serde::{Deserialize, Serialize};

/// wait 未给出时长时的默认值（毫秒）
pub const DEFAULT_WAIT_MS: u64 = 1000;

fn default_wait_ms() -> u64 {
    DEFAULT_WAIT_MS
}

/// 一条原子网页动作
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Action {
    Navigate {
        url: String,
    },
    Click {
        selector: String,
    },
    Type {
        selector: String,
        value: String,
    },
    Scroll,
    Wait {
        #[serde(rename = "timeout", alias = "durationMs", default = "default_wait_ms")]
        duration_ms: u64,
    },
    Screenshot,
    Extract,
}

/// 动作类型（不含参数），用于超时表与日志
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Navigate,
    Click,
    Type,
    Scroll,
    Wait,
    Screenshot,
    Extract,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Navigate => "navigate",
            ActionKind::Click => "click",
            ActionKind::Type => "type",
            ActionKind::Scroll => "scroll",
            ActionKind::Wait => "wait",
            ActionKind::Screenshot => "screenshot",
            ActionKind::Extract => "extract",
        }
    }
}

impl Action {
    pub fn navigate(url: impl Into<String>) -> Self {
        Action::Navigate { url: url.into() }
    }

    pub fn click(selector: impl Into<String>) -> Self {
        Action::Click {
            selector: selector.into(),
        }
    }

    pub fn type_text(selector: impl Into<String>, value: impl Into<String>) -> Self {
        Action::Type {
            selector: selector.into(),
            value: value.into(),
        }
    }

    pub fn wait(duration_ms: u64) -> Self {
        Action::Wait { duration_ms }
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Navigate { .. } => ActionKind::Navigate,
            Action::Click { .. } => ActionKind::Click,
            Action::Type { .. } => ActionKind::Type,
            Action::Scroll => ActionKind::Scroll,
            Action::Wait { .. } => ActionKind::Wait,
            Action::Screenshot => ActionKind::Screenshot,
            Action::Extract => ActionKind::Extract,
        }
    }

    /// 动作需要的参数是否齐全（空 url / selector 视为无效）
    pub fn is_well_formed(&self) -> bool {
        match self {
            Action::Navigate { url } => !url.trim().is_empty(),
            Action::Click { selector } | Action::Type { selector, .. } => {
                !selector.trim().is_empty()
            }
            _ => true,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Navigate { url } => write!(f, "navigate {}", url),
            Action::Click { selector } => write!(f, "click {}", selector),
            Action::Type { selector, value } => write!(f, "type \"{}\" into {}", value, selector),
            Action::Scroll => f.write_str("scroll"),
            Action::Wait { duration_ms } => write!(f, "wait {}ms", duration_ms),
            Action::Screenshot => f.write_str("screenshot"),
            Action::Extract => f.write_str("extract"),
        }
    }
}

/// 有序、不可变的动作序列
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Plan(Vec<Action>);

impl Plan {
    pub fn new(actions: Vec<Action>) -> Self {
        Self(actions)
    }

    /// 规划失败时的最小安全计划：打开目标、等待、截图
    pub fn fallback(target: &str) -> Self {
        Self(vec![
            Action::navigate(target),
            Action::wait(2000),
            Action::Screenshot,
        ])
    }

    pub fn actions(&self) -> &[Action] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Action> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> IntoIterator for &'a Plan {
    type Item = &'a Action;
    type IntoIter = std::slice::Iter<'a, Action>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
