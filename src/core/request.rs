//! 请求与模式
//!
//! Mode 是封闭枚举：新增模式 = 新增变体，编排器里只有一处穷尽 match。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::DispatchError;
use crate::memory::Message;

/// 选择处理请求的流水线
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    /// 通用问答（"AI Knowledge"）
    #[serde(rename = "AI Knowledge")]
    Knowledge,
    Coder,
    /// 生成单文件组件代码
    CodeX,
    /// 只规划网页动作，不执行
    Blueprint,
    /// 规划并在浏览器中执行
    Canvas,
    /// 世界观生成
    Cosmos,
    /// 学习路径 / 课程设计
    Catalyst,
    /// 数据集分析报告
    Synthesis,
    /// 多角色红队评审
    Crucible,
}

impl Mode {
    pub const ALL: [Mode; 9] = [
        Mode::Knowledge,
        Mode::Coder,
        Mode::CodeX,
        Mode::Blueprint,
        Mode::Canvas,
        Mode::Cosmos,
        Mode::Catalyst,
        Mode::Synthesis,
        Mode::Crucible,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Knowledge => "AI Knowledge",
            Mode::Coder => "Coder",
            Mode::CodeX => "CodeX",
            Mode::Blueprint => "Blueprint",
            Mode::Canvas => "Canvas",
            Mode::Cosmos => "Cosmos",
            Mode::Catalyst => "Catalyst",
            Mode::Synthesis => "Synthesis",
            Mode::Crucible => "Crucible",
        }
    }

    /// 是否走多阶段流水线
    pub fn is_pipeline(&self) -> bool {
        matches!(
            self,
            Mode::Cosmos | Mode::Catalyst | Mode::Synthesis | Mode::Crucible
        )
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = DispatchError;

    /// 精确匹配展示名；另接受不区分大小写的短名（如 "knowledge"、"canvas"）
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Mode::ALL
            .into_iter()
            .find(|m| m.as_str() == trimmed || format!("{:?}", m).eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| DispatchError::UnsupportedMode(trimmed.to_string()))
    }
}

/// 附件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    Pdf,
    Csv,
    Json,
}

impl AttachmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttachmentKind::Image => "image",
            AttachmentKind::Pdf => "pdf",
            AttachmentKind::Csv => "csv",
            AttachmentKind::Json => "json",
        }
    }
}

/// 可选附件：payload 为文本或 base64
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub kind: AttachmentKind,
    pub payload: String,
}

/// 模式相关的附加选项
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestOptions {
    /// Canvas / Blueprint 的目标地址；未设置时用配置中的默认地址
    #[serde(default)]
    pub target: Option<String>,
    /// Crucible 选择的评审角色 id
    #[serde(default)]
    pub personas: Vec<String>,
}

/// 一次请求；由创建它的调用独占
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub query: String,
    pub mode: Mode,
    /// 旧 → 新
    #[serde(default)]
    pub history: Vec<Message>,
    #[serde(default)]
    pub attachment: Option<Attachment>,
    #[serde(default)]
    pub options: RequestOptions,
}

impl Request {
    pub fn new(query: impl Into<String>, mode: Mode) -> Self {
        Self {
            query: query.into(),
            mode,
            history: Vec::new(),
            attachment: None,
            options: RequestOptions::default(),
        }
    }

    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }

    pub fn with_attachment(mut self, kind: AttachmentKind, payload: impl Into<String>) -> Self {
        self.attachment = Some(Attachment {
            kind,
            payload: payload.into(),
        });
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.options.target = Some(target.into());
        self
    }

    pub fn with_personas(mut self, personas: Vec<String>) -> Self {
        self.options.personas = personas;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parse_display_names() {
        for mode in Mode::ALL {
            assert_eq!(mode.as_str().parse::<Mode>().ok(), Some(mode));
        }
        assert_eq!("canvas".parse::<Mode>().ok(), Some(Mode::Canvas));
        assert_eq!("knowledge".parse::<Mode>().ok(), Some(Mode::Knowledge));
    }

    #[test]
    fn test_unknown_mode_is_unsupported() {
        let err = "Teleport".parse::<Mode>().unwrap_err();
        assert!(matches!(err, DispatchError::UnsupportedMode(ref m) if m == "Teleport"));
    }

    #[test]
    fn test_mode_serde_uses_display_name() {
        let json = serde_json::to_string(&Mode::Knowledge).unwrap();
        assert_eq!(json, "\"AI Knowledge\"");
        let back: Mode = serde_json::from_str("\"Canvas\"").unwrap();
        assert_eq!(back, Mode::Canvas);
    }
}
