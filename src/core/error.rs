//! 错误类型
//!
//! 每个关注点一个枚举：生成能力（ModelError）、单个网页动作（ActionError）、浏览器会话（SessionError）、
//! 多阶段流水线（PipelineError），以及编排器对外暴露的 DispatchError（附带当前模式）。
//! ActionError 只在 TaskExecutor 循环内被记录，不会向上抛出。

use thiserror::Error;

use crate::core::request::Mode;

/// 生成能力（LLM / 图像模型）调用失败
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("Model request failed: {0}")]
    Request(String),

    #[error("Model request timed out after {0}s")]
    Timeout(u64),

    #[error("Model quota exhausted: {0}")]
    Quota(String),

    #[error("Malformed model output: {0}")]
    Malformed(String),

    #[error("Unsupported by this backend: {0}")]
    Unsupported(String),
}

impl ModelError {
    /// 按 HTTP 状态 / 错误文本粗分类：429 与 quota 字样归为 Quota，其余为 Request
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if lower.contains("429") || lower.contains("quota") || lower.contains("rate limit") {
            ModelError::Quota(message)
        } else {
            ModelError::Request(message)
        }
    }
}

/// 单个网页动作失败；除 SessionLost 外都在循环内就地恢复
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    #[error("{0}")]
    Failed(String),

    #[error("timed out after {0}ms")]
    Timeout(u64),

    /// 页面 / 浏览器已不可用，后续动作无意义
    #[error("session lost: {0}")]
    SessionLost(String),
}

/// 打开或关闭浏览器会话失败（对本次 TaskExecutor 运行是致命的）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Failed to open browser session: {0}")]
    Open(String),

    #[error("Failed to close browser session: {0}")]
    Close(String),
}

/// 流水线失败：任一必需阶段失败即整体失败，不返回部分结果
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("Invalid pipeline configuration: {0}")]
    InvalidConfiguration(String),

    #[error("seed stage failed: {stage}: {reason}")]
    SeedFailed { stage: String, reason: String },

    #[error("stage '{stage}' is missing upstream field '{field}'")]
    MissingInput { stage: String, field: String },

    #[error("stage '{stage}' failed: {reason}")]
    StageFailed { stage: String, reason: String },

    #[error("fan-out stage '{stage}' failed: {reason}")]
    FanOutFailed { stage: String, reason: String },
}

impl PipelineError {
    /// 失败阶段名（配置错误没有阶段）
    pub fn stage(&self) -> Option<&str> {
        match self {
            PipelineError::InvalidConfiguration(_) => None,
            PipelineError::SeedFailed { stage, .. }
            | PipelineError::MissingInput { stage, .. }
            | PipelineError::StageFailed { stage, .. }
            | PipelineError::FanOutFailed { stage, .. } => Some(stage),
        }
    }
}

/// 编排器对外错误：下游错误原样保留，并标注出错时的模式
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Unsupported mode: {0}")]
    UnsupportedMode(String),

    #[error("[{mode}] generation failed: {source}")]
    Generation {
        mode: Mode,
        #[source]
        source: ModelError,
    },

    #[error("[{mode}] pipeline failed: {source}")]
    Pipeline {
        mode: Mode,
        #[source]
        source: PipelineError,
    },

    /// 浏览器任务失败：一条可读信息 + 已产生的步骤日志
    #[error("[{mode}] execution failed: {message}")]
    Execution {
        mode: Mode,
        message: String,
        steps: Vec<String>,
    },
}

impl DispatchError {
    /// 出错时的模式（UnsupportedMode 无法解析出模式）
    pub fn mode(&self) -> Option<Mode> {
        match self {
            DispatchError::UnsupportedMode(_) => None,
            DispatchError::Generation { mode, .. }
            | DispatchError::Pipeline { mode, .. }
            | DispatchError::Execution { mode, .. } => Some(*mode),
        }
    }
}
