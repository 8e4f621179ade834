//! AGI-S 编排核心
//!
//! 模块划分：
//! - **browser**: 网页动作词表、计划、浏览器会话抽象（headless Chrome 实现需 feature "browser"）
//! - **canvas**: Planner（目标 → 计划）与 TaskExecutor（计划 → 执行结果）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 请求与模式、错误类型、模式分发器
//! - **llm**: 生成能力抽象与实现（OpenAI 兼容 / DeepSeek / Mock / 脚本化）
//! - **memory**: 对话消息、短期对话记忆与会话存储
//! - **observability**: tracing 日志初始化
//! - **pipeline**: 多阶段内容流水线（cosmos / catalyst / synthesis / crucible）

pub mod browser;
pub mod canvas;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod pipeline;

pub use crate::core::{DispatchError, DispatchOutput, Mode, Orchestrator, Request};
