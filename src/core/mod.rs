//! 核心编排层：请求与模式、错误类型、模式分发器

pub mod error;
pub mod orchestrator;
pub mod request;

pub use error::{ActionError, DispatchError, ModelError, PipelineError, SessionError};
pub use orchestrator::{
    create_llm_from_config, ChatAnswer, ComponentOutput, DispatchOutput, Orchestrator,
};
pub use request::{Attachment, AttachmentKind, Mode, Request, RequestOptions};
