//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `AGIS__*` 覆盖（双下划线表示嵌套，如 `AGIS__LLM__PROVIDER=openai`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::browser::ActionKind;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub canvas: CanvasSection,
    pub pipeline: PipelineSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    /// REPL 横幅中显示的名称
    pub name: Option<String>,
    /// 对话历史保留轮数
    pub max_context_turns: usize,
    /// 附件拼入 prompt 时的最大字符数
    pub max_attachment_chars: usize,
}

impl AppSection {
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or("AGI-S")
    }
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            max_context_turns: 20,
            max_attachment_chars: 20_000,
        }
    }
}

/// [llm] 段：后端选择、模型、温度与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：deepseek / openai；优先级由 API Key 与 provider 共同决定
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    pub image_model: Option<String>,
    /// 对话模式的采样温度
    pub temperature: f32,
    /// 单次请求超时（秒）
    pub request_timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            image_model: None,
            temperature: 0.7,
            request_timeout_secs: 60,
        }
    }
}

/// [canvas] 段：浏览器任务的默认目标、观察截断长度与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CanvasSection {
    pub default_target: String,
    /// 规划时的采样温度
    pub planner_temperature: f32,
    /// 最终观察中页面文本的最大字符数
    pub excerpt_chars: usize,
    /// 整个任务的总超时（秒）；到时不再执行后续动作，直接进入收尾观察
    pub overall_timeout_secs: u64,
    pub timeouts: ActionTimeoutsSection,
}

impl Default for CanvasSection {
    fn default() -> Self {
        Self {
            default_target: "https://google.com".to_string(),
            planner_temperature: 0.3,
            excerpt_chars: 500,
            overall_timeout_secs: 60,
            timeouts: ActionTimeoutsSection::default(),
        }
    }
}

/// [canvas.timeouts] 段：单个动作的超时（秒）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ActionTimeoutsSection {
    pub navigate: u64,
    pub click: u64,
    #[serde(rename = "type")]
    pub type_text: u64,
    pub scroll: u64,
    /// wait 动作的超时 = 等待时长 + wait_grace
    pub wait_grace: u64,
    pub screenshot: u64,
    pub extract: u64,
}

impl Default for ActionTimeoutsSection {
    fn default() -> Self {
        Self {
            navigate: 30,
            click: 5,
            type_text: 5,
            scroll: 5,
            wait_grace: 5,
            screenshot: 10,
            extract: 10,
        }
    }
}

impl ActionTimeoutsSection {
    /// 按动作类型取超时；wait 需要加上等待时长本身
    pub fn for_kind(&self, kind: ActionKind, wait_ms: u64) -> Duration {
        let secs = match kind {
            ActionKind::Navigate => self.navigate,
            ActionKind::Click => self.click,
            ActionKind::Type => self.type_text,
            ActionKind::Scroll => self.scroll,
            ActionKind::Wait => {
                return Duration::from_millis(wait_ms) + Duration::from_secs(self.wait_grace)
            }
            ActionKind::Screenshot => self.screenshot,
            ActionKind::Extract => self.extract,
        };
        Duration::from_secs(secs)
    }
}

/// [pipeline] 段：流水线各阶段的采样温度与图像模型
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    pub temperature: f32,
    pub image_model: Option<String>,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            temperature: 0.8,
            image_model: None,
        }
    }
}

/// 从 config 目录加载配置，环境变量 AGIS__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 AGIS__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("AGIS")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
