//! 流水线阶段定义与记录（Record）操作
//!
//! Record 是一个 JSON 对象；字段路径用点号表示嵌套（如 `images.main`）。

use std::fmt;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// 阶段之间传递的累积记录
pub type Record = Map<String, Value>;

/// 由当前记录构造 prompt
pub type PromptFn = Arc<dyn Fn(&Record) -> String + Send + Sync>;

/// 结构化输出校验：能否反序列化为目标类型
pub type Validator = fn(&Value) -> Result<(), String>;

/// 阶段输出类型
#[derive(Clone)]
pub enum StageKind {
    /// 结构化 JSON；schema 由 schemars 生成，at 为 Some 时整个对象放到该路径下
    Structured {
        schema: Value,
        validate: Validator,
        at: Option<String>,
    },
    /// 图像 URL，写入 path
    Image { path: String },
}

/// 一个命名的生成步骤
#[derive(Clone)]
pub struct PipelineStage {
    name: String,
    requires: Vec<String>,
    produces: Vec<String>,
    kind: StageKind,
    prompt: PromptFn,
}

impl fmt::Debug for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineStage")
            .field("name", &self.name)
            .field("requires", &self.requires)
            .field("produces", &self.produces)
            .finish()
    }
}

fn validate_as<T: DeserializeOwned>(value: &Value) -> Result<(), String> {
    serde_json::from_value::<T>(value.clone())
        .map(|_| ())
        .map_err(|e| e.to_string())
}

impl PipelineStage {
    /// 结构化阶段：输出必须能解析为 T
    pub fn structured<T, F>(name: impl Into<String>, prompt: F) -> Self
    where
        T: JsonSchema + DeserializeOwned,
        F: Fn(&Record) -> String + Send + Sync + 'static,
    {
        let schema = serde_json::to_value(schemars::schema_for!(T)).unwrap_or_default();
        Self {
            name: name.into(),
            requires: Vec::new(),
            produces: Vec::new(),
            kind: StageKind::Structured {
                schema,
                validate: validate_as::<T>,
                at: None,
            },
            prompt: Arc::new(prompt),
        }
    }

    /// 图像阶段：产出 path 一个字段
    pub fn image<F>(name: impl Into<String>, path: impl Into<String>, prompt: F) -> Self
    where
        F: Fn(&Record) -> String + Send + Sync + 'static,
    {
        let path = path.into();
        Self {
            name: name.into(),
            requires: Vec::new(),
            produces: vec![path.clone()],
            kind: StageKind::Image { path },
            prompt: Arc::new(prompt),
        }
    }

    /// 把结构化输出整体放在 path 下；同时声明产出该 path
    pub fn nested_at(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        if let StageKind::Structured { at, .. } = &mut self.kind {
            *at = Some(path.clone());
            self.produces = vec![path];
        }
        self
    }

    pub fn requires<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requires = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn produces<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.produces = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn required_fields(&self) -> &[String] {
        &self.requires
    }

    pub fn produced_fields(&self) -> &[String] {
        &self.produces
    }

    pub fn kind(&self) -> &StageKind {
        &self.kind
    }

    pub fn build_prompt(&self, record: &Record) -> String {
        (self.prompt)(record)
    }
}

/// 按点号路径取值
pub fn lookup<'a>(record: &'a Record, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = record.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// 字段存在且非空（null、空串、空数组、空对象都视为缺失）
pub fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        _ => true,
    }
}

/// 下游阶段的输入：必须非空
pub fn has_field(record: &Record, path: &str) -> bool {
    lookup(record, path).is_some_and(is_present)
}

/// 阶段产出：键存在且不为 null 即可，形状交给 schema 校验（空列表是合法产出）
pub fn has_value(record: &Record, path: &str) -> bool {
    lookup(record, path).is_some_and(|v| !v.is_null())
}

/// 把 value 包装成只含 path 的记录，例如 `images.main` → `{"images": {"main": value}}`
pub fn nest(path: &str, value: Value) -> Record {
    let mut parts: Vec<&str> = path.split('.').collect();
    let last = parts.pop().unwrap_or(path);
    let mut record = Record::new();
    record.insert(last.to_string(), value);
    for part in parts.into_iter().rev() {
        let mut outer = Record::new();
        outer.insert(part.to_string(), Value::Object(record));
        record = outer;
    }
    record
}

/// 深度合并：对象递归合并，其它类型后者覆盖前者
pub fn deep_merge(target: &mut Record, source: Record) {
    for (key, value) in source {
        match (target.get_mut(&key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                deep_merge(existing, incoming);
            }
            (_, value) => {
                target.insert(key, value);
            }
        }
    }
}

/// prompt 中引用字段的便捷方法：字符串原样，其它类型输出 JSON
pub fn field_text(record: &Record, path: &str) -> String {
    match lookup(record, path) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}
