//! Canvas：规划 + 浏览器执行
//!
//! Planner 把目标变成 Plan，TaskExecutor 在一个会话里执行它并产出 TaskResult。

pub mod executor;
pub mod planner;

pub use executor::TaskExecutor;
pub use planner::{parse_plan, PlanOutcome, Planner};

use serde::Serialize;

use crate::browser::PageSummary;

/// 一次浏览器任务的最终结果；会话关闭后生成，之后不再变化
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResult {
    success: bool,
    steps: Vec<String>,
    screenshot: Option<String>,
    extracted_data: Option<PageSummary>,
    error: Option<String>,
}

impl TaskResult {
    /// 只有会话打开/关闭失败（或会话中途丢失）时为 false
    pub fn success(&self) -> bool {
        self.success
    }

    /// 按时间顺序的人类可读步骤日志，至少一条
    pub fn steps(&self) -> &[String] {
        &self.steps
    }

    /// base64 PNG
    pub fn screenshot(&self) -> Option<&str> {
        self.screenshot.as_deref()
    }

    pub fn extracted_data(&self) -> Option<&PageSummary> {
        self.extracted_data.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

/// 执行期间的累积器，只在 executor 内部可变
#[derive(Debug, Default)]
pub(crate) struct TaskLog {
    steps: Vec<String>,
    screenshot: Option<String>,
    extracted_data: Option<PageSummary>,
}

impl TaskLog {
    pub(crate) fn push(&mut self, step: impl Into<String>) {
        let step = step.into();
        tracing::debug!(step = %step, "task step");
        self.steps.push(step);
    }

    pub(crate) fn observe(&mut self, screenshot: Option<String>, summary: Option<PageSummary>) {
        self.screenshot = screenshot;
        self.extracted_data = summary;
    }

    pub(crate) fn finish_ok(self) -> TaskResult {
        self.finish(true, None)
    }

    pub(crate) fn finish_failed(self, error: String) -> TaskResult {
        self.finish(false, Some(error))
    }

    fn finish(self, success: bool, error: Option<String>) -> TaskResult {
        TaskResult {
            success,
            steps: self.steps,
            screenshot: self.screenshot,
            extracted_data: self.extracted_data,
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_result_serializes_camel_case() {
        let mut log = TaskLog::default();
        log.push("session opened");
        log.observe(
            Some("AAAA".to_string()),
            Some(PageSummary {
                title: "T".to_string(),
                url: "https://t.test".to_string(),
                text_excerpt: "hi".to_string(),
            }),
        );
        let json = serde_json::to_value(log.finish_ok()).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["extractedData"]["textExcerpt"], "hi");
        assert!(json["error"].is_null());
    }

    #[test]
    fn test_failed_result_keeps_steps() {
        let mut log = TaskLog::default();
        log.push("❌ failed to open");
        let result = log.finish_failed("boom".to_string());
        assert!(!result.success());
        assert_eq!(result.steps().len(), 1);
        assert_eq!(result.error(), Some("boom"));
    }
}
