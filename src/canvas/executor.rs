//! TaskExecutor：在一个浏览器会话中按顺序执行计划
//!
//! 状态：Idle → SessionOpen → Running(逐个动作) → Observing → SessionClosed。
//! - 单个动作失败只记一行日志，循环继续；只有会话打开/关闭失败（或会话丢失、意外 panic）使 success = false。
//! - 无论计划内容如何，收尾总会截图并提取页面摘要，然后关闭会话；close 在每条退出路径上恰好调用一次。
//! - 取消与总超时只停止后续动作的派发，不打断正在执行的动作。

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures_util::FutureExt;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::browser::{Action, BrowserBackend, BrowserSession, PageSummary, Plan};
use crate::canvas::{TaskLog, TaskResult};
use crate::config::CanvasSection;
use crate::core::ActionError;

/// 任务执行器：独占会话、逐个动作、失败隔离、收尾观察
pub struct TaskExecutor {
    backend: Arc<dyn BrowserBackend>,
    settings: CanvasSection,
}

impl TaskExecutor {
    pub fn new(backend: Arc<dyn BrowserBackend>, settings: CanvasSection) -> Self {
        Self { backend, settings }
    }

    pub async fn execute(&self, plan: &Plan, target: &str) -> TaskResult {
        self.execute_with_cancel(plan, target, CancellationToken::new())
            .await
    }

    /// 执行计划；cancel 触发后不再派发新动作，直接进入收尾
    pub async fn execute_with_cancel(
        &self,
        plan: &Plan,
        target: &str,
        cancel: CancellationToken,
    ) -> TaskResult {
        let run_id = uuid::Uuid::new_v4();
        let started = Instant::now();
        let mut log = TaskLog::default();

        let mut session = match self.backend.open().await {
            Ok(session) => {
                log.push("session opened");
                session
            }
            Err(e) => {
                tracing::warn!(%run_id, error = %e, "browser session open failed");
                log.push(format!("❌ {}", e));
                return log.finish_failed(e.to_string());
            }
        };
        tracing::info!(%run_id, actions = plan.len(), target = %target, "browser task started");

        let deadline = started + std::time::Duration::from_secs(self.settings.overall_timeout_secs);
        let run = AssertUnwindSafe(self.run_actions(
            session.as_mut(),
            plan,
            target,
            &cancel,
            deadline,
            &mut log,
        ))
        .catch_unwind()
        .await;

        let mut fatal = match run {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(panic) => {
                let message = format!("unexpected failure: {}", panic_message(panic.as_ref()));
                log.push(format!("❌ {}", message));
                Some(message)
            }
        };

        let mut closing = Vec::new();
        match AssertUnwindSafe(self.observe(session.as_mut()))
            .catch_unwind()
            .await
        {
            Ok((screenshot, summary, notes)) => {
                closing.extend(notes);
                log.observe(screenshot, summary);
            }
            Err(panic) => closing.push(format!(
                "⚠️ observation failed: {}",
                panic_message(panic.as_ref())
            )),
        }

        match AssertUnwindSafe(session.close()).catch_unwind().await {
            Ok(Ok(())) => closing.push("session closed".to_string()),
            Ok(Err(e)) => {
                closing.push(format!("❌ {}", e));
                fatal.get_or_insert_with(|| e.to_string());
            }
            Err(panic) => {
                let message = format!("session close panicked: {}", panic_message(panic.as_ref()));
                closing.push(format!("❌ {}", message));
                fatal.get_or_insert(message);
            }
        }
        log.push(closing.join("; "));

        tracing::info!(
            %run_id,
            duration_ms = started.elapsed().as_millis() as u64,
            success = fatal.is_none(),
            "browser task finished"
        );

        match fatal {
            None => log.finish_ok(),
            Some(error) => log.finish_failed(error),
        }
    }

    /// 主循环：隐式导航 + 计划中的动作；只有 SessionLost 会提前结束并返回 Err
    async fn run_actions(
        &self,
        session: &mut dyn BrowserSession,
        plan: &Plan,
        target: &str,
        cancel: &CancellationToken,
        deadline: Instant,
        log: &mut TaskLog,
    ) -> Result<(), ActionError> {
        let implicit = Some(target.trim())
            .filter(|t| !t.is_empty())
            .map(Action::navigate);
        let actions: Vec<&Action> = implicit.iter().chain(plan.iter()).collect();
        let total = actions.len();

        for (index, action) in actions.into_iter().enumerate() {
            let remaining = total - index;
            if cancel.is_cancelled() {
                log.push(format!("⏹️ cancelled, skipped {} remaining action(s)", remaining));
                return Ok(());
            }
            if Instant::now() >= deadline {
                log.push(format!(
                    "⏱️ overall timeout reached, skipped {} remaining action(s)",
                    remaining
                ));
                return Ok(());
            }

            match self.attempt(session, action, deadline).await {
                Ok(_) => log.push(format!("✅ {}", action)),
                Err(ActionError::SessionLost(message)) => {
                    log.push(format!("❌ {} failed: session lost: {}", action, message));
                    return Err(ActionError::SessionLost(message));
                }
                Err(e) => log.push(format!("⚠️ {} failed: {}", action, e)),
            }
        }
        Ok(())
    }

    /// 单个动作：受按类型的超时与总截止时间约束；输出 JSON 审计日志
    async fn attempt(
        &self,
        session: &mut dyn BrowserSession,
        action: &Action,
        deadline: Instant,
    ) -> Result<String, ActionError> {
        let wait_ms = match action {
            Action::Wait { duration_ms } => *duration_ms,
            _ => 0,
        };
        let budget = self
            .settings
            .timeouts
            .for_kind(action.kind(), wait_ms)
            .min(deadline.saturating_duration_since(Instant::now()));

        let start = Instant::now();
        let result = match timeout(budget, session.act(action)).await {
            Ok(result) => result,
            Err(_) => Err(ActionError::Timeout(budget.as_millis() as u64)),
        };

        let outcome = match &result {
            Ok(_) => "ok",
            Err(ActionError::Timeout(_)) => "timeout",
            Err(_) => "error",
        };
        let audit = serde_json::json!({
            "event": "action_audit",
            "action": action.kind().as_str(),
            "ok": result.is_ok(),
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
        });
        tracing::info!(audit = %audit, "action");

        result
    }

    /// 收尾观察：截图 + 页面摘要；失败只记录，不影响 success
    async fn observe(
        &self,
        session: &mut dyn BrowserSession,
    ) -> (Option<String>, Option<PageSummary>, Vec<String>) {
        let mut notes = Vec::new();
        let timeouts = &self.settings.timeouts;

        let screenshot = match timeout(
            timeouts.for_kind(crate::browser::ActionKind::Screenshot, 0),
            session.screenshot(),
        )
        .await
        {
            Ok(Ok(data)) => {
                notes.push("📸 screenshot captured".to_string());
                Some(data)
            }
            Ok(Err(e)) => {
                notes.push(format!("⚠️ screenshot failed: {}", e));
                None
            }
            Err(_) => {
                notes.push("⚠️ screenshot timed out".to_string());
                None
            }
        };

        let summary = match timeout(
            timeouts.for_kind(crate::browser::ActionKind::Extract, 0),
            session.extract_summary(self.settings.excerpt_chars),
        )
        .await
        {
            Ok(Ok(summary)) => {
                notes.push("📊 page data extracted".to_string());
                Some(summary)
            }
            Ok(Err(e)) => {
                notes.push(format!("⚠️ extract failed: {}", e));
                None
            }
            Err(_) => {
                notes.push("⚠️ extract timed out".to_string());
                None
            }
        };

        (screenshot, summary, notes)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::BrowserSession;
    use crate::core::SessionError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// 记录动作的假会话；"#missing" 点击失败，"#hang" 点击挂起
    struct FakeSession {
        acted: Arc<std::sync::Mutex<Vec<Action>>>,
        closes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl BrowserSession for FakeSession {
        async fn act(&mut self, action: &Action) -> Result<String, ActionError> {
            if let Ok(mut acted) = self.acted.lock() {
                acted.push(action.clone());
            }
            match action {
                Action::Click { selector } if selector == "#missing" => {
                    Err(ActionError::Failed("selector not found".to_string()))
                }
                Action::Click { selector } if selector == "#hang" => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok("late".to_string())
                }
                Action::Wait { duration_ms } => {
                    tokio::time::sleep(Duration::from_millis(*duration_ms)).await;
                    Ok("waited".to_string())
                }
                _ => Ok("ok".to_string()),
            }
        }

        async fn screenshot(&mut self) -> Result<String, ActionError> {
            Ok("iVBORw0KGgo=".to_string())
        }

        async fn extract_summary(&mut self, max_chars: usize) -> Result<PageSummary, ActionError> {
            Ok(PageSummary {
                title: "X".to_string(),
                url: "https://x.test".to_string(),
                text_excerpt: crate::browser::truncate_chars("hello world", max_chars),
            })
        }

        async fn close(&mut self) -> Result<(), SessionError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FakeBackend {
        acted: Arc<std::sync::Mutex<Vec<Action>>>,
        closes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl BrowserBackend for FakeBackend {
        async fn open(&self) -> Result<Box<dyn BrowserSession>, SessionError> {
            Ok(Box::new(FakeSession {
                acted: Arc::clone(&self.acted),
                closes: Arc::clone(&self.closes),
            }))
        }
    }

    fn fake() -> (TaskExecutor, Arc<std::sync::Mutex<Vec<Action>>>, Arc<AtomicUsize>) {
        let acted = Arc::new(std::sync::Mutex::new(Vec::new()));
        let closes = Arc::new(AtomicUsize::new(0));
        let backend = FakeBackend {
            acted: Arc::clone(&acted),
            closes: Arc::clone(&closes),
        };
        (
            TaskExecutor::new(Arc::new(backend), CanvasSection::default()),
            acted,
            closes,
        )
    }

    #[tokio::test]
    async fn test_implicit_navigation_precedes_plan() {
        let (executor, acted, closes) = fake();
        let plan = Plan::new(vec![Action::Scroll]);
        let result = executor.execute(&plan, "https://start.test").await;

        assert!(result.success());
        assert_eq!(
            acted.lock().unwrap().as_slice(),
            &[Action::navigate("https://start.test"), Action::Scroll]
        );
        assert_eq!(result.steps().len(), 4);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_per_action_timeout_is_isolated() {
        let acted = Arc::new(std::sync::Mutex::new(Vec::new()));
        let closes = Arc::new(AtomicUsize::new(0));
        let mut settings = CanvasSection::default();
        settings.timeouts.click = 0;
        let backend = FakeBackend {
            acted: Arc::clone(&acted),
            closes: Arc::clone(&closes),
        };
        let executor = TaskExecutor::new(Arc::new(backend), settings);

        let plan = Plan::new(vec![Action::click("#hang"), Action::Scroll]);
        let result = executor.execute(&plan, "").await;

        assert!(result.success());
        assert_eq!(acted.lock().unwrap().len(), 2);
        assert!(result.steps()[1].contains("timed out after 0ms"));
        assert!(result.steps()[2].starts_with("✅ scroll"));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_skips_all_actions() {
        let (executor, acted, closes) = fake();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let plan = Plan::new(vec![Action::Scroll, Action::Scroll]);
        let result = executor.execute_with_cancel(&plan, "", cancel).await;

        assert!(result.success());
        assert!(acted.lock().unwrap().is_empty());
        assert!(result.steps()[1].contains("skipped 2 remaining"));
        assert!(result.screenshot().is_some());
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panic_message_variants() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(boxed.as_ref()), "bang");
    }
}
