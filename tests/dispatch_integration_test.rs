//! Orchestrator 集成测试：模式路由、Canvas 上下文隔离、错误标注

mod common;

use std::sync::Arc;

use agis::browser::Action;
use agis::config::AppConfig;
use agis::core::{
    AttachmentKind, DispatchError, DispatchOutput, Mode, ModelError, Orchestrator, PipelineError,
    Request, RequestOptions,
};
use agis::llm::{ScriptedLlmClient, ScriptedReply};
use agis::memory::Message;
use common::FakeBackend;
use serde_json::json;

fn orchestrator(llm: Arc<ScriptedLlmClient>, backend: FakeBackend) -> (Orchestrator, Arc<common::Counters>) {
    let counters = Arc::clone(&backend.counters);
    (
        Orchestrator::new(llm, Arc::new(backend), AppConfig::default()),
        counters,
    )
}

fn history() -> Vec<Message> {
    vec![
        Message::user("my password is hunter2"),
        Message::assistant("noted"),
    ]
}

#[tokio::test]
async fn test_canvas_ignores_history_and_attachment() {
    let llm = Arc::new(ScriptedLlmClient::new().on(
        "User Goal",
        ScriptedReply::Text(r##"[{"type": "click", "selector": "#search"}]"##.to_string()),
    ));
    let (orchestrator, counters) = orchestrator(llm.clone(), FakeBackend::new());
    let request = Request::new("search for rust news", Mode::Canvas)
        .with_history(history())
        .with_attachment(AttachmentKind::Csv, "secret,column\n1,2");

    let output = orchestrator.dispatch(request).await.unwrap();

    let calls = llm.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].prompt.contains("search for rust news"));
    assert!(!calls[0].prompt.contains("hunter2"));
    assert!(!calls[0].prompt.contains("secret,column"));

    match output {
        DispatchOutput::Canvas { plan, result } => {
            assert_eq!(plan.actions(), [Action::click("#search")]);
            assert!(result.success());
        }
        other => panic!("unexpected output: {other:?}"),
    }
    // 默认目标先被隐式导航
    assert_eq!(
        counters.acted(),
        vec![Action::navigate("https://google.com"), Action::click("#search")]
    );
    assert_eq!(counters.opens(), 1);
    assert_eq!(counters.closes(), 1);
}

#[tokio::test]
async fn test_canvas_unparseable_plan_degrades_to_fallback() {
    let llm = Arc::new(ScriptedLlmClient::new().otherwise(ScriptedReply::Text("I cannot help".to_string())));
    let (orchestrator, counters) = orchestrator(llm, FakeBackend::new());
    let request = Request::new("check the weather", Mode::Canvas).with_target("https://x.test");

    let output = orchestrator.dispatch(request).await.unwrap();

    let DispatchOutput::Canvas { plan, .. } = output else {
        panic!("expected canvas output");
    };
    assert_eq!(plan.len(), 3);
    assert_eq!(plan.actions()[0], Action::navigate("https://x.test"));
    assert_eq!(counters.acted()[0], Action::navigate("https://x.test"));
}

#[tokio::test]
async fn test_canvas_open_failure_surfaces_steps() {
    let llm = Arc::new(ScriptedLlmClient::new().otherwise(ScriptedReply::Text("[]".to_string())));
    let (orchestrator, _) = orchestrator(llm, FakeBackend::failing_open());

    let err = orchestrator
        .dispatch(Request::new("open the page", Mode::Canvas))
        .await
        .unwrap_err();

    assert_eq!(err.mode(), Some(Mode::Canvas));
    match err {
        DispatchError::Execution { message, steps, .. } => {
            assert!(message.contains("chrome not installed"));
            assert!(!steps.is_empty());
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_non_canvas_modes_never_open_a_session() {
    let llm = Arc::new(ScriptedLlmClient::new().otherwise(ScriptedReply::Text("plain answer".to_string())));
    let (orchestrator, counters) = orchestrator(llm, FakeBackend::new());

    for mode in [Mode::Knowledge, Mode::Coder, Mode::CodeX, Mode::Blueprint] {
        orchestrator
            .dispatch(Request::new("hello", mode).with_history(history()))
            .await
            .unwrap();
    }

    assert_eq!(counters.opens(), 0);
    assert!(counters.acted().is_empty());
}

#[tokio::test]
async fn test_knowledge_uses_history_and_normalizes_answer() {
    let llm = Arc::new(ScriptedLlmClient::new().otherwise(ScriptedReply::Structured(json!({
        "answer": "Paris",
        "reasoning": "capital of France",
        "confidenceScore": 0.95
    }))));
    let (orchestrator, _) = orchestrator(llm.clone(), FakeBackend::new());

    let output = orchestrator
        .dispatch(Request::new("and its capital?", Mode::Knowledge).with_history(history()))
        .await
        .unwrap();

    let DispatchOutput::Answer(answer) = output else {
        panic!("expected answer");
    };
    assert_eq!(answer.answer, "Paris");
    assert_eq!(answer.confidence_score, Some(0.95));
    let prompt = &llm.calls()[0].prompt;
    assert!(prompt.contains("Conversation so far:"));
    assert!(prompt.contains("hunter2"));
    assert!(prompt.contains("and its capital?"));
}

#[tokio::test]
async fn test_unknown_mode_is_rejected() {
    let llm = Arc::new(ScriptedLlmClient::new());
    let (orchestrator, _) = orchestrator(llm.clone(), FakeBackend::new());

    let err = orchestrator
        .dispatch_raw("hi", "Astrology", Vec::new(), None, RequestOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, DispatchError::UnsupportedMode(ref m) if m == "Astrology"));
    assert!(err.mode().is_none());
    assert!(llm.calls().is_empty());
}

#[tokio::test]
async fn test_raw_mode_names_are_parsed() {
    let llm = Arc::new(ScriptedLlmClient::new().otherwise(ScriptedReply::Text("ok".to_string())));
    let (orchestrator, _) = orchestrator(llm, FakeBackend::new());

    let output = orchestrator
        .dispatch_raw("hi", "AI Knowledge", Vec::new(), None, RequestOptions::default())
        .await
        .unwrap();

    assert!(matches!(output, DispatchOutput::Answer(ref a) if a.answer == "ok"));
}

#[tokio::test]
async fn test_generation_error_is_tagged_with_mode() {
    let llm = Arc::new(
        ScriptedLlmClient::new().otherwise(ScriptedReply::Fail(ModelError::Quota("429".to_string()))),
    );
    let (orchestrator, _) = orchestrator(llm, FakeBackend::new());

    let err = orchestrator
        .dispatch(Request::new("write a sort", Mode::Coder))
        .await
        .unwrap_err();

    assert_eq!(err.mode(), Some(Mode::Coder));
    assert!(matches!(
        err,
        DispatchError::Generation {
            source: ModelError::Quota(_),
            ..
        }
    ));
}

#[tokio::test]
async fn test_pipeline_errors_are_tagged_with_mode() {
    let llm = Arc::new(
        ScriptedLlmClient::new().otherwise(ScriptedReply::Fail(ModelError::Request("down".to_string()))),
    );
    let (orchestrator, _) = orchestrator(llm, FakeBackend::new());

    let err = orchestrator
        .dispatch(Request::new("a desert planet", Mode::Cosmos))
        .await
        .unwrap_err();
    assert_eq!(err.mode(), Some(Mode::Cosmos));
    assert!(matches!(
        err,
        DispatchError::Pipeline {
            source: PipelineError::SeedFailed { .. },
            ..
        }
    ));

    let err = orchestrator
        .dispatch(Request::new("lunar cat cafe", Mode::Crucible))
        .await
        .unwrap_err();
    assert_eq!(err.mode(), Some(Mode::Crucible));
    assert!(matches!(
        err,
        DispatchError::Pipeline {
            source: PipelineError::InvalidConfiguration(_),
            ..
        }
    ));
}

#[tokio::test]
async fn test_synthesis_folds_attachment_into_context() {
    let llm = Arc::new(
        ScriptedLlmClient::new()
            .on(
                "Stage: profile",
                ScriptedReply::Structured(json!({
                    "summary": "Monthly sales",
                    "keyFindings": ["March peaked"]
                })),
            )
            .on(
                "Stage: narrative",
                ScriptedReply::Structured(json!({"narrative": ["Sales rose in Q1."]})),
            )
            .on(
                "Stage: charts",
                ScriptedReply::Structured(json!({"charts": [
                    {"title": "Sales", "chartType": "bar", "data": [{"name": "Mar", "value": 30.0}]}
                ]})),
            )
            .on(
                "Stage: tables",
                ScriptedReply::Structured(json!({"tables": []})),
            ),
    );
    let (orchestrator, _) = orchestrator(llm.clone(), FakeBackend::new());
    let request = Request::new("analyse this", Mode::Synthesis)
        .with_attachment(AttachmentKind::Csv, "month,sales\nMar,30");

    let output = orchestrator.dispatch(request).await.unwrap();

    let DispatchOutput::Synthesis(report) = output else {
        panic!("expected synthesis output");
    };
    assert_eq!(report.key_findings, ["March peaked"]);
    assert_eq!(report.content.len(), 2);
    let profile = &llm.calls()[0].prompt;
    assert!(profile.contains("--- BEGIN ATTACHED CSV ---"));
    assert!(profile.contains("Mar,30"));
}
