//! AGI-S - 命令行入口
//!
//! 初始化日志与配置，选择 LLM 与浏览器后端，然后在 stdin 上运行一个简单的 REPL。
//! 以 `/` 开头的行是命令（/help 查看），其余行作为当前模式下的请求发送给编排器。

use std::sync::Arc;

use agis::browser::BrowserBackend;
use agis::config::{load_config, AppConfig};
use agis::core::{
    Attachment, AttachmentKind, DispatchError, DispatchOutput, Mode, Orchestrator, Request,
    RequestOptions,
};
use agis::memory::{
    Conversation, ConversationMemory, ConversationStore, InMemoryConversationStore, Message,
};
use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};

const HELP: &str = "Commands:
  /mode <name>        switch mode (AI Knowledge, Coder, CodeX, Blueprint, Canvas, Cosmos, Catalyst, Synthesis, Crucible)
  /modes              list modes
  /target <url>       target URL for Canvas / Blueprint (empty to reset)
  /personas <a,b,..>  Crucible personas (cfo, competitor_ceo, ethicist, customer, engineer, legal)
  /attach <kind> <path>  attach a text file (csv, json, pdf text, base64 image) to the next request
  /new                start a new conversation
  /history            list saved conversations
  /usage              token usage so far
  /quit               exit";

fn browser_backend() -> Arc<dyn BrowserBackend> {
    #[cfg(feature = "browser")]
    {
        Arc::new(agis::browser::ChromeBackend::new())
    }
    #[cfg(not(feature = "browser"))]
    {
        Arc::new(agis::browser::UnavailableBackend)
    }
}

fn print_output(output: &DispatchOutput) -> anyhow::Result<()> {
    match output {
        DispatchOutput::Answer(answer) => {
            println!("{}", answer.answer);
            if let Some(reasoning) = &answer.reasoning {
                println!("\n(reasoning) {}", reasoning);
            }
        }
        DispatchOutput::Canvas { plan, result } => {
            println!("plan: {} action(s)", plan.len());
            for step in result.steps() {
                println!("  {}", step);
            }
            if let Some(summary) = result.extracted_data() {
                println!("page: {} ({})\n{}", summary.title, summary.url, summary.text_excerpt);
            }
        }
        other => println!("{}", serde_json::to_string_pretty(other)?),
    }
    Ok(())
}

/// 写入会话历史的助手回复文本
fn reply_text(output: &DispatchOutput) -> String {
    match output {
        DispatchOutput::Answer(answer) => answer.answer.clone(),
        DispatchOutput::Component(component) => component.component_code.clone(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 日志：默认 info，可通过 RUST_LOG 覆盖
    agis::observability::init();

    let cfg = load_config(None).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });
    let max_turns = cfg.app.max_context_turns;
    let app_name = cfg.app.display_name().to_string();
    let orchestrator = Orchestrator::from_config(cfg, browser_backend());

    let store = InMemoryConversationStore::new();
    let mut mode = Mode::Knowledge;
    let mut memory = ConversationMemory::new(max_turns);
    let mut conversation = Conversation::new(mode);
    let mut options = RequestOptions::default();
    let mut pending_attachment: Option<Attachment> = None;

    println!("{} ready. Mode: {}. Type /help for commands.", app_name, mode);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = line.strip_prefix('/') {
            let (name, arg) = command.split_once(' ').unwrap_or((command, ""));
            let arg = arg.trim();
            match name {
                "quit" | "exit" => break,
                "help" => println!("{}", HELP),
                "modes" => {
                    for m in Mode::ALL {
                        println!("  {}", m);
                    }
                }
                "mode" => match arg.parse::<Mode>() {
                    Ok(m) => {
                        mode = m;
                        println!("Mode: {}", mode);
                    }
                    Err(e) => println!("{}", e),
                },
                "target" => {
                    options.target = Some(arg.to_string()).filter(|t| !t.is_empty());
                    println!("Target: {}", options.target.as_deref().unwrap_or("(default)"));
                }
                "personas" => {
                    options.personas = arg
                        .split(',')
                        .map(|p| p.trim().to_string())
                        .filter(|p| !p.is_empty())
                        .collect();
                    println!("Personas: {:?}", options.personas);
                }
                "attach" => {
                    let (kind, path) = arg.split_once(' ').unwrap_or((arg, ""));
                    let kind = match kind {
                        "image" => Some(AttachmentKind::Image),
                        "pdf" => Some(AttachmentKind::Pdf),
                        "csv" => Some(AttachmentKind::Csv),
                        "json" => Some(AttachmentKind::Json),
                        _ => None,
                    };
                    match (kind, tokio::fs::read_to_string(path.trim()).await) {
                        (Some(kind), Ok(payload)) => {
                            println!("Attached {} ({} chars)", kind.as_str(), payload.chars().count());
                            pending_attachment = Some(Attachment { kind, payload });
                        }
                        (None, _) => println!("Unknown attachment kind; use image, pdf, csv or json"),
                        (_, Err(e)) => println!("Cannot read {}: {}", path, e),
                    }
                }
                "new" => {
                    memory.clear();
                    conversation = Conversation::new(mode);
                    println!("New conversation");
                }
                "history" => {
                    for c in store.list() {
                        println!("  {}  {} ({} messages)", c.id, c.title, c.messages.len());
                    }
                }
                "usage" => {
                    let (prompt, completion, total) = orchestrator.token_usage();
                    println!("Tokens: {} prompt + {} completion = {}", prompt, completion, total);
                }
                _ => println!("Unknown command. Type /help"),
            }
            continue;
        }

        let request = Request {
            query: line.to_string(),
            mode,
            history: memory.messages().to_vec(),
            attachment: pending_attachment.take(),
            options: options.clone(),
        };

        match orchestrator.dispatch(request).await {
            Ok(output) => {
                print_output(&output)?;
                let reply = Message::assistant(reply_text(&output));
                memory.push(Message::user(line));
                memory.push(reply.clone());
                conversation.mode = mode;
                conversation.push(Message::user(line));
                conversation.push(reply);
                store.save(conversation.clone());
            }
            Err(DispatchError::Execution { message, steps, .. }) => {
                println!("Browser task failed: {}", message);
                for step in steps {
                    println!("  {}", step);
                }
            }
            Err(e) => println!("Error: {}", e),
        }
    }

    println!("Bye.");
    Ok(())
}
