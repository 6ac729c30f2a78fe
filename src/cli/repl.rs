//! 交互式会话：主题选择、逐行对话、Ctrl+C 取消当前轮、结束总结
//!
//! `/exit`、`/quit` 或 EOF 结束会话；`!` 指令交给会话内的本地路由。

use std::io::{BufRead, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::commands::render;
use crate::config::AppConfig;
use crate::core::{SessionBuilder, StudyError};
use crate::llm::create_connector;
use crate::react::LoopEvent;
use crate::vault::{sanitize_topic, VaultStore};

/// 运行一次学习会话
pub async fn run_session(config: &AppConfig, topic: Option<String>) -> anyhow::Result<()> {
    let store = super::open_vault(config)?;
    let topic = match topic {
        Some(t) => sanitize_topic(&t),
        None => match pick_topic(&store)? {
            Some(t) => t,
            None => return Ok(()),
        },
    };
    store
        .ensure_topic(&topic)
        .with_context(|| format!("Failed to open topic '{topic}'"))?;

    let connector = create_connector(&config.llm)?;
    let label = format!("{}/{}", connector.name(), connector.model());
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let mut session = SessionBuilder::new(Arc::clone(&store), connector)
        .with_topic(&topic)
        .with_request_timeout(Duration::from_secs(config.llm.timeouts.request))
        .build()
        .context("Failed to start session")?
        .with_events(event_tx);
    tokio::spawn(print_events(event_rx));

    println!("{}", session.snapshot()?);
    println!("\n{label} · type !help for commands, /exit to finish\n");
    match session.boot().await {
        Ok(Some(reply)) => println!("{}\n", reply.text),
        Ok(None) => {}
        Err(e) => eprintln!("recap failed: {e}"),
    }

    let cancel = session.cancel_handle();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("you › ");
        std::io::stdout().flush()?;
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!();
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if matches!(input, "/exit" | "/quit") {
            break;
        }

        let turn = session.send(input);
        tokio::pin!(turn);
        let result = loop {
            tokio::select! {
                result = &mut turn => break result,
                _ = tokio::signal::ctrl_c() => cancel.cancel(),
            }
        };
        match result {
            Ok(reply) => {
                println!("\n{}\n", reply.text);
                if reply.truncated && !reply.local {
                    println!("(reply truncated after {} round(s))\n", reply.rounds);
                }
            }
            Err(StudyError::Cancelled) => println!("\n(cancelled)\n"),
            Err(e) => eprintln!("\nerror: {e}\n"),
        }
    }

    println!("wrapping up vault...");
    let summary = session.end_session().await.context("Failed to finish session")?;
    println!("\n{}", render::session_summary(&summary));
    Ok(())
}

/// 工具调用以单行提示输出到 stderr
async fn print_events(mut rx: mpsc::UnboundedReceiver<LoopEvent>) {
    while let Some(ev) = rx.recv().await {
        match ev {
            LoopEvent::ToolCall { tool, .. } => eprintln!("  · {tool}"),
            LoopEvent::ToolResult { tool, ok: false, preview } => eprintln!("  ✗ {tool}: {preview}"),
            LoopEvent::Truncated { rounds } => eprintln!("  (stopped after {rounds} rounds)"),
            _ => {}
        }
    }
}

/// 列出已有主题供选择；输入序号或新主题名，空输入退出
fn pick_topic(store: &VaultStore) -> anyhow::Result<Option<String>> {
    let topics = store.list_topics()?;
    for (i, topic) in topics.iter().enumerate() {
        let last = store
            .read_topic(topic)?
            .and_then(|n| n.frontmatter.last_session)
            .unwrap_or_else(|| "—".to_string());
        println!("{:>3}. {topic:<30} last: {last}", i + 1);
    }
    let prompt = if topics.is_empty() {
        "New topic name: "
    } else {
        "Pick a number or type a new topic name: "
    };
    let answer = read_line(prompt)?;
    let answer = answer.trim();
    if answer.is_empty() {
        return Ok(None);
    }
    Ok(Some(choose_topic(&topics, answer)))
}

fn choose_topic(topics: &[String], answer: &str) -> String {
    answer
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| topics.get(i).cloned())
        .unwrap_or_else(|| sanitize_topic(answer))
}

/// y/yes 确认
pub(crate) fn confirm(prompt: &str) -> anyhow::Result<bool> {
    let answer = read_line(prompt)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn read_line(prompt: &str) -> anyhow::Result<String> {
    print!("{prompt}");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line)
}
