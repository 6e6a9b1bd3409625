//! Beeline - 无界面入口
//!
//! 每行标准输入是一次任务；支持 /compact、/clear、/status、/multi <task>。
//! 未设置 API Key 时回退到 Mock 传输层（回显），方便本地试跑。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use beeline::config::{load_config, AppConfig};
use beeline::llm::{Availability, ScriptedTransport};
use beeline::react::ChannelObserver;
use beeline::{observability, Agent, AgentBuilder, AgentError};
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(error = %e, "failed to load config, using defaults");
            AppConfig::default()
        }
    };

    let mut builder = AgentBuilder::new(config.clone());
    let has_key = std::env::var(&config.llm.api_key_env)
        .map(|k| !k.is_empty())
        .unwrap_or(false);
    if !has_key {
        tracing::warn!(
            env = %config.llm.api_key_env,
            "API key not set, falling back to the echo mock transport"
        );
        builder = builder.with_transport(Arc::new(ScriptedTransport::new()));
    }

    // 过程事件以 JSON 行写到 stderr
    let (observer, mut events) = ChannelObserver::channel();
    let mut agent = builder
        .with_observer(Arc::new(observer))
        .build()
        .context("Failed to create agent")?;
    tokio::spawn(async move {
        while let Some(ev) = events.recv().await {
            if let Ok(line) = serde_json::to_string(&ev) {
                eprintln!("{}", line);
            }
        }
    });

    let cancel = agent.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        handle_line(&mut agent, input).await;
        if agent.cancellation_token().is_cancelled() {
            break;
        }
    }

    let usage = agent.token_usage();
    tracing::info!(
        requests = usage.requests,
        total_tokens = usage.total_tokens,
        "session finished"
    );
    Ok(())
}

async fn handle_line(agent: &mut Agent, input: &str) {
    match input {
        "/compact" => match agent.compact().await {
            Ok(status) => println!("{}", status),
            Err(e) => print_error(&e),
        },
        "/clear" => {
            agent.clear_history();
            println!("History cleared.");
        }
        "/status" => print_status(agent),
        _ => {
            if let Some(task) = input.strip_prefix("/multi") {
                let task = task.trim();
                if task.is_empty() {
                    println!("Usage: /multi <task>");
                    return;
                }
                match agent.run_pipeline(task).await {
                    Ok(report) => println!("{}", report.summary),
                    Err(e) => print_error(&e),
                }
                return;
            }
            match agent.process_message(input).await {
                Ok(outcome) => println!("{}", outcome.response),
                Err(e) => print_error(&e),
            }
        }
    }
}

fn print_status(agent: &Agent) {
    for status in agent.model_status() {
        match status.availability {
            Availability::Available => println!("  {} ({}): available", status.label, status.id),
            Availability::Cooldown { remaining_secs } => println!(
                "  {} ({}): cooling down, {}s left",
                status.label, status.id, remaining_secs
            ),
        }
    }
    let usage = agent.token_usage();
    println!(
        "Tokens: {} prompt / {} completion / {} total over {} requests; {} messages in history",
        usage.prompt_tokens,
        usage.completion_tokens,
        usage.total_tokens,
        usage.requests,
        agent.history().len()
    );
}

fn print_error(e: &AgentError) {
    println!("Error: {}", e);
    println!("Hint: {}", e.user_hint());
}
