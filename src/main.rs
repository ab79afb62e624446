//! BI Agent 命令行入口
//!
//! 初始化日志与配置，构建编排器，然后逐行读取标准输入：每行是一次 run_turn。
//! 第一个参数为对话 ID（省略时随机生成）；BI_AGENT_CONFIG 可指定额外的配置文件。
//! 支持 /history、/todo、/reset、/quit。

use anyhow::Context;
use bi_agent::config::load_config;
use bi_agent::core::{OrchestratorBuilder, TurnEvent};
use bi_agent::observability;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::var_os("BI_AGENT_CONFIG").map(std::path::PathBuf::from);
    let config = load_config(config_path).context("Failed to load configuration")?;
    let conversation_id = std::env::args()
        .nth(1)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let orchestrator = OrchestratorBuilder::new(config)
        .with_events(events_tx)
        .build();

    tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            match event {
                TurnEvent::Planned { steps } => {
                    println!("  plan:");
                    for (i, step) in steps.iter().enumerate() {
                        println!("    {}. {}", i + 1, step);
                    }
                }
                TurnEvent::StepStarted {
                    description,
                    position,
                    total,
                    ..
                } => println!("  [{position}/{total}] {description}"),
                _ => {}
            }
        }
    });

    println!("conversation {conversation_id} (/history, /todo, /reset, /quit)");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let input = line.trim();
        match input {
            "" => continue,
            "/quit" => break,
            "/history" => {
                for record in orchestrator.history(&conversation_id).await? {
                    println!(
                        "#{} [{:?}] {}: {}",
                        record.turn_id, record.status, record.step_key, record.agent_action
                    );
                }
            }
            "/todo" => match orchestrator.active_list(&conversation_id).await? {
                Some(list) => {
                    for step in list.steps() {
                        let marker = if list.cursor() == Some(step.key.as_str()) { ">" } else { " " };
                        println!("{marker} {} [{:?}] {}", step.key, step.status, step.description);
                    }
                }
                None => println!("(no active todo list)"),
            },
            "/reset" => {
                orchestrator.reset(&conversation_id).await?;
                println!("(conversation cleared)");
            }
            _ => {
                let outcome = orchestrator.run_turn(&conversation_id, input).await;
                println!("[{:?}] {}", outcome.halt_reason, outcome.final_text);
            }
        }
    }

    Ok(())
}
