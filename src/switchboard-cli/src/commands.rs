//! Subcommand implementations.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use switchboard_engine::config::API_KEY_ENV;
use switchboard_engine::{
    ConversationSession, ConversationStore, EngineConfig, FleetConfig, GeminiOracle, JsonlStore,
    MemoryStore, OrchestrationLoop, ServerHealth, ToolServerRegistry, TurnRequest, TurnService,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::warn;

use crate::args::{Cli, Commands, ConversationArgs};

pub async fn run(
    cli: &Cli,
    config: &EngineConfig,
    fleet: &FleetConfig,
    registry: Arc<ToolServerRegistry>,
) -> Result<()> {
    match &cli.command {
        Commands::Tools => {
            connect_fleet(&registry, fleet).await;
            print_tools(&registry).await;
            Ok(())
        }
        Commands::Ask {
            message,
            conversation,
        } => {
            let service = build_service(config, cli.store.as_deref(), registry.clone())?;
            connect_fleet(&registry, fleet).await;
            ask(&service, message, conversation).await
        }
        Commands::Chat { conversation } => {
            let service = build_service(config, cli.store.as_deref(), registry.clone())?;
            connect_fleet(&registry, fleet).await;
            chat(&service, config, conversation).await
        }
    }
}

fn build_service(
    config: &EngineConfig,
    store_dir: Option<&Path>,
    registry: Arc<ToolServerRegistry>,
) -> Result<TurnService> {
    let oracle = GeminiOracle::from_env(&config.oracle).ok_or_else(|| {
        anyhow!("{API_KEY_ENV} is not set; export it or add it to a .env file")
    })?;

    let store: Arc<dyn ConversationStore> = match store_dir {
        Some(dir) => Arc::new(
            JsonlStore::new(dir)
                .with_context(|| format!("Failed to open store at {}", dir.display()))?,
        ),
        None => Arc::new(MemoryStore::new()),
    };

    Ok(TurnService::new(
        OrchestrationLoop::new(registry, Arc::new(oracle), config),
        Arc::new(ConversationSession::new(&config.history)),
        store,
    ))
}

async fn connect_fleet(registry: &ToolServerRegistry, fleet: &FleetConfig) {
    let report = registry.connect_all(&fleet.servers).await;
    for failure in &report.failed {
        eprintln!("warning: {failure}");
    }
    for summary in &report.connected {
        for rejected in &summary.rejected {
            eprintln!("warning: {rejected}");
        }
    }
}

async fn print_tools(registry: &ToolServerRegistry) {
    let health = registry.check_health().await;
    if health.is_empty() {
        println!("No tool servers connected.");
        return;
    }

    for (server, state) in &health {
        match state {
            ServerHealth::Healthy => println!("{server}: ok"),
            ServerHealth::Unresponsive(reason) => println!("{server}: unresponsive ({reason})"),
            ServerHealth::Disconnected => println!("{server}: disconnected"),
        }
    }

    let status = registry.status().await;
    println!("{} tool(s):", status.tool_count);
    for descriptor in registry.descriptors().await {
        println!(
            "  {} -> {}\n      {}",
            descriptor.flat_name,
            descriptor.canonical_name(),
            descriptor.description
        );
    }
}

async fn ask(service: &TurnService, message: &str, args: &ConversationArgs) -> Result<()> {
    let mut request = TurnRequest::new(message, args.user.clone());
    request.conversation_id = args.conversation.clone();

    let response = service.submit(request).await.context("Turn failed")?;
    println!("{}", response.response);
    eprintln!("conversation: {}", response.conversation_id);
    Ok(())
}

async fn chat(service: &TurnService, config: &EngineConfig, args: &ConversationArgs) -> Result<()> {
    let mut conversation_id = args.conversation.clone();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stderr = tokio::io::stderr();

    loop {
        stderr.write_all(b"> ").await?;
        stderr.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();

        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/clear" => {
                if let Some(id) = conversation_id.take() {
                    service.clear(&id).await.context("Failed to clear conversation")?;
                }
                eprintln!("(conversation cleared)");
                continue;
            }
            _ => {}
        }

        let mut request = TurnRequest::new(line, args.user.clone());
        request.conversation_id = conversation_id.clone();

        match service.submit(request).await {
            Ok(response) => {
                println!("{}\n", response.response);
                conversation_id = Some(response.conversation_id);
            }
            Err(e) => {
                warn!(error = %e, "Turn failed");
                eprintln!("error: {e}");
            }
        }

        service.evict_idle(config.history.idle_ttl());
    }

    if let Some(id) = conversation_id {
        eprintln!("conversation: {id}");
    }
    Ok(())
}
