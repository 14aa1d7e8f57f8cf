mod config;
mod prompt;

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use agent_core::budget::limits::ModelLimitsRegistry;
use agent_core::budget::create_token_counter;
use agent_core::{AgentError, AgentEvent, ContextBudgeter, Session, TokenBudget};
use agent_llm::providers::anthropic::DEFAULT_MODEL;
use agent_llm::{AnthropicProvider, LLMProvider};
use agent_loop::{run_agent_loop_with_config, AgentLoopConfig};
use agent_mcp::{McpToolExecutor, ToolCatalogue};
use clap::Parser;
use colored::Colorize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;

#[derive(Parser)]
#[command(name = "mcp-chat")]
#[command(about = "Terminal chat with an MCP tool-using assistant")]
#[command(
    long_about = "Terminal chat with an MCP tool-using assistant.\n\n\
This binary configures no MCP connections, so the assistant starts without tools. \
Embedders register servers through ToolCatalogue::connect."
)]
#[command(version)]
struct Cli {
    /// Model to chat with
    #[arg(long)]
    model: Option<String>,

    /// Maximum LLM calls per user message
    #[arg(long)]
    max_rounds: Option<usize>,

    /// File holding the system prompt
    #[arg(long)]
    system_prompt_file: Option<PathBuf>,

    /// Enable debug mode
    #[arg(long, short, default_value = "false")]
    debug: bool,
}

/// Everything one chat needs, built once at startup.
struct ChatContext {
    provider: Arc<dyn LLMProvider>,
    tools: Arc<McpToolExecutor>,
    budgeter: ContextBudgeter,
    loop_config: AgentLoopConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let mut config = Config::load()?;
    if let Some(model) = cli.model {
        config.model = Some(model);
    }
    if let Some(max_rounds) = cli.max_rounds {
        config.max_rounds = Some(max_rounds);
    }
    if let Some(path) = cli.system_prompt_file {
        config.system_prompt_file = Some(path);
    }

    let chat = build_chat_context(config).await?;
    run_interactive_chat(chat, cli.debug).await
}

fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_line_number(true)
                .with_file(false)
                .with_writer(io::stderr),
        )
        .init();
}

async fn build_chat_context(config: Config) -> anyhow::Result<ChatContext> {
    let api_key = config
        .api_key
        .clone()
        .ok_or_else(|| anyhow::anyhow!("ANTHROPIC_API_KEY is not set"))?;
    let model = config.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string());

    let mut registry = ModelLimitsRegistry::new();
    if let Err(e) = registry.load_user_config().await {
        tracing::warn!("Failed to load model limits, using built-in values: {}", e);
    }
    let budget = match config.max_output_tokens {
        Some(max_output_tokens) => TokenBudget::new(
            registry.get_or_default(&model).max_context_tokens,
            max_output_tokens,
        ),
        None => registry.budget_for(&model),
    };
    tracing::info!(
        "Model {}: context {} tokens, {} reserved for output",
        model,
        budget.max_context_tokens,
        budget.max_output_tokens
    );

    let mut provider = AnthropicProvider::new(api_key).with_model(model.clone());
    if let Some(api_base) = config.api_base.as_deref() {
        provider = provider.with_base_url(api_base);
    }

    let catalogue = Arc::new(ToolCatalogue::new());
    let system_prompt = prompt::load_system_prompt(
        config.system_prompt_file.as_deref(),
        chrono::Local::now().date_naive(),
    )?;

    let mut loop_config = AgentLoopConfig {
        system_prompt,
        max_output_tokens: budget.max_output_tokens,
        ..Default::default()
    };
    if let Some(max_rounds) = config.max_rounds {
        loop_config.max_rounds = max_rounds;
    }

    Ok(ChatContext {
        provider: Arc::new(provider),
        tools: Arc::new(McpToolExecutor::new(catalogue)),
        budgeter: ContextBudgeter::new(create_token_counter(&model, budget)),
        loop_config,
    })
}

async fn run_interactive_chat(chat: ChatContext, debug: bool) -> anyhow::Result<()> {
    let session_id = uuid::Uuid::new_v4().to_string();
    let mut session = Session::new(session_id.clone()).with_model(chat.provider.model());

    println!("{}", "🤖 MCP Chat".cyan().bold());
    println!("{}", format!("Session ID: {}", session_id).dimmed());
    println!(
        "{}",
        format!(
            "Model: {}, {}",
            chat.provider.model(),
            connections_line(&chat.tools.catalogue().connection_names())
        )
        .dimmed()
    );
    println!("{}", "Type 'exit' or 'quit' to leave".dimmed());
    println!();

    loop {
        print!("{} ", "You:".cyan().bold());
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();

        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            println!("{}", "👋 Goodbye!".cyan());
            break;
        }

        if input.is_empty() {
            continue;
        }

        println!("{}", "Assistant:".green().bold());

        let (event_tx, mut event_rx) = mpsc::channel::<AgentEvent>(100);
        let renderer = tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                print_event(&event, debug);
            }
        });

        let cancel_token = CancellationToken::new();
        let interrupt = {
            let cancel_token = cancel_token.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel_token.cancel();
                }
            })
        };

        let outcome = run_agent_loop_with_config(
            &mut session,
            input.to_string(),
            event_tx,
            chat.provider.clone(),
            chat.tools.clone(),
            &chat.budgeter,
            cancel_token,
            chat.loop_config.clone(),
        )
        .await;

        interrupt.abort();
        let _ = renderer.await;

        match outcome {
            Ok(()) => {}
            Err(AgentError::Cancelled) => println!("{}", "⏹ Cancelled".yellow()),
            // Already shown through an Error event
            Err(AgentError::LLM(_)) | Err(AgentError::BudgetExhausted(_)) => {}
            Err(e) => println!("{}", format!("❌ Error: {}", e).red()),
        }

        println!();
    }

    Ok(())
}

fn connections_line(names: &[String]) -> String {
    if names.is_empty() {
        "no MCP connections configured, tools are unavailable".to_string()
    } else {
        format!("MCP connections: {}", names.join(", "))
    }
}

fn print_event(event: &AgentEvent, debug: bool) {
    match event {
        AgentEvent::Token { content } => {
            print!("{}", content.green());
            let _ = io::stdout().flush();
        }
        AgentEvent::ToolStart {
            tool_name, input, ..
        } => {
            println!();
            println!("{}", format!("🔧 Executing tool: {}", tool_name).yellow());
            println!("{}", format!("   Args: {}", input).dimmed());
        }
        AgentEvent::ToolComplete { result, .. } => {
            println!("{}", format!("✅ Tool result: {}", result.result).green());
        }
        AgentEvent::ToolError { error, .. } => {
            println!("{}", format!("❌ Tool error: {}", error).red());
        }
        AgentEvent::TokenBudgetUpdated { usage } => {
            if debug || usage.truncation_occurred {
                eprintln!(
                    "{}",
                    format!(
                        "[context] {} / {} tokens (system {}, tools {}, history {}), {} messages left out",
                        usage.total_tokens,
                        usage.budget_limit,
                        usage.system_tokens,
                        usage.tool_tokens,
                        usage.window_tokens,
                        usage.messages_removed
                    )
                    .dimmed()
                );
            }
        }
        AgentEvent::Complete { usage } => {
            println!();
            println!(
                "{}",
                format!(
                    "📊 Tokens: prompt={}, completion={}, total={}",
                    usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
                )
                .dimmed()
            );
        }
        AgentEvent::Error { message } => {
            println!();
            println!("{}", format!("❌ Error: {}", message).red());
        }
    }
}
