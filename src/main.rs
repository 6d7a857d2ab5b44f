mod commands;
mod console;
mod executors;
mod gateway;

use belt_core::{
    action::Contact,
    config::{self, MemoryBackend},
    message::ChatContext,
    traits::{Channel, Provider},
};
use belt_memory::{InMemorySessions, Store};
use belt_providers::anthropic::AnthropicProvider;
use clap::{Parser, Subcommand};
use console::ConsoleChannel;
use gateway::{Gateway, Storage};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser)]
#[command(
    name = "belt",
    version,
    about = "Belt: turns a free-text request into one confirmed, tracked action"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file.
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive session on the terminal.
    Chat {
        #[arg(short, long, default_value = "console")]
        user: String,
    },
    /// Handle one request and wait for any call it started.
    Ask {
        #[arg(short, long, default_value = "console")]
        user: String,
        /// Treat the request as already confirmed.
        #[arg(long)]
        yes: bool,
        /// The request.
        #[arg(trailing_var_arg = true)]
        message: Vec<String>,
    },
    /// Check configuration and provider availability.
    Status,
    /// Add or update a contact.
    Contact {
        #[arg(short, long, default_value = "console")]
        user: String,
        name: String,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
    /// Show recent calls.
    Calls {
        #[arg(short, long, default_value = "console")]
        user: String,
        #[arg(short, long, default_value_t = 10)]
        limit: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load(&cli.config)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.belt.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Chat { user } => {
            let console: Arc<dyn Channel> = Arc::new(ConsoleChannel::new(&user));
            let gw = Arc::new(build_gateway(&cfg, console).await?);
            println!("{} is klaar. Typ /help voor uitleg, 'exit' om te stoppen.\n", cfg.belt.name);
            gw.run().await?;
        }
        Commands::Ask { user, yes, message } => {
            if message.is_empty() {
                anyhow::bail!("no message provided. Usage: belt ask <message>");
            }
            let text = message.join(" ");
            let console: Arc<dyn Channel> = Arc::new(ConsoleChannel::new(&user));
            let gw = build_gateway(&cfg, console).await?;

            let chat = ChatContext::new(console::CHANNEL_NAME, &user);
            let reply = gw.handle_user_text(&user, &chat, &text, yes).await;
            println!("{}", reply.text);
            for followup in &reply.followups {
                println!("{followup}");
            }

            while gw.active_calls().await > 0 {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                    _ = tokio::signal::ctrl_c() => {
                        info!("Interrupted while waiting for call updates");
                        break;
                    }
                }
            }
            gw.shutdown().await;
        }
        Commands::Status => {
            println!("{} status\n", cfg.belt.name);
            println!("Config: {}", cli.config);
            println!("Data dir: {}", config::shellexpand(&cfg.belt.data_dir));
            println!("Timezone: {}", cfg.belt.timezone);
            println!("Default provider: {}", cfg.provider.default);
            match build_provider(&cfg) {
                Ok(provider) => println!(
                    "  {}: {}",
                    provider.name(),
                    if provider.is_available().await {
                        "available"
                    } else {
                        "missing API key"
                    }
                ),
                Err(e) => println!("  {e}"),
            }
            println!();
            println!("Memory backend: {:?}", cfg.memory.backend);
            if cfg.memory.backend == MemoryBackend::Sqlite {
                println!("  database: {}", config::shellexpand(&cfg.memory.db_path));
            }
            println!(
                "Voice: {} retries ({}-{}ms backoff), poll every {}s up to {} times",
                cfg.voice.max_retries,
                cfg.voice.retry_base_delay_ms,
                cfg.voice.retry_max_delay_ms,
                cfg.voice.poll_interval_secs,
                cfg.voice.poll_max_attempts
            );
            println!("Executors: not configured");
        }
        Commands::Contact {
            user,
            name,
            phone,
            email,
        } => {
            let store = open_store(&cfg).await?;
            store
                .add_contact(&user, &Contact { name: name.clone(), phone, email })
                .await?;
            println!("Contact {name} saved for {user}.");
        }
        Commands::Calls { user, limit } => {
            let store = open_store(&cfg).await?;
            let calls = store.recent_calls(&user, limit).await?;
            if calls.is_empty() {
                println!("No calls for {user}.");
            }
            for call in calls {
                println!(
                    "{}  {}  {}  ({} attempt(s)){}",
                    call.call_id,
                    call.phone,
                    call.status.label(),
                    call.attempts,
                    call.ended_reason
                        .map(|r| format!("  [{r}]"))
                        .unwrap_or_default()
                );
                println!("    {}", call.purpose);
                if let Some(summary) = call.summary {
                    println!("    {summary}");
                }
            }
        }
    }

    Ok(())
}

/// Provider, storage and executors wired into a gateway.
async fn build_gateway(cfg: &config::Config, console: Arc<dyn Channel>) -> anyhow::Result<Gateway> {
    let provider = build_provider(cfg)?;
    if !provider.is_available().await {
        warn!(
            "provider '{}' is not available; requests will fall back to clarification",
            provider.name()
        );
    }

    let storage = match cfg.memory.backend {
        MemoryBackend::Sqlite => Storage::from_shared(Arc::new(Store::new(&cfg.memory).await?)),
        MemoryBackend::Memory => Storage::from_shared(Arc::new(InMemorySessions::new())),
    };

    let mut channels: HashMap<String, Arc<dyn Channel>> = HashMap::new();
    channels.insert(console.name().to_string(), console);

    Ok(Gateway::new(
        provider,
        channels,
        executors::unconfigured(),
        storage,
        cfg,
    ))
}

async fn open_store(cfg: &config::Config) -> anyhow::Result<Store> {
    if cfg.memory.backend != MemoryBackend::Sqlite {
        anyhow::bail!("contacts and call history need the sqlite memory backend");
    }
    Ok(Store::new(&cfg.memory).await?)
}

/// Build the configured provider.
fn build_provider(cfg: &config::Config) -> anyhow::Result<Arc<dyn Provider>> {
    match cfg.provider.default.as_str() {
        "anthropic" => {
            let anthropic = cfg.provider.anthropic.clone().unwrap_or_default();
            Ok(Arc::new(AnthropicProvider::from_config(
                anthropic.resolved_api_key(),
                anthropic.model,
            )))
        }
        other => anyhow::bail!("unsupported provider: {other}"),
    }
}
