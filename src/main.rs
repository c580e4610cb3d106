use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use courier_gateway::config::ConfigOverrides;
use courier_gateway::{Config, Daemon};

/// Courier - Telegram gateway for streaming LLM chat
#[derive(Parser)]
#[command(name = "courier", version, about)]
struct Cli {
    /// Telegram bot token
    #[arg(long, env = "COURIER_TELEGRAM_TOKEN")]
    telegram_token: Option<String>,

    /// Model API key
    #[arg(long, env = "COURIER_API_KEY")]
    api_key: Option<String>,

    /// Model API base URL
    #[arg(long)]
    api_base_url: Option<String>,

    /// Model name
    #[arg(short, long)]
    model: Option<String>,

    /// Path to the SQLite database file
    #[arg(long)]
    db_path: Option<String>,

    /// Allowed chat id (repeat for several); empty allows all chats
    #[arg(long = "chat-id")]
    chat_id: Vec<i64>,

    /// Conversation idle timeout in seconds; omit for no timeout
    #[arg(long)]
    conversation_timeout: Option<u64>,

    /// Maximum number of history messages sent to the model
    #[arg(long)]
    max_history: Option<u64>,

    /// Minimum milliseconds between streaming message edits
    #[arg(long)]
    edit_throttle_ms: Option<u64>,

    /// File holding the system message
    #[arg(long)]
    system_message_file: Option<String>,

    /// File uploaded to the model as cached context
    #[arg(long)]
    context_file: Option<String>,

    /// File holding the /start greeting
    #[arg(long)]
    start_message_file: Option<String>,

    /// Public webhook URL; omit to use long polling
    #[arg(long)]
    webhook_url: Option<String>,

    /// Address the webhook listener binds to
    #[arg(long)]
    webhook_listen_addr: Option<String>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,courier_gateway=info",
        1 => "info,courier_gateway=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let overrides = ConfigOverrides {
        telegram_token: cli.telegram_token,
        api_key: cli.api_key,
        api_base_url: cli.api_base_url,
        model: cli.model,
        db_path: cli.db_path,
        allowed_chats: cli.chat_id,
        conversation_timeout_secs: cli.conversation_timeout,
        max_history: cli.max_history,
        edit_throttle_ms: cli.edit_throttle_ms,
        system_message_file: cli.system_message_file,
        context_file: cli.context_file,
        start_message_file: cli.start_message_file,
        webhook_url: cli.webhook_url,
        webhook_listen_addr: cli.webhook_listen_addr,
    };

    // Load configuration
    let config = Config::load(&overrides)?;
    tracing::info!(
        model = %config.model.model,
        db_path = %config.db_path.display(),
        "starting courier gateway"
    );

    // Create and run daemon
    let daemon = Daemon::new(config).await?;

    // Run until interrupted
    daemon.run().await?;

    Ok(())
}
