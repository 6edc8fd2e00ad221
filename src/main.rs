use std::sync::Arc;

use anyhow::Context;
use futures::StreamExt;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use intake_bot::ai::{AiResponder, BusinessProfile, LlmConfig, OpenAiReplyGenerator};
use intake_bot::channels::{Channel, CliChannel, ZapiChannel, ZapiConfig};
use intake_bot::cleanup::spawn_cleanup_tasks;
use intake_bot::clock::{Clock, SystemClock};
use intake_bot::config::{BotConfig, ChannelKind, ConversationMode, ServerConfig};
use intake_bot::dispatch::Dispatcher;
use intake_bot::server::bot_routes;
use intake_bot::session::{PauseStore, SessionStore};
use intake_bot::store::LibSqlBackend;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    let server_config = ServerConfig::from_env()?;
    let bot_config = BotConfig::from_env()?;

    // Held for the life of the process so buffered log lines get flushed.
    let _log_guard = init_tracing(&server_config);

    eprintln!("🛋️  Intake Bot v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Business: {}", bot_config.business_name);
    eprintln!("   Flow: {}", bot_config.flow);

    // ── Database ─────────────────────────────────────────────────────────
    let db = Arc::new(
        LibSqlBackend::new_local(&server_config.db_path)
            .await
            .with_context(|| {
                format!("Failed to open database at {}", server_config.db_path.display())
            })?,
    );
    eprintln!("   Database: {}", server_config.db_path.display());

    // ── Channel ──────────────────────────────────────────────────────────
    let channel: Arc<dyn Channel> = match server_config.channel {
        ChannelKind::Whatsapp => Arc::new(ZapiChannel::new(ZapiConfig::from_env()?)),
        ChannelKind::Cli => Arc::new(CliChannel::default()),
    };

    // ── Engine ───────────────────────────────────────────────────────────
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let pauses = Arc::new(PauseStore::new(db.clone(), clock.clone()));
    let sessions = Arc::new(SessionStore::new(clock.clone(), bot_config.history_limit));

    let mut dispatcher = Dispatcher::new(
        bot_config.clone(),
        pauses.clone(),
        sessions.clone(),
        channel.clone(),
        db.clone(),
        clock,
    );

    if bot_config.mode == ConversationMode::Ai {
        match LlmConfig::from_env() {
            Ok(llm_config) => {
                let business = BusinessProfile {
                    name: bot_config.business_name.clone(),
                    phone: bot_config.business_phone.clone(),
                    ..BusinessProfile::default()
                };
                let generator = OpenAiReplyGenerator::from_config(&llm_config, &business)?;
                eprintln!("   Mode: ai ({})", llm_config.model);
                dispatcher = dispatcher.with_ai(AiResponder::new(
                    Arc::new(generator),
                    bot_config.collaborator_timeout,
                    bot_config.ai_min_messages,
                    bot_config.business_phone.clone(),
                ));
            }
            Err(e) => {
                tracing::warn!(error = %e, "AI mode requested but not configured, using menus");
                eprintln!("   Mode: menu (AI not configured: {e})");
            }
        }
    } else {
        eprintln!("   Mode: menu");
    }
    let dispatcher = Arc::new(dispatcher);

    let cleanup = spawn_cleanup_tasks(
        pauses,
        sessions,
        bot_config.pause_sweep_interval,
        bot_config.session_sweep_interval,
        bot_config.session_ttl,
    );

    match server_config.channel {
        ChannelKind::Cli => {
            eprintln!("   Type a message and press Enter. Prefix with '!op ' to act as the operator.\n");
            let mut events = channel.start().await?;
            while let Some(event) = events.next().await {
                let outcome = dispatcher.dispatch(event).await;
                tracing::debug!(?outcome, "Dispatched");
            }
        }
        ChannelKind::Whatsapp => {
            let app = bot_routes(dispatcher, db);
            let listener = tokio::net::TcpListener::bind(("0.0.0.0", server_config.port))
                .await
                .with_context(|| format!("Failed to bind port {}", server_config.port))?;
            eprintln!(
                "   Webhook: http://0.0.0.0:{}/api/bot/webhook\n",
                server_config.port
            );
            tracing::info!(port = server_config.port, "HTTP server started");
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    tokio::signal::ctrl_c().await.ok();
                })
                .await?;
        }
    }

    cleanup.abort();
    tracing::info!("Shut down");
    Ok(())
}

/// Stderr logging, plus a daily-rolling file when a log directory is set.
fn init_tracing(config: &ServerConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("intake_bot=info"));

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "intake-bot.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .init();

    guard
}
