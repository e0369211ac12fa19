use std::io::BufReader;
use std::sync::Arc;

use action_handler::action::{ActionHandler, LocalEventHub};
use action_handler::actions::FindAndReplace;
use action_handler::config::{HandlerConfig, SessionCredentials};
use action_handler::replay;
use action_handler::session::{MemorySession, MemoryStore, Session};
use action_handler::worker::WorkerPool;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

/// Log to stderr, and additionally to a daily rolling file when
/// `ACTION_HANDLER_LOG_DIR` is set. The guard must live until exit.
fn init_tracing() -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    match std::env::var("ACTION_HANDLER_LOG_DIR") {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "action-handler.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
            Some(guard)
        }
        Err(_) => {
            tracing_subscriber::registry().with(filter).with(stderr).init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _log_guard = init_tracing();

    let config = HandlerConfig::from_env()?;
    let credentials = SessionCredentials::from_env().unwrap_or_else(|e| {
        tracing::warn!("{e}; using local credentials");
        SessionCredentials::new("http://localhost", "local", "local")
    });

    eprintln!("Action handler v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Server: {}", credentials.server_url);
    eprintln!("   Workers: {}", config.worker_count);

    // Events from the file given as first argument, or stdin.
    let events = match std::env::args().nth(1) {
        Some(path) => {
            let file = std::fs::File::open(&path)
                .map_err(|e| anyhow::anyhow!("Failed to open {path}: {e}"))?;
            replay::read_events(BufReader::new(file))?
        }
        None => replay::read_events(std::io::stdin().lock())?,
    };

    let store = MemoryStore::new();
    let session: Arc<dyn Session> = Arc::new(MemorySession::new(credentials, store));
    let pool = Arc::new(WorkerPool::new(&config));
    let hub = LocalEventHub::new();

    let inline = ActionHandler::new(
        FindAndReplace::descriptor(),
        Arc::new(FindAndReplace),
        Arc::clone(&session),
    )?;
    Arc::new(inline).register(&hub, &config).await;

    let background_descriptor = FindAndReplace::descriptor();
    let background_descriptor = action_handler::action::ActionDescriptor {
        label: format!("{} (background)", background_descriptor.label),
        identifier: format!("{}.background", background_descriptor.identifier),
        ..background_descriptor
    };
    let background = ActionHandler::new(
        background_descriptor,
        Arc::new(FindAndReplace),
        Arc::clone(&session),
    )?
    .queued(Arc::clone(&pool));
    Arc::new(background).register(&hub, &config).await;

    for event in events {
        let topic = event.topic.clone();
        for reply in hub.publish(event).await {
            println!("{}", serde_json::json!({ "topic": topic, "reply": reply }));
        }
    }

    pool.wait_idle().await;
    let report = pool.shutdown().await;
    for task in &report.unprocessed {
        tracing::warn!(task_id = %task.id, job_id = ?task.job_id, "Task was not processed");
    }

    Ok(())
}
