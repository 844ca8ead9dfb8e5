use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::sync::Notify;

use rfp_desk::api::{ApiState, api_routes};
use rfp_desk::config::Config;
use rfp_desk::mailbox::{ImapMailbox, Mailbox};
use rfp_desk::outbound::Mailer;
use rfp_desk::pipeline::ingest::{Ingestor, spawn_ingest_loop};
use rfp_desk::store::{Database, LibSqlBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = Config::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });

    eprintln!("📨 RFP Desk v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   API: http://{}/api/health", config.bind_addr);

    // ── Database ─────────────────────────────────────────────────────────
    let db_path = std::path::Path::new(&config.db_path);
    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_local(db_path).await.unwrap_or_else(
        |e| {
            eprintln!("Error: Failed to open database at {}: {}", config.db_path, e);
            std::process::exit(1);
        },
    ));
    eprintln!("   Database: {}", config.db_path);

    // ── Outbound mail ────────────────────────────────────────────────────
    let mailer = match config.smtp.clone() {
        Some(smtp) => {
            eprintln!("   SMTP: {} (from {})", smtp.host, smtp.from_address);
            Some(Arc::new(Mailer::new(smtp)))
        }
        None => {
            eprintln!("   SMTP: disabled (set MAIL_SMTP_HOST to enable)");
            None
        }
    };

    // ── Ingestion loop ───────────────────────────────────────────────────
    let wake = Arc::new(Notify::new());
    let ingest_task = match config.mailbox.clone() {
        Some(mailbox_config) => {
            eprintln!(
                "   IMAP: {} folder {} (poll every {}s)",
                mailbox_config.host, mailbox_config.folder, config.poll_interval_secs
            );
            let mailbox: Arc<dyn Mailbox> = Arc::new(ImapMailbox::new(mailbox_config));
            let ingestor = Arc::new(Ingestor::new(mailbox, Arc::clone(&db)));
            Some(spawn_ingest_loop(
                ingestor,
                Duration::from_secs(config.poll_interval_secs),
                Arc::clone(&wake),
            ))
        }
        None => {
            eprintln!("   IMAP: disabled (set MAIL_IMAP_HOST to enable)");
            None
        }
    };
    eprintln!();

    // ── HTTP API ─────────────────────────────────────────────────────────
    let app = api_routes(ApiState {
        db: Arc::clone(&db),
        mailer,
        wake: Arc::clone(&wake),
    });
    let bind_addr = config.bind_addr.clone();
    tokio::spawn(async move {
        let listener = tokio::net::TcpListener::bind(&bind_addr)
            .await
            .expect("Failed to bind API port");
        tracing::info!(addr = %bind_addr, "API server started");
        axum::serve(listener, app).await.ok();
    });

    // Run until interrupted. An in-flight poll is abandoned; the next start
    // resumes from the checkpoint.
    tokio::signal::ctrl_c().await?;
    eprintln!("\nShutting down");

    if let Some((handle, shutdown)) = ingest_task {
        shutdown.store(true, Ordering::Relaxed);
        wake.notify_one();
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }

    Ok(())
}
