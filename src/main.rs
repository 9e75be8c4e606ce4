// src/main.rs

use std::{sync::Arc, time::Duration};

use quiz_engine::config::Config;
use quiz_engine::db;
use quiz_engine::quiz::{AttemptService, EngineSettings};
use quiz_engine::routes;
use quiz_engine::state::AppState;
use quiz_engine::store::{EnrollmentGate, SqlProgressStore, SqlQuestionBank};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration from environment (.env included)
    let config = Config::from_env()?;

    let file_appender = tracing_appender::rolling::daily("logs", "quiz-engine.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::new(&config.rust_log);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    // Initialize Tracing (Logging)
    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    // Initialize Database Pool with Retry
    let mut retry_count = 0;
    let pool = loop {
        match db::connect(&config.database_url).await {
            Ok(pool) => break pool,
            Err(e) => {
                retry_count += 1;
                if retry_count > 5 {
                    tracing::error!("Failed to open database after 5 retries: {}", e);
                    return Err(e.into());
                }
                tracing::warn!("Database not ready, retrying in 2s... (Attempt {})", retry_count);
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    };

    tracing::info!("Database connected...");

    // Run Migrations Automatically
    tracing::info!("Running migrations...");
    db::MIGRATOR.run(&pool).await?;
    tracing::info!("Migrations applied successfully.");

    let attempts = Arc::new(AttemptService::new(
        Arc::new(SqlQuestionBank::new(pool.clone())),
        Arc::new(SqlProgressStore::new(pool.clone(), config.progress_policy)),
        Arc::new(EnrollmentGate::new(pool.clone())),
        EngineSettings::from(&config),
    ));
    tracing::info!(
        "Course progress policy: {}",
        config.progress_policy.as_str()
    );
    let reaper = attempts.spawn_reaper();
    if let Some(idle) = config.session_idle_timeout {
        tracing::info!("Idle untimed attempts are released after {:?}", idle);
    }

    let state = AppState {
        attempts: attempts.clone(),
        config: config.clone(),
    };

    // Create the Axum application router
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!("Listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutdown signal received");
        })
        .await?;

    drop(reaper);
    attempts.shutdown();
    pool.close().await;
    tracing::info!("Shut down cleanly.");

    Ok(())
}
