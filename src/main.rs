use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, info, warn};
use tracing_subscriber::fmt::format::FmtSpan;

use mashups_trust::{
    AuditDispatcher, AuditLogger, Clock, InMemoryInviteLedger, InMemoryRightsCatalog,
    RateLimiter, SecurityMiddlewareConfig, SecurityState, SystemClock, TrustApiState, TrustConfig,
    create_app,
};

/// Buffered audit events before new ones are dropped
const AUDIT_CHANNEL_CAPACITY: usize = 4096;

/// How often elapsed rate-limit buckets are evicted
const RATE_LIMIT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first - this validates all security requirements
    let config = TrustConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {:#}", e);
        eprintln!("Please check MASHUPS_* environment variables.");
        e
    })?;

    init_secure_logging(&config)?;

    info!("Starting Mashups trust service");
    if config.secrets.using_dev_default {
        warn!("Attribution links are signed with the development secret");
    }
    if config.webhook_ring().is_none() {
        warn!("No webhook secret configured; billing webhooks will be rejected");
    }
    info!(
        "Attribution ring: {} secret(s); share TTL {}s, referral TTL {}d",
        config.attribution_ring().len(),
        config.links.share_ttl_secs,
        config.links.referral_ttl_days
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let catalog = match &config.server.rights_catalog_path {
        Some(path) => InMemoryRightsCatalog::load_json(path)?,
        None => InMemoryRightsCatalog::new(),
    };

    // Audit pipeline: handlers never wait on it
    let audit_logger = Arc::new(AuditLogger::new());
    let (audit, _audit_task) = AuditDispatcher::spawn(audit_logger, AUDIT_CHANNEL_CAPACITY);

    let rate_limiter = RateLimiter::in_memory(clock.clone());
    spawn_rate_limit_cleanup(rate_limiter.clone());

    let state = TrustApiState::from_config(
        &config,
        Arc::new(catalog),
        rate_limiter,
        Arc::new(InMemoryInviteLedger::new()),
        Arc::new(audit),
        clock,
    );
    let security_state = SecurityState::new(SecurityMiddlewareConfig::from(&config));
    let app = create_app(state, security_state);

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;

    info!("Mashups trust service listening on {}", bind_addr);
    info!(
        "Rate limits: share {}/{}s, referral {}/{}s; max body {}KB",
        config.rate_limits.share.limit,
        config.rate_limits.share.window_secs,
        config.rate_limits.referral.limit,
        config.rate_limits.referral.window_secs,
        config.security.max_request_size / 1024
    );

    // Serve with connect info for client IP extraction
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Initialize secure logging with sanitization
fn init_secure_logging(config: &TrustConfig) -> Result<()> {
    let log_level = match config.logging.level.to_lowercase().as_str() {
        "error" => Level::ERROR,
        "warn" => Level::WARN,
        "info" => Level::INFO,
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_span_events(if config.logging.log_requests {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        })
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    if config.logging.sanitize_logs {
        info!("Secure logging initialized with data sanitization enabled");
    }

    Ok(())
}

/// Periodically evict elapsed rate-limit buckets
fn spawn_rate_limit_cleanup(rate_limiter: RateLimiter) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(RATE_LIMIT_CLEANUP_INTERVAL);
        loop {
            interval.tick().await;
            let evicted = rate_limiter.cleanup();
            if evicted > 0 {
                tracing::debug!("Evicted {} rate-limit bucket(s)", evicted);
            }
        }
    });
}
