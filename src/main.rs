use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use aftercare::cache::ResultsCache;
use aftercare::conversation_log::ConversationLogger;
use aftercare::pipeline::IntakeWorkflow;
use aftercare::retrieval::ReferenceIndex;
use aftercare::search::SerpApiClient;
use aftercare::{config::Config, routes::create_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aftercare=debug,tower_http=debug,axum=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!("Configuration loaded: {:?}", config.server);

    // Connect to database
    let pool = aftercare::db::create_pool(&config.database).await?;

    // Run migrations
    info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to run migrations: {}", e))?;
    info!("Database migrations completed");

    // Index reference documents once at startup
    let reference_index = Arc::new(ReferenceIndex::load_dir(&config.reference));
    info!(
        passages = reference_index.passage_count(),
        "Reference index ready"
    );

    let search_client = SerpApiClient::from_config(&config.search);
    if search_client.is_none() {
        info!("No SERP_API_KEY configured, web search fallback disabled");
    }

    let workflow = Arc::new(IntakeWorkflow::new(
        pool.clone(),
        reference_index.clone(),
        search_client,
        &config,
    ));

    // Create shared state
    let state = AppState {
        pool,
        config: config.clone(),
        reference_index,
        workflow,
        results_cache: Arc::new(ResultsCache::new(&config.cache)),
        conversation_logger: Arc::new(ConversationLogger::new(
            config.log.conversation_log_path.clone(),
        )),
    };

    // Create router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    info!("Server listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}
