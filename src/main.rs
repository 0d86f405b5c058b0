use anyhow::Context;
use petfarm::catalog::{self, ConfigCache};
use petfarm::economy::EconomyEngine;
use petfarm::guard::{ActionGuard, InMemoryGuard, RedisGuard};
use petfarm::{api, config::Config, db::init_db, Repository};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(config).await {
        eprintln!("Fatal: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    let pool = init_db(&config.database_path)
        .await
        .with_context(|| format!("failed to initialize database at {}", config.database_path))?;
    let repo = Arc::new(Repository::new(pool));

    if let Some(path) = &config.game_config_path {
        let seeded = seed_game_config(&repo, path).await?;
        tracing::info!(documents = seeded, path = %path, "Seeded game config");
    }

    let config_cache = Arc::new(ConfigCache::default());
    config_cache
        .refresh(&repo)
        .await
        .context("failed to load game config")?;
    if config_cache.snapshot().farm_rate().is_err() {
        tracing::warn!("farm_data config missing; economy actions will fail until it is added");
    }
    config_cache
        .clone()
        .spawn_refresh(repo.clone(), config.config_refresh);

    let guard: Arc<dyn ActionGuard> = match &config.redis_url {
        Some(url) => {
            tracing::info!("Using Redis action guard");
            Arc::new(RedisGuard::new(url).context("invalid REDIS_URL")?)
        }
        None => {
            tracing::info!("Using in-process action guard");
            Arc::new(InMemoryGuard::new())
        }
    };

    let engine = Arc::new(EconomyEngine::new(
        repo.clone(),
        guard,
        config_cache.clone(),
        config.economy_rules(),
    ));

    let app = api::create_router(api::AppState::new(repo, engine, config_cache));

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;

    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

async fn seed_game_config(repo: &Repository, path: &str) -> anyhow::Result<usize> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read GAME_CONFIG_PATH {}", path))?;
    let documents = catalog::parse_seed(&raw).context("invalid game config seed")?;

    for (config_type, body) in &documents {
        repo.upsert_config_document(config_type, body)
            .await
            .with_context(|| format!("failed to store config document {}", config_type))?;
    }
    Ok(documents.len())
}
