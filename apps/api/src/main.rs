use std::net::SocketAddr;
use std::sync::Arc;
use studio_api::app::create_app;
use studio_api::auth::AppState;
use studio_api::config::{load_config, save_default_config, Config};
use studio_api::constants::{CONFIG_PATH, DATA_DIR};
use studio_api::database::{create_pool, ensure_photo_columns, init_database, DbPool};
use studio_api::error::AppResult;
use studio_api::logging::{init_logging, install_panic_hook};
use studio_api::processor::{start_workers, DerivativeResolver};
use studio_api::storage::build_storage;
use tracing::{error, info};

fn init_directories(config: &Config) {
    for dir in [&*DATA_DIR, &config.storage.media_root] {
        if let Err(e) = std::fs::create_dir_all(dir) {
            error!("Failed to create {:?}: {}", dir, e);
        }
    }
}

fn init_schema(pool: &DbPool) -> AppResult<()> {
    let conn = pool.get()?;
    init_database(&conn)?;
    ensure_photo_columns(&conn)?;
    Ok(())
}

async fn build_state(config: Arc<Config>) -> AppResult<AppState> {
    let pool = create_pool()?;
    init_schema(&pool)?;

    let storage = build_storage(&config.storage, &config.security.secret_key).await?;
    let resolver = Arc::new(DerivativeResolver::new(
        storage.clone(),
        config.derivatives.clone(),
    ));
    let queue = start_workers(
        pool.clone(),
        Arc::clone(&resolver),
        config.workers.num_workers,
        config.workers.queue_capacity,
    );

    Ok(AppState {
        config,
        pool,
        storage,
        resolver,
        queue: Some(queue),
    })
}

#[tokio::main]
async fn main() {
    if std::env::args().any(|arg| arg == "--init-config") {
        match save_default_config(&CONFIG_PATH) {
            Ok(_) => {
                println!("Default configuration saved to {:?}", *CONFIG_PATH);
                std::process::exit(0);
            }
            Err(e) => {
                eprintln!("Failed to save default configuration: {}", e);
                std::process::exit(1);
            }
        }
    }

    init_logging();
    install_panic_hook();

    let config = Arc::new(load_config(&CONFIG_PATH));
    init_directories(&config);

    let state = match build_state(Arc::clone(&config)).await {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to start: {}", e);
            std::process::exit(1);
        }
    };

    let app = create_app(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], config.server.port)));
    info!(
        "Starting studio API on {} ({:?}, {:?} storage)",
        addr, config.server.environment, config.storage.backend
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind");

    axum::serve(listener, app).await.expect("Server failed");
}
