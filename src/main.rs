use anyhow::Context;
use candidate_intake::{
    config::{get_config, init_config, BlobBackend, LogFormat, StoreBackend},
    database::pool::create_pool,
    routes,
    services::sync_service::spawn_connectivity_probe,
    store::{
        http::{HttpBlobStore, RetryPolicy},
        local_fs::LocalBlobStore,
        memory::{MemoryBlobStore, MemoryDocumentStore},
        postgres::PgDocumentStore,
        BlobStore, DocumentStore,
    },
    AppState,
};
use reqwest::Client;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_config()?;
    let config = get_config();
    init_tracing(config.log_format);

    let store: Arc<dyn DocumentStore> = match config.store_backend {
        StoreBackend::Memory => {
            tracing::warn!("using in-memory document store; data is lost on restart");
            Arc::new(MemoryDocumentStore::new())
        }
        StoreBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL is not set")?;
            let pool = create_pool(url).await?;
            sqlx::migrate!("./migrations").run(&pool).await?;
            let pg = PgDocumentStore::new(pool);
            pg.spawn_listener(Duration::from_secs(5));
            Arc::new(pg)
        }
    };

    let blobs: Arc<dyn BlobStore> = match config.blob_backend {
        BlobBackend::Memory => Arc::new(MemoryBlobStore::new()),
        BlobBackend::Local => {
            tokio::fs::create_dir_all(&config.uploads_dir).await?;
            Arc::new(LocalBlobStore::new(&config.uploads_dir, &config.public_base_url))
        }
        BlobBackend::Http => {
            let base_url = config
                .blob_http_url
                .as_deref()
                .context("BLOB_HTTP_URL is not set")?;
            let client = Client::builder().timeout(Duration::from_secs(60)).build()?;
            Arc::new(HttpBlobStore::new(
                client,
                base_url,
                config.blob_http_token.clone(),
                RetryPolicy::default(),
            ))
        }
    };

    let app_state = AppState::new(config, store.clone(), blobs);

    let (network, _probe) = spawn_connectivity_probe(store, config.connectivity_probe_interval());
    let _sync = app_state.sync_monitor.spawn(network);

    let mut app = routes::build_router(app_state);
    if config.blob_backend == BlobBackend::Local {
        info!("Serving uploads from: {}", config.uploads_dir);
        app = app.nest_service(
            "/uploads",
            tower_http::services::ServeDir::new(&config.uploads_dir),
        );
    }

    let addr: SocketAddr = config.server_address.parse()?;
    info!("Server listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
