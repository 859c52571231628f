use std::sync::Arc;

use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};
use tracing_subscriber::EnvFilter;

use gym_booking::config::{Settings, StorageKind};
use gym_booking::db_migrate::{MigrationTool, SCHEMA_VERSION};
use gym_booking::memory_store::MemoryStore;
use gym_booking::server;
use gym_booking::state::StoreStateManager;
use gym_booking::{BookingStore, ScyllaConnector};

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    tracing::info!("Starting gym booking node");

    let settings = Settings::from_env()?;

    let store: Arc<dyn BookingStore> = match settings.storage {
        StorageKind::Scylla => {
            let db = ScyllaConnector::new(
                &settings.scylla_nodes,
                &settings.keyspace,
                settings.scylla_credentials.clone(),
            )
            .await?;
            MigrationTool::new(settings.keyspace.clone(), settings.schema_path.clone())
                .migrate_to_version(db.session(), settings.replication_factor, SCHEMA_VERSION)
                .await?;
            Arc::new(db)
        }
        StorageKind::Memory => {
            tracing::warn!("Using in-memory storage; reservations are lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    // Initialize state manager
    let state_manager = Arc::new(StoreStateManager::from_settings(store, &settings));
    let state_data = web::Data::new(state_manager);

    tracing::info!(
        "Starting HTTP server on {} (time zone {})",
        settings.bind_addr,
        settings.time_zone
    );
    let server = HttpServer::new(move || {
        App::new()
            .app_data(state_data.clone())
            .wrap(Logger::default())
            .configure(server::configure)
    })
    .bind(&settings.bind_addr)?
    .run();

    // Wait for server to finish
    server.await?;

    Ok(())
}
