//! Application builder and lifecycle: compose the sync engine with the read
//! API, own the background context, and shut both down on signal.

use crate::api::{self, AppState};
use crate::config::{Config, SourceType, StorageType};
use crate::error::{Error, Result};
use crate::sources::SourceHandlerFactory;
use crate::status::{DbStatusStore, FileStatusStore, StatusStore};
use crate::storage::{self, BulkWriter, RegistryWriter};
use crate::sync::{SyncCoordinator, SyncManager};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub struct App {
    config: Arc<Config>,
    coordinator: SyncCoordinator,
    state: AppState,
}

impl App {
    /// Wire up pool, sources, stores, manager and coordinator from a
    /// validated configuration.
    pub async fn build(config: Config) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);

        let pool = storage::connect_pool(&config.database).await?;
        storage::ensure_registry(
            &pool,
            &config.registry_name,
            &config.source.source_type.to_string(),
        )
        .await?;

        // The cluster client is only constructed when a kubernetes-backed
        // source actually needs it.
        let kube = match config.source.source_type {
            SourceType::Configmap | SourceType::Kubernetes => {
                Some(kube::Client::try_default().await?)
            }
            _ => None,
        };

        let factory = Arc::new(SourceHandlerFactory::new(kube)?);
        let writer: Arc<dyn RegistryWriter> = Arc::new(BulkWriter::new(pool.clone()));
        let manager = Arc::new(SyncManager::new(factory, writer));

        let store: Arc<dyn StatusStore> = match config.storage.storage_type {
            StorageType::File => Arc::new(FileStatusStore::new(&config.storage.status_file)),
            StorageType::Database => Arc::new(DbStatusStore::new(pool.clone())),
        };

        let coordinator = SyncCoordinator::new(config.clone(), manager, store).await?;

        let state = AppState {
            pool,
            registry_name: Arc::from(config.registry_name.as_str()),
            status: coordinator.status_handle(),
            manual_sync: coordinator.manual_trigger(),
        };

        Ok(Self {
            config,
            coordinator,
            state,
        })
    }

    /// Run the coordinator and the read API until SIGINT/SIGTERM, then
    /// cancel the background task and wait for it to exit.
    pub async fn run(self) -> Result<()> {
        let cancel = CancellationToken::new();
        let coordinator_task = tokio::spawn(self.coordinator.run(cancel.child_token()));

        let router = api::build_router(self.state);
        let addr = format!("{}:{}", self.config.server.host, self.config.server.port)
            .parse::<SocketAddr>()
            .map_err(|e| Error::Config(format!("Invalid address: {}", e)))?;

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Server(format!("Failed to bind: {}", e)))?;

        info!("read API listening on {}", addr);

        let shutdown = cancel.clone();
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown_signal().await;
                info!("shutdown signal received");
                shutdown.cancel();
            })
            .await
            .map_err(|e| Error::Server(format!("Server error: {}", e)))?;

        // cancel-then-wait: no detached background work survives run()
        cancel.cancel();
        if let Err(err) = coordinator_task.await {
            error!(%err, "sync coordinator task panicked");
        }

        info!("mcpsync stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => error!(%err, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
