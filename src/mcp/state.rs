//! Server state: the resources every transport shares for the process lifetime.

use std::sync::Arc;

use anyhow::Result;

use super::dispatcher::Dispatcher;
use super::handlers::common::ToolContext;
use super::tools::build_registry;
use crate::config::NexusConfig;
use crate::storage::SqliteStorage;

pub struct ServerState {
    pub sqlite: Arc<SqliteStorage>,
    pub dispatcher: Arc<Dispatcher>,
}

impl ServerState {
    /// Open storage, build the tool registry and the dispatcher.
    ///
    /// A failed migration is logged and tolerated; database tools then fail per call.
    /// A duplicate tool name is the only fatal startup error.
    pub async fn new(config: NexusConfig) -> Result<Self> {
        tracing::info!("Opening SQLite database at {:?}", config.paths.database);
        let sqlite = Arc::new(SqliteStorage::new(&config.paths.database).await?);

        if let Err(e) = sqlite.migrate().await {
            tracing::error!("Database initialization failed: {}", e);
        }

        let ctx = ToolContext::new(&config, Arc::clone(&sqlite))?;
        let registry = build_registry(ctx)?;
        tracing::info!("Tool registry ready ({} tools)", registry.len());

        Ok(Self {
            sqlite,
            dispatcher: Arc::new(Dispatcher::new(Arc::new(registry))),
        })
    }
}
