use dashmap::DashMap;
use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use super::identifiers::{validate_datasource_name, IdentifierError};
use crate::config::DatasourceSettings;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug, Clone)]
pub enum DatasourceError {
    #[error("Datasource '{0}' is not registered")]
    Unknown(String),
    #[error("Datasource '{name}' is unavailable: {reason}")]
    Unavailable { name: String, reason: String },
    #[error("Invalid datasource name: {0}")]
    InvalidName(#[from] IdentifierError),
}

impl DatasourceError {
    /// True for every failure that means "this datasource cannot be used right now",
    /// which callers report per datasource rather than as a generic fault.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            DatasourceError::Unknown(_) | DatasourceError::Unavailable { .. }
        )
    }
}

pub type ConnectFuture = Pin<Box<dyn Future<Output = Result<DatabaseConnection, DbErr>> + Send>>;

/// Opens a pool for one datasource's settings.
pub type Connector = Arc<dyn Fn(&DatasourceSettings) -> ConnectFuture + Send + Sync>;

fn sea_orm_connector() -> Connector {
    Arc::new(|settings: &DatasourceSettings| -> ConnectFuture {
        let mut opt = ConnectOptions::new(settings.url.to_owned());
        opt.max_connections(settings.max_connections)
            .connect_timeout(CONNECT_TIMEOUT);
        Box::pin(Database::connect(opt))
    })
}

/// Resolves logical datasource names to pooled connections.
///
/// Each name owns a single `OnceCell`, so concurrent first use of the same
/// name opens exactly one pool and every caller shares it.
pub struct DatasourceRouter {
    registry: HashMap<String, DatasourceSettings>,
    handles: DashMap<String, Arc<OnceCell<Arc<DatabaseConnection>>>>,
    connector: Connector,
}

impl DatasourceRouter {
    pub fn new(registry: HashMap<String, DatasourceSettings>) -> Self {
        Self::with_connector(registry, sea_orm_connector())
    }

    pub fn with_connector(
        registry: HashMap<String, DatasourceSettings>,
        connector: Connector,
    ) -> Self {
        Self {
            registry,
            handles: DashMap::new(),
            connector,
        }
    }

    /// Makes an already-open connection resolvable under `name`.
    pub fn register_connection(&self, name: &str, connection: DatabaseConnection) {
        self.handles.insert(
            name.to_string(),
            Arc::new(OnceCell::new_with(Some(Arc::new(connection)))),
        );
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: BTreeSet<String> = self.registry.keys().cloned().collect();
        names.extend(self.handles.iter().map(|entry| entry.key().clone()));
        names.into_iter().collect()
    }

    pub async fn resolve(&self, name: &str) -> Result<Arc<DatabaseConnection>, DatasourceError> {
        validate_datasource_name(name)?;

        // Clone the cell out of the map so no shard lock is held across the connect.
        let cell = match self.handles.get(name) {
            Some(cell) => cell.clone(),
            None => {
                if !self.registry.contains_key(name) {
                    return Err(DatasourceError::Unknown(name.to_string()));
                }
                self.handles
                    .entry(name.to_string())
                    .or_insert_with(|| Arc::new(OnceCell::new()))
                    .clone()
            }
        };

        let connection = cell
            .get_or_try_init(|| self.connect(name))
            .await?;
        Ok(connection.clone())
    }

    /// Resolves the datasource and pings it.
    pub async fn is_available(&self, name: &str) -> bool {
        match self.resolve(name).await {
            Ok(connection) => match connection.ping().await {
                Ok(()) => true,
                Err(e) => {
                    warn!(datasource = %name, error = %e, "Datasource ping failed.");
                    false
                }
            },
            Err(e) => {
                warn!(datasource = %name, error = %e, "Datasource is not available.");
                false
            }
        }
    }

    async fn connect(&self, name: &str) -> Result<Arc<DatabaseConnection>, DatasourceError> {
        let settings = self
            .registry
            .get(name)
            .ok_or_else(|| DatasourceError::Unknown(name.to_string()))?;

        match (self.connector)(settings).await {
            Ok(connection) => {
                info!(
                    datasource = %name,
                    max_connections = settings.max_connections,
                    "Opened datasource connection pool."
                );
                Ok(Arc::new(connection))
            }
            Err(e) => Err(DatasourceError::Unavailable {
                name: name.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}
