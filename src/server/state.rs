use std::sync::Arc;

use crate::config::Config;
use crate::data::DataSource;
use crate::error::AppError;
use crate::server::auth::TokenValidator;
use crate::store::ObjectStore;

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub config: Config,
    pub store: ObjectStore,
    pub source: DataSource,
    pub auth: TokenValidator,
}

impl AppState {
    /// Build state from configuration, loading the object store.
    pub async fn new(config: Config) -> Result<SharedState, AppError> {
        let store = ObjectStore::open(config.store_backend()).await?;
        let source = config.data_source();
        let auth = TokenValidator::from_config(&config);

        Ok(Arc::new(Self {
            config,
            store,
            source,
            auth,
        }))
    }
}
