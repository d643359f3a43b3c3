use std::sync::Arc;

use tessera_state::StateStore;
use tessera_state_memory::MemoryStateStore;
use tessera_state_redis::{RedisConfig, RedisStateStore};

use crate::config::StateConfig;
use crate::error::ServerError;

/// Create a state store from the given configuration.
pub fn create_state(config: &StateConfig) -> Result<Arc<dyn StateStore>, ServerError> {
    match config.backend.as_str() {
        "memory" => Ok(Arc::new(MemoryStateStore::new())),
        "redis" => {
            let mut redis_config = RedisConfig::default();
            if let Some(url) = &config.url {
                redis_config.url.clone_from(url);
            }
            if let Some(prefix) = &config.prefix {
                redis_config.prefix.clone_from(prefix);
            }

            let store = RedisStateStore::new(&redis_config)
                .map_err(|e| ServerError::Config(format!("redis state backend: {e}")))?;

            Ok(Arc::new(store))
        }
        other => Err(ServerError::Config(format!(
            "unknown state backend: {other} (expected \"memory\" or \"redis\")"
        ))),
    }
}
