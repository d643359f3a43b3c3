mod config;
mod key_render;
mod scripts;
mod store;

pub use config::RedisConfig;
pub use store::RedisStateStore;
