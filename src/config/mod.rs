mod app_config;

pub use app_config::{
    AppConfig, AuthConfig, DatabaseConfig, ObjectStoreConfig, StorageConfig,
    DEV_JWT_SECRET,
};
