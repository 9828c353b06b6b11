mod settings;

pub use settings::{
    DatabaseConfig, DistributionConfig, JobsConfig, LogConfig, OtelConfig, RedisConfig,
    ServerConfig, Settings, StoreConfig,
};
