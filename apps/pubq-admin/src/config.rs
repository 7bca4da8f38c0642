use config::{Config, ConfigError, Environment, File};
use pubq_core::DeliveryOrder;
use pubq_node::BrokerConfig;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct AdminConfig {
    pub state_path: PathBuf,
    pub key_prefix: String,
    pub delivery_order: DeliveryOrder,
    pub dispatch_depth: usize,
    pub lease_batch_size: usize,
    pub sweep_batch_size: usize,
    /// Leases older than this are handed back by `reclaim`.
    #[serde(with = "humantime_serde")]
    pub lease_timeout: Duration,
    /// Lifetime given to published messages without an explicit ttl.
    #[serde(with = "humantime_serde")]
    pub default_ttl: Duration,
}

impl AdminConfig {
    pub fn new(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("state_path", "data/pubq-state.cbor")?
            .set_default("key_prefix", "pubq")?
            .set_default("delivery_order", "fifo")?
            .set_default("dispatch_depth", 100)?
            .set_default("lease_batch_size", 50)?
            .set_default("sweep_batch_size", 500)?
            .set_default("lease_timeout", "5m")?
            .set_default("default_ttl", "24h")?;

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path));
        }

        builder = builder.add_source(Environment::with_prefix("PUBQ").try_parsing(true));

        builder.build()?.try_deserialize()
    }

    pub fn broker_config(&self) -> BrokerConfig {
        BrokerConfig {
            key_prefix: self.key_prefix.clone(),
            delivery_order: self.delivery_order,
            dispatch_depth: self.dispatch_depth,
            lease_batch_size: self.lease_batch_size,
            sweep_batch_size: self.sweep_batch_size,
        }
    }
}
