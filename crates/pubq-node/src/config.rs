use pubq_core::{DeliveryOrder, KeyLayout, Timestamp};

use crate::dispatch::DispatchArgs;
use crate::lease::LeaseArgs;
use crate::sweep::{SweepArgs, DEFAULT_SWEEP_BATCH};

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Prefix shared by every store key.
    pub key_prefix: String,
    /// Delivery order applied by dispatch.
    pub delivery_order: DeliveryOrder,
    /// Maximum backlog entries moved per dispatch.
    pub dispatch_depth: usize,
    /// Maximum messages handed out per lease.
    pub lease_batch_size: usize,
    /// Tracking-list entries examined per expiry sweep.
    pub sweep_batch_size: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            key_prefix: "pubq".to_string(),
            delivery_order: DeliveryOrder::Fifo,
            dispatch_depth: 100,
            lease_batch_size: 50,
            sweep_batch_size: DEFAULT_SWEEP_BATCH,
        }
    }
}

impl BrokerConfig {
    pub fn layout(&self) -> KeyLayout {
        KeyLayout::new(self.key_prefix.clone())
    }

    pub fn dispatch_args(&self) -> DispatchArgs {
        DispatchArgs {
            order: self.delivery_order,
            max_depth: self.dispatch_depth,
        }
    }

    pub fn lease_args(&self, now: &Timestamp) -> LeaseArgs {
        LeaseArgs {
            max_batch_size: self.lease_batch_size,
            now: now.clone(),
        }
    }

    pub fn sweep_args(&self, now: &Timestamp) -> SweepArgs {
        SweepArgs {
            now: now.clone(),
            batch_size: self.sweep_batch_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use pubq_core::{DeliveryOrder, Timestamp};

    use super::BrokerConfig;

    #[test]
    fn args_reflect_config_fields() {
        let cfg = BrokerConfig {
            key_prefix: "x".to_string(),
            delivery_order: DeliveryOrder::Lifo,
            dispatch_depth: 7,
            lease_batch_size: 3,
            sweep_batch_size: 9,
        };
        let now = Timestamp::new("2024-05-01T10:00:00.000000");

        let d = cfg.dispatch_args();
        assert_eq!(d.order, DeliveryOrder::Lifo);
        assert_eq!(d.max_depth, 7);
        assert_eq!(cfg.lease_args(&now).max_batch_size, 3);
        assert_eq!(cfg.sweep_args(&now).batch_size, 9);
        assert_eq!(cfg.layout().prefix(), "x");
    }

    #[test]
    fn default_sweep_batch_is_500() {
        assert_eq!(BrokerConfig::default().sweep_batch_size, 500);
    }
}
