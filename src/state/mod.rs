pub mod alert_store;
pub mod config_manager;
pub mod event_bus;

pub use alert_store::{AlertStore, StoreWrite};
pub use config_manager::{ConfigManager, RuntimeSettings};
pub use event_bus::{AlertEvent, AlertEventBus, SubscriptionId};
