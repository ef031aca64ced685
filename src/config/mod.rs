mod settings;

pub use settings::{DatabaseSettings, NodeSettings, Settings, SyncSettings};
