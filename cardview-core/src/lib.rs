//! Settings and shared types for cardview.

pub mod alias;
pub mod config;

pub use alias::ColumnAlias;

// Config re-exports
pub use config::{
    DeviceClass,
    EffectiveSettings,
    Settings,
    SettingsError,
    SettingsLayer,
    load_dotenv,
};
