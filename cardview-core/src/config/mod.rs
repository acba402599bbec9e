//! Configuration management for cardview.
//!
//! Settings reach a render from four places, lowest precedence first:
//!
//! 1. built-in defaults ([`builtin_defaults`])
//! 2. plugin-wide settings, the `[cards]` table of the TOML file
//! 3. the block's own settings section ([`parse_block_settings`])
//! 4. the device pass, which swaps in `mobilePreset` / `mobileImageHeight`
//!
//! ## Settings (TOML File)
//! Located at `~/.config/cardview/config.toml`:
//! ```toml
//! [cards]
//! preset = "grid"
//! dynamicColumns = true
//!
//! [refresh]
//! debounce_ms = 1000
//!
//! [logging]
//! level = "info"
//! ```

pub mod block;
pub mod effective;
mod settings;

pub use block::{SettingsLayer, merge_layers, parse_block_settings, parse_setting_value};
pub use effective::{
    BooleanDisplay, ColumnStrategy, DeviceClass, EffectiveSettings, ImageFit, KanbanSettings,
    LayoutParams, Preset, PresetDefaults, ScrollBehavior, ViewMode, builtin_defaults, merge,
    normalize_length,
};
pub use settings::{LoggingSettings, RefreshSettings, Settings, SettingsError};

/// Load .env file if it exists (for development convenience).
pub fn load_dotenv() {
    let _ = dotenvy::dotenv();
}
