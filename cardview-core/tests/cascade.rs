//! Settings cascade: built-in defaults, the plugin TOML layer, block
//! settings and the device pass.

use cardview_core::config::{ColumnStrategy, ImageFit, Preset, ViewMode, builtin_defaults, merge, parse_block_settings};
use cardview_core::{DeviceClass, Settings, SettingsLayer};

const PLUGIN_TOML: &str = r#"
[cards]
preset = "portrait"
imageProperty = "poster"
showLabels = false
locale = "fr"
mobilePreset = "compact"
mobileImageHeight = "8rem"
exclude = ["tags"]

[refresh]
debounce_ms = 250
"#;

fn plugin() -> SettingsLayer {
    Settings::from_toml(PLUGIN_TOML).unwrap().cards
}

#[test]
fn plugin_layer_overrides_defaults() {
    let settings = merge(&builtin_defaults(), &plugin(), &SettingsLayer::new(), DeviceClass::Desktop);

    assert_eq!(settings.preset, Preset::Portrait);
    assert_eq!(settings.image_property.as_deref(), Some("poster"));
    assert!(!settings.show_labels);
    assert_eq!(settings.boolean_true_text, "Oui");
    assert_eq!(settings.exclude, vec!["tags".to_string()]);
    assert_eq!(settings.layout.columns, ColumnStrategy::Fixed { columns: 4 });
    assert_eq!(settings.layout.image_height, "300px");
    // untouched keys still come from the defaults
    assert_eq!(settings.date_format, "YYYY-MM-DD");
    assert_eq!(settings.view, ViewMode::Cards);
}

#[test]
fn block_layer_overrides_plugin() {
    let block = parse_block_settings(
        "preset: dense\nshowLabels: true\nexclude: []\nview: kanban\n// imageProperty: ignored\nimageHeight: 10em",
    );
    let settings = merge(&builtin_defaults(), &plugin(), &block, DeviceClass::Desktop);

    assert_eq!(settings.preset, Preset::Dense);
    assert!(settings.show_labels);
    assert!(settings.exclude.is_empty());
    assert_eq!(settings.view, ViewMode::Kanban);
    assert_eq!(settings.image_property.as_deref(), Some("poster"));
    assert_eq!(settings.layout.image_height, "10em");
    assert_eq!(settings.layout.image_fit, ImageFit::Contain);
    assert_eq!(settings.layout.columns, ColumnStrategy::Fixed { columns: 6 });
}

#[test]
fn device_pass_applies_mobile_overrides() {
    let block = parse_block_settings("preset: square\ncolumns: 3");
    let settings = merge(&builtin_defaults(), &plugin(), &block, DeviceClass::Mobile);

    assert!(settings.mobile);
    assert_eq!(settings.preset, Preset::Compact);
    assert_eq!(settings.layout.image_height, "8rem");
    assert_eq!(settings.layout.columns, ColumnStrategy::Fixed { columns: 1 });

    let desktop = merge(&builtin_defaults(), &plugin(), &block, DeviceClass::Desktop);
    assert!(!desktop.mobile);
    assert_eq!(desktop.preset, Preset::Square);
    assert_eq!(desktop.layout.columns, ColumnStrategy::Fixed { columns: 3 });
}

#[test]
fn toml_sections_are_typed() {
    let settings = Settings::from_toml(PLUGIN_TOML).unwrap();
    assert_eq!(settings.refresh.debounce_ms, 250);
    assert_eq!(settings.logging.level, "info");
    assert!(!settings.logging.debug);
}
