//! Effective settings for one render.
//!
//! Four layers feed the cascade, lowest precedence first: built-in defaults,
//! plugin-wide settings, block settings, and a device pass that swaps in the
//! mobile preset and image height. Layout parameters (column strategy, image
//! height and fit, scrolling) are derived from the merged layer plus the
//! explicit block keys; they are never stored in any layer.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::warn;

use super::block::{SettingsLayer, merge_layers};
use crate::alias::ColumnAlias;

/// Device class reported by the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    #[default]
    Desktop,
    Mobile,
}

/// Named layout presets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    #[default]
    Grid,
    Portrait,
    Square,
    Compact,
    Dense,
}

/// Layout values implied by a preset before any override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresetDefaults {
    pub columns: u32,
    pub image_height: &'static str,
    pub image_fit: ImageFit,
}

impl Preset {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "grid" => Some(Self::Grid),
            "portrait" => Some(Self::Portrait),
            "square" => Some(Self::Square),
            "compact" => Some(Self::Compact),
            "dense" => Some(Self::Dense),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Grid => "grid",
            Self::Portrait => "portrait",
            Self::Square => "square",
            Self::Compact => "compact",
            Self::Dense => "dense",
        }
    }

    pub fn defaults(&self) -> PresetDefaults {
        let (columns, image_height, image_fit) = match self {
            Self::Grid => (3, "200px", ImageFit::Cover),
            Self::Portrait => (4, "300px", ImageFit::Cover),
            Self::Square => (4, "220px", ImageFit::Cover),
            Self::Compact => (5, "120px", ImageFit::Cover),
            Self::Dense => (6, "100px", ImageFit::Contain),
        };
        PresetDefaults {
            columns,
            image_height,
            image_fit,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFit {
    #[default]
    Cover,
    Contain,
}

impl ImageFit {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "cover" => Some(Self::Cover),
            "contain" => Some(Self::Contain),
            _ => None,
        }
    }
}

/// How boolean properties are shown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BooleanDisplay {
    Checkbox,
    Text,
    #[default]
    Both,
}

impl BooleanDisplay {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "checkbox" => Some(Self::Checkbox),
            "text" => Some(Self::Text),
            "both" => Some(Self::Both),
            _ => None,
        }
    }

    pub fn shows_checkbox(&self) -> bool {
        matches!(self, Self::Checkbox | Self::Both)
    }

    pub fn shows_text(&self) -> bool {
        matches!(self, Self::Text | Self::Both)
    }
}

/// Which presentation a block renders into.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    #[default]
    Cards,
    Kanban,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "lowercase")]
pub enum ColumnStrategy {
    Fixed { columns: u32 },
    Dynamic { min_card_width: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrollBehavior {
    pub enabled: bool,
    pub max_height: String,
}

/// Layout parameters derived from preset and overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutParams {
    pub columns: ColumnStrategy,
    pub image_height: String,
    pub image_fit: ImageFit,
    pub scroll: ScrollBehavior,
    pub lazy_load: bool,
    /// Viewport proximity (px) at which lazy images start loading.
    pub lazy_load_margin: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KanbanSettings {
    pub group_by: String,
    pub status_order: Option<Vec<String>>,
    pub column_colors: BTreeMap<String, String>,
    pub show_new_task_button: bool,
    pub new_task_folder: String,
    pub new_task_template: SettingsLayer,
}

/// The fully merged configuration used for one render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectiveSettings {
    pub preset: Preset,
    pub mobile: bool,
    pub image_property: Option<String>,
    /// Include list; `None` keeps every property.
    pub properties: Option<Vec<String>>,
    pub exclude: Vec<String>,
    pub show_labels: bool,
    pub show_title: bool,
    pub boolean_display: BooleanDisplay,
    pub boolean_true_text: String,
    pub boolean_false_text: String,
    pub date_format: String,
    /// Property name → formatter directive (`stars:10`, `badge:green`, ...).
    pub formatters: BTreeMap<String, String>,
    pub aliases: Vec<ColumnAlias>,
    pub status_options: Vec<String>,
    pub view: ViewMode,
    pub kanban: KanbanSettings,
    pub empty_message: String,
    pub debug: bool,
    pub layout: LayoutParams,
    /// The merged layer the typed fields were read from.
    pub raw: SettingsLayer,
}

/// Built-in defaults, the lowest cascade layer.
pub fn builtin_defaults() -> SettingsLayer {
    let value = json!({
        "preset": "grid",
        "imageProperty": "cover",
        "dynamicColumns": false,
        "minCardWidth": 250,
        "mobileColumns": 1,
        "forceMobile": false,
        "exclude": [],
        "showLabels": true,
        "showTitle": true,
        "scrollable": false,
        "maxHeight": "600px",
        "lazyLoad": false,
        "lazyLoadMargin": 200,
        "booleanDisplay": "both",
        "locale": "en",
        "dateFormat": "YYYY-MM-DD",
        "formatters": {},
        "aliases": [],
        "statusOptions": ["todo", "in-progress", "done"],
        "view": "cards",
        "columnColors": {},
        "showNewTaskButton": false,
        "newTaskFolder": "",
        "newTaskTemplate": {},
        "emptyMessage": "No results",
        "debug": false,
    });
    match value {
        Value::Object(map) => map,
        _ => SettingsLayer::new(),
    }
}

/// Merge the four cascade layers into effective settings.
pub fn merge(
    defaults: &SettingsLayer,
    plugin: &SettingsLayer,
    block: &SettingsLayer,
    device: DeviceClass,
) -> EffectiveSettings {
    let mut merged = merge_layers(&[defaults, plugin, block]);

    let force_mobile = merged
        .get("forceMobile")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let mobile = force_mobile || device == DeviceClass::Mobile;

    if mobile {
        for (from, to) in [("mobilePreset", "preset"), ("mobileImageHeight", "imageHeight")] {
            if let Some(value) = merged.get(from).filter(|v| !v.is_null()).cloned() {
                merged.insert(to.to_string(), value);
            }
        }
    }

    let reader = LayerReader { layer: &merged };

    let preset = match reader.string("preset") {
        Some(name) => Preset::parse(&name).unwrap_or_else(|| {
            warn!("unknown preset '{name}', falling back to grid");
            Preset::Grid
        }),
        None => Preset::Grid,
    };

    let layout = derive_layout(&reader, preset, plugin, block, mobile);

    let locale = reader.string("locale").unwrap_or_else(|| "en".to_string());
    let (true_text, false_text) = locale_boolean_texts(&locale);

    let view = match reader.string("view").as_deref().map(str::to_ascii_lowercase) {
        Some(view) if view == "kanban" => ViewMode::Kanban,
        Some(view) if view != "cards" => {
            warn!("unknown view '{view}', rendering cards");
            ViewMode::Cards
        }
        _ => ViewMode::Cards,
    };

    let aliases = match merged.get("aliases") {
        Some(value) => serde_json::from_value::<Vec<ColumnAlias>>(value.clone()).unwrap_or_else(|err| {
            warn!("ignoring malformed aliases setting: {err}");
            Vec::new()
        }),
        None => Vec::new(),
    };

    let kanban = KanbanSettings {
        group_by: reader.string("groupBy").unwrap_or_else(|| "status".to_string()),
        status_order: reader.string_list("statusOrder"),
        column_colors: reader.string_map("columnColors"),
        show_new_task_button: reader.bool("showNewTaskButton", false),
        new_task_folder: reader.string("newTaskFolder").unwrap_or_default(),
        new_task_template: reader.object("newTaskTemplate"),
    };

    EffectiveSettings {
        preset,
        mobile,
        image_property: reader.string("imageProperty").filter(|s| !s.is_empty()),
        properties: reader.string_list("properties"),
        exclude: reader.string_list("exclude").unwrap_or_default(),
        show_labels: reader.bool("showLabels", true),
        show_title: reader.bool("showTitle", true),
        boolean_display: reader
            .string("booleanDisplay")
            .and_then(|s| BooleanDisplay::parse(&s))
            .unwrap_or_default(),
        boolean_true_text: reader.string("booleanTrueText").unwrap_or(true_text.to_string()),
        boolean_false_text: reader
            .string("booleanFalseText")
            .unwrap_or(false_text.to_string()),
        date_format: reader
            .string("dateFormat")
            .unwrap_or_else(|| "YYYY-MM-DD".to_string()),
        formatters: reader.string_map("formatters"),
        aliases,
        status_options: reader
            .string_list("statusOptions")
            .unwrap_or_else(|| vec!["todo".into(), "in-progress".into(), "done".into()]),
        view,
        kanban,
        empty_message: reader
            .string("emptyMessage")
            .unwrap_or_else(|| "No results".to_string()),
        debug: reader.bool("debug", false),
        layout,
        raw: merged.clone(),
    }
}

impl EffectiveSettings {
    /// Settings made only of the built-in defaults, for a desktop device.
    pub fn builtin() -> Self {
        merge(
            &builtin_defaults(),
            &SettingsLayer::new(),
            &SettingsLayer::new(),
            DeviceClass::Desktop,
        )
    }

    /// Formatter directive configured for `property`, if any.
    pub fn formatter_for(&self, property: &str) -> Option<&str> {
        self.formatters
            .get(property)
            .or_else(|| {
                self.formatters
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(property))
                    .map(|(_, directive)| directive)
            })
            .map(String::as_str)
    }

    /// Display name for `property` after alias substitution.
    pub fn display_name(&self, property: &str) -> String {
        self.aliases
            .iter()
            .find(|alias| alias.matches(property))
            .map(|alias| alias.alias.clone())
            .unwrap_or_else(|| property.to_string())
    }
}

fn derive_layout(
    reader: &LayerReader<'_>,
    preset: Preset,
    plugin: &SettingsLayer,
    block: &SettingsLayer,
    mobile: bool,
) -> LayoutParams {
    let preset_defaults = preset.defaults();
    let fixed_columns = reader.u32("columns").unwrap_or(preset_defaults.columns).max(1);
    let min_card_width = reader.u32("minCardWidth").unwrap_or(250);

    let block_columns = block.get("columns").and_then(as_u32);
    let block_dynamic = block.get("dynamicColumns").and_then(Value::as_bool);
    let plugin_dynamic = plugin
        .get("dynamicColumns")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let columns = if mobile {
        ColumnStrategy::Fixed {
            columns: reader.u32("mobileColumns").unwrap_or(1).max(1),
        }
    } else if let Some(columns) = block_columns {
        ColumnStrategy::Fixed {
            columns: columns.max(1),
        }
    } else {
        let dynamic = block_dynamic.unwrap_or(plugin_dynamic);
        if dynamic {
            ColumnStrategy::Dynamic { min_card_width }
        } else {
            ColumnStrategy::Fixed {
                columns: fixed_columns,
            }
        }
    };

    let image_height = reader
        .raw("imageHeight")
        .and_then(normalize_length)
        .unwrap_or_else(|| preset_defaults.image_height.to_string());

    let image_fit = reader
        .string("imageFit")
        .and_then(|fit| ImageFit::parse(&fit))
        .unwrap_or(preset_defaults.image_fit);

    let scroll = ScrollBehavior {
        enabled: reader.bool("scrollable", false),
        max_height: reader
            .raw("maxHeight")
            .and_then(normalize_length)
            .unwrap_or_else(|| "600px".to_string()),
    };

    LayoutParams {
        columns,
        image_height,
        image_fit,
        scroll,
        lazy_load: reader.bool("lazyLoad", false),
        lazy_load_margin: reader.u32("lazyLoadMargin").unwrap_or(200),
    }
}

/// Append `px` to unitless lengths; keep explicit units as written.
pub fn normalize_length(value: &Value) -> Option<String> {
    match value {
        Value::Number(number) => number.as_f64().map(|n| format!("{}px", format_number(n))),
        Value::String(text) => {
            let text = text.trim();
            if text.is_empty() {
                None
            } else if text.parse::<f64>().is_ok() {
                Some(format!("{text}px"))
            } else {
                Some(text.to_string())
            }
        }
        _ => None,
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

fn as_u32(value: &Value) -> Option<u32> {
    match value {
        Value::Number(number) => number
            .as_u64()
            .or_else(|| number.as_f64().filter(|n| *n >= 0.0).map(|n| n.round() as u64))
            .and_then(|n| u32::try_from(n).ok()),
        Value::String(text) => text.trim().parse::<u32>().ok(),
        _ => None,
    }
}

fn locale_boolean_texts(locale: &str) -> (&'static str, &'static str) {
    let language = locale
        .split(['-', '_'])
        .next()
        .unwrap_or("en")
        .to_ascii_lowercase();
    match language.as_str() {
        "fr" => ("Oui", "Non"),
        "de" => ("Ja", "Nein"),
        "es" => ("Sí", "No"),
        "it" => ("Sì", "No"),
        "pt" => ("Sim", "Não"),
        "nl" => ("Ja", "Nee"),
        _ => ("Yes", "No"),
    }
}

/// Typed reads over a merged layer. A present value of the wrong type is
/// reported and treated as absent.
struct LayerReader<'a> {
    layer: &'a SettingsLayer,
}

impl LayerReader<'_> {
    fn raw(&self, key: &str) -> Option<&Value> {
        self.layer.get(key).filter(|value| !value.is_null())
    }

    fn string(&self, key: &str) -> Option<String> {
        match self.raw(key)? {
            Value::String(text) => Some(text.clone()),
            Value::Number(number) => Some(number.to_string()),
            Value::Bool(flag) => Some(flag.to_string()),
            other => {
                warn!("setting '{key}' expects a string, got {other}");
                None
            }
        }
    }

    fn bool(&self, key: &str, default: bool) -> bool {
        match self.raw(key) {
            None => default,
            Some(Value::Bool(flag)) => *flag,
            Some(other) => {
                warn!("setting '{key}' expects a boolean, got {other}");
                default
            }
        }
    }

    fn u32(&self, key: &str) -> Option<u32> {
        let value = self.raw(key)?;
        let parsed = as_u32(value);
        if parsed.is_none() {
            warn!("setting '{key}' expects a non-negative number, got {value}");
        }
        parsed
    }

    fn string_list(&self, key: &str) -> Option<Vec<String>> {
        match self.raw(key)? {
            Value::Array(items) => Some(
                items
                    .iter()
                    .filter_map(|item| match item {
                        Value::String(text) => Some(text.trim().to_string()),
                        Value::Null => None,
                        other => Some(other.to_string()),
                    })
                    .filter(|item| !item.is_empty())
                    .collect(),
            ),
            Value::String(text) => Some(
                text.split(',')
                    .map(|item| item.trim().to_string())
                    .filter(|item| !item.is_empty())
                    .collect(),
            ),
            other => {
                warn!("setting '{key}' expects a list, got {other}");
                None
            }
        }
    }

    fn object(&self, key: &str) -> SettingsLayer {
        match self.raw(key) {
            Some(Value::Object(map)) => map.clone(),
            Some(other) => {
                warn!("setting '{key}' expects an object, got {other}");
                SettingsLayer::new()
            }
            None => SettingsLayer::new(),
        }
    }

    fn string_map(&self, key: &str) -> BTreeMap<String, String> {
        self.object(key)
            .into_iter()
            .filter_map(|(name, value)| match value {
                Value::String(text) => Some((name, text)),
                Value::Null => None,
                other => Some((name, other.to_string())),
            })
            .collect()
    }
}
