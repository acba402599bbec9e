//! Card assembly from normalized rows.

use cardview_core::EffectiveSettings;
use cardview_core::config::LayoutParams;
use serde::{Deserialize, Serialize};

use crate::format::{Node, RenderContext, format_property};
use crate::image::ImageSource;
use crate::shape::NormalizedResult;
use crate::value::{LinkRef, PropertyValue, Row};

/// Placeholder shown on a card whose properties were all filtered out.
pub const NO_PROPERTIES: &str = "No properties";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardTitle {
    pub text: String,
    /// Note path the title links to; `None` for plain-text titles.
    pub target: Option<String>,
}

impl CardTitle {
    fn from_value(value: &PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::Link(link) => Some(Self::from_link(link)),
            PropertyValue::String(text) => match LinkRef::from_wikilink(text) {
                Some(link) => Some(Self::from_link(&link)),
                None if !text.trim().is_empty() => Some(Self {
                    text: text.trim().to_string(),
                    target: None,
                }),
                None => None,
            },
            PropertyValue::List(items) => items.iter().find_map(Self::from_value),
            PropertyValue::Null => None,
            other => Some(Self {
                text: other.to_plain_string(),
                target: None,
            }),
        }
    }

    fn from_link(link: &LinkRef) -> Self {
        Self {
            text: link.display_text(),
            target: Some(link.path.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardProperty {
    pub name: String,
    /// Label to show; `None` when labels are turned off.
    pub display_name: Option<String>,
    pub value: Node,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub image: Option<ImageSource>,
    pub title: Option<CardTitle>,
    pub properties: Vec<CardProperty>,
    /// Set when no property survived filtering.
    pub empty: bool,
}

impl Card {
    /// Text shown in place of the property list, if any.
    pub fn placeholder(&self) -> Option<&'static str> {
        self.empty.then_some(NO_PROPERTIES)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardSection {
    pub key: String,
    pub cards: Vec<Card>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardLayout {
    pub layout: LayoutParams,
    pub cards: Vec<Card>,
    /// One section per group for grouped results.
    pub sections: Option<Vec<CardSection>>,
}

/// Original field behind an aliased column name.
fn original_of<'s>(settings: &'s EffectiveSettings, column: &str) -> Option<&'s str> {
    settings
        .aliases
        .iter()
        .find(|alias| alias.matches(column))
        .map(|alias| alias.original.as_str())
}

/// Whether a configured property name refers to `column`, directly or
/// through its alias.
fn refers_to(settings: &EffectiveSettings, wanted: &str, column: &str) -> bool {
    wanted.eq_ignore_ascii_case(column)
        || original_of(settings, column).is_some_and(|original| wanted.eq_ignore_ascii_case(original))
}

fn is_excluded(settings: &EffectiveSettings, column: &str) -> bool {
    settings
        .exclude
        .iter()
        .any(|excluded| refers_to(settings, excluded, column))
}

fn render_property(ctx: &RenderContext<'_>, column: &str, value: &PropertyValue) -> CardProperty {
    let settings = ctx.settings;
    let formatter_name = match settings.formatter_for(column) {
        Some(_) => column,
        None => original_of(settings, column).unwrap_or(column),
    };
    CardProperty {
        name: column.to_string(),
        display_name: settings
            .show_labels
            .then(|| settings.display_name(column)),
        value: format_property(ctx, formatter_name, value),
    }
}

/// Build the card for one row.
pub fn render_card(ctx: &RenderContext<'_>, row: &Row) -> Card {
    let settings = ctx.settings;

    let image_field = settings
        .image_property
        .as_deref()
        .and_then(|name| row.get_ci(name));
    let image = image_field.and_then(|(_, value)| ImageSource::from_value(value));
    let image_name = image_field.map(|(name, _)| name);

    let title_field = row.title_field();
    let title_name = title_field.map(|(name, _)| name);
    let title = if settings.show_title {
        title_field.and_then(|(_, value)| CardTitle::from_value(value))
    } else {
        None
    };

    let keep = |column: &str| {
        Some(column) != image_name && Some(column) != title_name && !is_excluded(settings, column)
    };

    let properties: Vec<CardProperty> = match &settings.properties {
        Some(wanted) => wanted
            .iter()
            .filter_map(|name| {
                row.iter()
                    .find(|(column, _)| refers_to(settings, name, column))
            })
            .filter(|(column, _)| keep(*column))
            .map(|(column, value)| render_property(ctx, column, value))
            .collect(),
        None => row
            .iter()
            .filter(|(column, _)| keep(*column))
            .map(|(column, value)| render_property(ctx, column, value))
            .collect(),
    };

    Card {
        image,
        title,
        empty: properties.is_empty(),
        properties,
    }
}

pub fn render_cards(ctx: &RenderContext<'_>, rows: &[Row]) -> Vec<Card> {
    rows.iter().map(|row| render_card(ctx, row)).collect()
}

/// Cards for a whole result, with one section per group when grouped.
pub fn render_layout(ctx: &RenderContext<'_>, result: &NormalizedResult) -> CardLayout {
    let sections = result.groups.as_ref().map(|groups| {
        groups
            .iter()
            .map(|group| CardSection {
                key: group.key.clone(),
                cards: render_cards(ctx, &group.rows),
            })
            .collect::<Vec<_>>()
    });

    let cards = match &sections {
        Some(sections) => sections
            .iter()
            .flat_map(|section| section.cards.iter().cloned())
            .collect(),
        None => render_cards(ctx, &result.rows),
    };

    CardLayout {
        layout: ctx.settings.layout.clone(),
        cards,
        sections,
    }
}
