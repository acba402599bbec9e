//! Property value formatting.
//!
//! Formatting turns a [`PropertyValue`](crate::value::PropertyValue) into a
//! [`Node`], a small serializable tree the host turns into UI elements. The
//! effective settings reach every formatter through a [`RenderContext`];
//! formatters hold no state of their own.

mod date;
mod property;

use cardview_core::EffectiveSettings;
use serde::{Deserialize, Serialize};

pub use date::format_date;
pub use property::{Directive, format_property, format_value};
pub(crate) use property::markdown_image;

/// Render-scoped view of the settings, built once per render.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    pub settings: &'a EffectiveSettings,
}

impl<'a> RenderContext<'a> {
    pub fn new(settings: &'a EffectiveSettings) -> Self {
        Self { settings }
    }

    pub fn debug(&self) -> bool {
        self.settings.debug
    }
}

/// Rendered value tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum Node {
    Empty,
    Text {
        text: String,
    },
    Link {
        target: String,
        text: String,
        external: bool,
    },
    /// Markup handed to the host's sanitizing renderer.
    Html {
        html: String,
    },
    Image {
        src: String,
        alt: Option<String>,
    },
    /// Disabled checkbox, with the localized label when configured.
    Checkbox {
        checked: bool,
        label: Option<String>,
    },
    Stars {
        value: f64,
        max: u32,
        filled: u32,
        glyphs: String,
    },
    Badge {
        text: String,
        color: Option<String>,
    },
    Progress {
        value: f64,
        max: f64,
        /// Percentage rounded to the nearest 5.
        percent: u32,
    },
    Tags {
        tags: Vec<String>,
    },
    StatusSelect {
        current: String,
        options: Vec<String>,
    },
    Date {
        iso: String,
        text: String,
    },
    Seq {
        items: Vec<Node>,
        separator: String,
    },
}

impl Node {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text { text } => text.is_empty(),
            Self::Seq { items, .. } => items.iter().all(Node::is_empty),
            _ => false,
        }
    }

    /// Plain-text rendering, mainly for logs and snapshots.
    pub fn plain_text(&self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Text { text } | Self::Link { text, .. } | Self::Badge { text, .. } => text.clone(),
            Self::Html { html } => html.clone(),
            Self::Image { src, alt } => alt.clone().unwrap_or_else(|| src.clone()),
            Self::Checkbox { checked, label } => match label {
                Some(label) => format!("[{}] {label}", if *checked { "x" } else { " " }),
                None => format!("[{}]", if *checked { "x" } else { " " }),
            },
            Self::Stars { glyphs, .. } => glyphs.clone(),
            Self::Progress { percent, .. } => format!("{percent}%"),
            Self::Tags { tags } => tags
                .iter()
                .map(|tag| format!("#{tag}"))
                .collect::<Vec<_>>()
                .join(" "),
            Self::StatusSelect { current, .. } => current.clone(),
            Self::Date { text, .. } => text.clone(),
            Self::Seq { items, separator } => items
                .iter()
                .map(Node::plain_text)
                .collect::<Vec<_>>()
                .join(separator.as_str()),
        }
    }
}

const PALETTE: &[(&str, &str)] = &[
    ("red", "#e5484d"),
    ("orange", "#f76b15"),
    ("yellow", "#ffc53d"),
    ("green", "#30a46c"),
    ("cyan", "#00a2c7"),
    ("blue", "#0090ff"),
    ("purple", "#8e4ec6"),
    ("pink", "#d6409f"),
    ("gray", "#8b8d98"),
    ("grey", "#8b8d98"),
];

/// Hex value of a named palette color.
pub fn palette_color(name: &str) -> Option<&'static str> {
    let name = name.trim();
    PALETTE
        .iter()
        .find(|(entry, _)| entry.eq_ignore_ascii_case(name))
        .map(|(_, hex)| *hex)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn palette_lookup() {
        assert_eq!(palette_color("Green"), Some("#30a46c"));
        assert_eq!(palette_color(" grey "), palette_color("gray"));
        assert_eq!(palette_color("chartreuse"), None);
    }

    #[test]
    fn plain_text_of_sequences() {
        let node = Node::Seq {
            items: vec![
                Node::text("a"),
                Node::Link {
                    target: "b.md".into(),
                    text: "b".into(),
                    external: false,
                },
            ],
            separator: ", ".into(),
        };
        assert_eq!(node.plain_text(), "a, b");
        assert!(!node.is_empty());
        assert!(
            Node::Seq {
                items: vec![Node::Empty, Node::text("")],
                separator: String::new()
            }
            .is_empty()
        );
    }
}
