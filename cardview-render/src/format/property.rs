use std::sync::OnceLock;

use cardview_core::config::BooleanDisplay;
use regex::Regex;

use super::{Node, RenderContext, format_date, palette_color};
use crate::tokenizer::{Token, TokenKind, is_plain, tokenize};
use crate::value::{LinkRef, PropertyValue, format_number, parse_iso_date};

const DEFAULT_STAR_MAX: u32 = 5;
const MAX_STARS: u32 = 100;
const DEFAULT_PROGRESS_MAX: f64 = 100.0;
const STAR_FILLED: char = '★';
const STAR_EMPTY: char = '☆';

/// A per-property formatter directive, as written in the `formatters` map.
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    Stars { max: u32 },
    Badge { color: Option<String> },
    Progress { max: f64 },
    Date { format: Option<String> },
    Tags,
    Status,
}

impl Directive {
    /// Parse `name[:argument]`. Unknown names yield `None`.
    pub fn parse(text: &str) -> Option<Self> {
        let (name, argument) = match text.split_once(':') {
            Some((name, argument)) => (name.trim(), Some(argument.trim()).filter(|a| !a.is_empty())),
            None => (text.trim(), None),
        };
        let directive = match name.to_ascii_lowercase().as_str() {
            "stars" => Self::Stars {
                max: argument
                    .and_then(|a| a.parse::<u32>().ok())
                    .filter(|max| *max > 0)
                    .map_or(DEFAULT_STAR_MAX, |max| max.min(MAX_STARS)),
            },
            "badge" => Self::Badge {
                color: argument.map(str::to_string),
            },
            "progress" => Self::Progress {
                max: argument
                    .and_then(|a| a.parse::<f64>().ok())
                    .filter(|max| *max > 0.0)
                    .unwrap_or(DEFAULT_PROGRESS_MAX),
            },
            "date" => Self::Date {
                format: argument.map(str::to_string),
            },
            "tags" => Self::Tags,
            "status" => Self::Status,
            _ => return None,
        };
        Some(directive)
    }
}

/// Format one property: its configured directive first, then by value type.
pub fn format_property(ctx: &RenderContext<'_>, name: &str, value: &PropertyValue) -> Node {
    if let Some(text) = ctx.settings.formatter_for(name) {
        match Directive::parse(text) {
            Some(directive) => return apply_directive(ctx, &directive, value),
            None => tracing::debug!("unknown formatter '{text}' for property '{name}'"),
        }
    }
    format_value(ctx, value)
}

/// Format a value by its runtime type.
pub fn format_value(ctx: &RenderContext<'_>, value: &PropertyValue) -> Node {
    match value {
        PropertyValue::Null => Node::Empty,
        PropertyValue::Bool(flag) => format_bool(ctx, *flag),
        PropertyValue::Number(n) => Node::text(format_number(*n)),
        PropertyValue::Date(date) => Node::Date {
            iso: date.format("%Y-%m-%dT%H:%M:%S").to_string(),
            text: format_date(date, &ctx.settings.date_format),
        },
        PropertyValue::String(text) => format_string(ctx, text),
        PropertyValue::Link(link) => link_node(link),
        PropertyValue::List(items) => {
            let items: Vec<Node> = items
                .iter()
                .map(|item| format_list_item(ctx, item))
                .filter(|node| !node.is_empty())
                .collect();
            if items.is_empty() {
                Node::Empty
            } else {
                Node::Seq {
                    items,
                    separator: ", ".to_string(),
                }
            }
        }
        PropertyValue::Object(_) => Node::text(value.to_plain_string()),
    }
}

fn format_list_item(ctx: &RenderContext<'_>, item: &PropertyValue) -> Node {
    match item {
        PropertyValue::List(_) | PropertyValue::Object(_) => Node::text(item.to_plain_string()),
        other => format_value(ctx, other),
    }
}

fn format_bool(ctx: &RenderContext<'_>, flag: bool) -> Node {
    let settings = ctx.settings;
    let text = if flag {
        &settings.boolean_true_text
    } else {
        &settings.boolean_false_text
    };
    match settings.boolean_display {
        BooleanDisplay::Checkbox => Node::Checkbox {
            checked: flag,
            label: None,
        },
        BooleanDisplay::Text => Node::text(text.clone()),
        BooleanDisplay::Both => Node::Checkbox {
            checked: flag,
            label: Some(text.clone()),
        },
    }
}

fn link_node(link: &LinkRef) -> Node {
    if link.embed && is_image_path(&link.path) {
        return Node::Image {
            src: link.path.clone(),
            alt: link.display.clone(),
        };
    }
    Node::Link {
        target: link.path.clone(),
        text: link.display_text(),
        external: false,
    }
}

fn is_image_path(path: &str) -> bool {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    path.rsplit_once('.').is_some_and(|(_, ext)| {
        matches!(
            ext.to_ascii_lowercase().as_str(),
            "png" | "jpg" | "jpeg" | "gif" | "webp" | "svg" | "bmp" | "avif"
        )
    })
}

fn markdown_image_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^!\[([^\]]*)\]\(\s*([^)\s]+)(?:\s+[^)]*)?\)$").expect("regex"))
}

fn hash_tags_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^#[\w/-]+(?:[\s,]+#[\w/-]+)*$").expect("regex"))
}

/// Parse a whole-value markdown image, `![alt](src)`.
pub(crate) fn markdown_image(text: &str) -> Option<(String, Option<String>)> {
    let caps = markdown_image_pattern().captures(text.trim())?;
    let src = caps.get(2)?.as_str().to_string();
    let alt = caps
        .get(1)
        .map(|m| m.as_str().trim().to_string())
        .filter(|alt| !alt.is_empty());
    Some((src, alt))
}

fn format_string(ctx: &RenderContext<'_>, text: &str) -> Node {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Node::Empty;
    }
    if let Some(date) = parse_iso_date(trimmed) {
        return Node::Date {
            iso: trimmed.to_string(),
            text: format_date(&date, &ctx.settings.date_format),
        };
    }
    if let Some((src, alt)) = markdown_image(trimmed) {
        return Node::Image { src, alt };
    }
    if hash_tags_pattern().is_match(trimmed) {
        return Node::Tags {
            tags: split_tags(trimmed),
        };
    }

    let tokens = tokenize(text);
    if is_plain(&tokens) {
        if trimmed.starts_with("www.") && !trimmed.contains(char::is_whitespace) {
            return Node::Link {
                target: format!("https://{trimmed}"),
                text: trimmed.to_string(),
                external: true,
            };
        }
        return Node::text(text);
    }
    rich_text(tokens)
}

fn token_node(token: Token) -> Node {
    match token.kind {
        TokenKind::Text => Node::Text {
            text: token.content,
        },
        TokenKind::Html => Node::Html {
            html: token.content,
        },
        TokenKind::Url => Node::Link {
            text: token.content.clone(),
            target: token.content,
            external: true,
        },
        TokenKind::WikiLink => match token.wikilink() {
            Some(link) => link_node(&link),
            None => Node::Text {
                text: token.content,
            },
        },
    }
}

fn rich_text(tokens: Vec<Token>) -> Node {
    let mut items: Vec<Node> = tokens.into_iter().map(token_node).collect();
    if items.len() == 1 {
        return items.remove(0);
    }
    Node::Seq {
        items,
        separator: String::new(),
    }
}

fn split_tags(text: &str) -> Vec<String> {
    text.split(|c: char| c == ',' || c.is_whitespace())
        .map(|tag| tag.trim().trim_start_matches('#'))
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

fn apply_directive(ctx: &RenderContext<'_>, directive: &Directive, value: &PropertyValue) -> Node {
    if value.is_null() {
        return Node::Empty;
    }
    let fallback = || Node::text(value.to_plain_string());

    match directive {
        Directive::Stars { max } => match value.as_f64() {
            Some(n) => stars(n, *max),
            None => fallback(),
        },
        Directive::Progress { max } => match value.as_f64() {
            Some(n) => progress(n, *max),
            None => fallback(),
        },
        Directive::Badge { color } => Node::Badge {
            text: value.to_plain_string(),
            color: color
                .as_deref()
                .map(|c| palette_color(c).map(str::to_string).unwrap_or_else(|| c.to_string())),
        },
        Directive::Date { format } => {
            let pattern = format.as_deref().unwrap_or(&ctx.settings.date_format);
            let date = match value {
                PropertyValue::Date(date) => Some(*date),
                PropertyValue::String(text) => parse_iso_date(text),
                _ => None,
            };
            match date {
                Some(date) => Node::Date {
                    iso: date.format("%Y-%m-%dT%H:%M:%S").to_string(),
                    text: format_date(&date, pattern),
                },
                None => fallback(),
            }
        }
        Directive::Tags => {
            let tags: Vec<String> = match value {
                PropertyValue::List(items) => items
                    .iter()
                    .flat_map(|item| split_tags(&item.to_plain_string()))
                    .collect(),
                other => split_tags(&other.to_plain_string()),
            };
            if tags.is_empty() {
                Node::Empty
            } else {
                Node::Tags { tags }
            }
        }
        Directive::Status => {
            let current = value.to_plain_string();
            let mut options = ctx.settings.status_options.clone();
            if !current.is_empty() && !options.iter().any(|o| o == &current) {
                options.push(current.clone());
            }
            Node::StatusSelect { current, options }
        }
    }
}

fn stars(value: f64, max: u32) -> Node {
    let clamped = value.clamp(0.0, f64::from(max));
    let filled = clamped.round() as u32;
    let glyphs: String = std::iter::repeat_n(STAR_FILLED, filled as usize)
        .chain(std::iter::repeat_n(STAR_EMPTY, (max - filled) as usize))
        .collect();
    Node::Stars {
        value: clamped,
        max,
        filled,
        glyphs,
    }
}

fn progress(value: f64, max: f64) -> Node {
    let clamped = value.clamp(0.0, max);
    let percent = clamped / max * 100.0;
    let bucketed = ((percent / 5.0).round() * 5.0) as u32;
    Node::Progress {
        value: clamped,
        max,
        percent: bucketed.min(100),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardview_core::config::{SettingsLayer, builtin_defaults, merge};
    use cardview_core::{DeviceClass, EffectiveSettings};
    use chrono::NaiveDate;
    use serde_json::json;

    fn settings_with(block: serde_json::Value) -> EffectiveSettings {
        let block: SettingsLayer = match block {
            serde_json::Value::Object(map) => map,
            _ => SettingsLayer::new(),
        };
        merge(&builtin_defaults(), &SettingsLayer::new(), &block, DeviceClass::Desktop)
    }

    fn text(s: &str) -> PropertyValue {
        PropertyValue::String(s.to_string())
    }

    // ── directives ─────────────────────────────────────────────────

    #[test]
    fn directive_parsing() {
        assert_eq!(Directive::parse("stars"), Some(Directive::Stars { max: 5 }));
        assert_eq!(Directive::parse("stars:10"), Some(Directive::Stars { max: 10 }));
        assert_eq!(Directive::parse("stars:zero"), Some(Directive::Stars { max: 5 }));
        assert_eq!(Directive::parse("stars:4000000000"), Some(Directive::Stars { max: 100 }));
        assert_eq!(
            Directive::parse("badge:green"),
            Some(Directive::Badge {
                color: Some("green".into())
            })
        );
        assert_eq!(Directive::parse("Progress:10"), Some(Directive::Progress { max: 10.0 }));
        assert_eq!(
            Directive::parse("date:MMM D, YYYY"),
            Some(Directive::Date {
                format: Some("MMM D, YYYY".into())
            })
        );
        assert_eq!(Directive::parse("tags"), Some(Directive::Tags));
        assert_eq!(Directive::parse("sparkline"), None);
    }

    #[test]
    fn stars_clamp_and_render() {
        let settings = settings_with(json!({"formatters": {"rating": "stars"}}));
        let ctx = RenderContext::new(&settings);

        let node = format_property(&ctx, "rating", &PropertyValue::Number(3.0));
        assert_eq!(node.plain_text(), "★★★☆☆");

        let node = format_property(&ctx, "rating", &PropertyValue::Number(9.0));
        assert_eq!(node.plain_text(), "★★★★★");

        let node = format_property(&ctx, "rating", &text("-2"));
        assert_eq!(node.plain_text(), "☆☆☆☆☆");

        let node = format_property(&ctx, "rating", &text("great"));
        assert_eq!(node, Node::text("great"));
    }

    #[test]
    fn progress_buckets_to_five_percent() {
        let settings = settings_with(json!({"formatters": {"done": "progress:8"}}));
        let ctx = RenderContext::new(&settings);

        let Node::Progress { percent, .. } = format_property(&ctx, "done", &PropertyValue::Number(3.0)) else {
            panic!("expected progress");
        };
        // 37.5% rounds to 40
        assert_eq!(percent, 40);

        let Node::Progress { percent, value, .. } =
            format_property(&ctx, "done", &PropertyValue::Number(12.0))
        else {
            panic!("expected progress");
        };
        assert_eq!(percent, 100);
        assert_eq!(value, 8.0);
    }

    #[test]
    fn badge_colors() {
        let settings = settings_with(json!({
            "formatters": {"genre": "badge:purple", "mood": "badge:#123456", "plain": "badge"}
        }));
        let ctx = RenderContext::new(&settings);

        assert_eq!(
            format_property(&ctx, "genre", &text("sci-fi")),
            Node::Badge {
                text: "sci-fi".into(),
                color: Some("#8e4ec6".into())
            }
        );
        assert_eq!(
            format_property(&ctx, "mood", &text("calm")),
            Node::Badge {
                text: "calm".into(),
                color: Some("#123456".into())
            }
        );
        assert_eq!(
            format_property(&ctx, "plain", &text("x")),
            Node::Badge {
                text: "x".into(),
                color: None
            }
        );
    }

    #[test]
    fn date_directive_and_fallback() {
        let settings = settings_with(json!({"formatters": {"due": "date:MMM D, YYYY"}}));
        let ctx = RenderContext::new(&settings);

        let node = format_property(&ctx, "due", &text("2024-03-05"));
        assert_eq!(node.plain_text(), "Mar 5, 2024");

        let node = format_property(&ctx, "due", &text("someday"));
        assert_eq!(node, Node::text("someday"));
    }

    #[test]
    fn tags_and_status_directives() {
        let settings = settings_with(json!({
            "formatters": {"topics": "tags", "state": "status"},
            "statusOptions": ["todo", "done"]
        }));
        let ctx = RenderContext::new(&settings);

        let node = format_property(
            &ctx,
            "topics",
            &PropertyValue::List(vec![text("#rust"), text("async, tokio")]),
        );
        assert_eq!(
            node,
            Node::Tags {
                tags: vec!["rust".into(), "async".into(), "tokio".into()]
            }
        );

        let node = format_property(&ctx, "state", &text("blocked"));
        assert_eq!(
            node,
            Node::StatusSelect {
                current: "blocked".into(),
                options: vec!["todo".into(), "done".into(), "blocked".into()]
            }
        );
    }

    #[test]
    fn unknown_directive_falls_back_to_type() {
        let settings = settings_with(json!({"formatters": {"n": "sparkline"}}));
        let ctx = RenderContext::new(&settings);
        assert_eq!(format_property(&ctx, "n", &PropertyValue::Number(2.5)), Node::text("2.5"));
    }

    // ── value types ────────────────────────────────────────────────

    #[test]
    fn booleans_follow_display_mode() {
        let both = EffectiveSettings::builtin();
        let ctx = RenderContext::new(&both);
        assert_eq!(
            format_value(&ctx, &PropertyValue::Bool(true)),
            Node::Checkbox {
                checked: true,
                label: Some("Yes".into())
            }
        );

        let text_only = settings_with(json!({"booleanDisplay": "text", "locale": "fr"}));
        let ctx = RenderContext::new(&text_only);
        assert_eq!(format_value(&ctx, &PropertyValue::Bool(false)), Node::text("Non"));

        let checkbox = settings_with(json!({"booleanDisplay": "checkbox"}));
        let ctx = RenderContext::new(&checkbox);
        assert_eq!(
            format_value(&ctx, &PropertyValue::Bool(false)),
            Node::Checkbox {
                checked: false,
                label: None
            }
        );
    }

    #[test]
    fn numbers_and_nulls() {
        let settings = EffectiveSettings::builtin();
        let ctx = RenderContext::new(&settings);
        assert_eq!(format_value(&ctx, &PropertyValue::Number(42.0)), Node::text("42"));
        assert_eq!(format_value(&ctx, &PropertyValue::Number(0.25)), Node::text("0.25"));
        assert_eq!(format_value(&ctx, &PropertyValue::Null), Node::Empty);
    }

    #[test]
    fn dates_use_configured_format() {
        let settings = settings_with(json!({"dateFormat": "D MMMM YYYY"}));
        let ctx = RenderContext::new(&settings);

        let date = NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(
            format_value(&ctx, &PropertyValue::Date(date)).plain_text(),
            "5 March 2024"
        );
        assert_eq!(format_value(&ctx, &text("2024-03-05")).plain_text(), "5 March 2024");
    }

    #[test]
    fn lists_classify_each_item() {
        let settings = EffectiveSettings::builtin();
        let ctx = RenderContext::new(&settings);

        let node = format_value(
            &ctx,
            &PropertyValue::List(vec![
                text("[[Authors/Herbert|Frank Herbert]]"),
                text("https://dune.example"),
                PropertyValue::Link(LinkRef::new("Series/Dune.md")),
                PropertyValue::Null,
                text("plain"),
            ]),
        );
        let Node::Seq { items, separator } = &node else {
            panic!("expected sequence, got {node:?}");
        };
        assert_eq!(separator, ", ");
        assert_eq!(items.len(), 4);
        assert_eq!(
            items[0],
            Node::Link {
                target: "Authors/Herbert".into(),
                text: "Frank Herbert".into(),
                external: false
            }
        );
        assert!(matches!(&items[1], Node::Link { external: true, .. }));
        assert_eq!(node.plain_text(), "Frank Herbert, https://dune.example, Dune, plain");
    }

    #[test]
    fn string_fallbacks() {
        let settings = EffectiveSettings::builtin();
        let ctx = RenderContext::new(&settings);

        assert_eq!(
            format_value(&ctx, &text("![cover](https://img.example/c.png)")),
            Node::Image {
                src: "https://img.example/c.png".into(),
                alt: Some("cover".into())
            }
        );
        assert_eq!(
            format_value(&ctx, &text("#reading #fiction")),
            Node::Tags {
                tags: vec!["reading".into(), "fiction".into()]
            }
        );
        assert_eq!(
            format_value(&ctx, &text("www.example.com")),
            Node::Link {
                target: "https://www.example.com".into(),
                text: "www.example.com".into(),
                external: true
            }
        );
        assert_eq!(format_value(&ctx, &text("hello")), Node::text("hello"));
    }

    #[test]
    fn rich_text_sequences() {
        let settings = EffectiveSettings::builtin();
        let ctx = RenderContext::new(&settings);
        let node = format_value(&ctx, &text("See [[Note A|Note]] at https://x.io"));
        assert_eq!(node.plain_text(), "See Note at https://x.io");

        let embed = format_value(&ctx, &text("![[covers/dune.jpg]]"));
        assert_eq!(
            embed,
            Node::Image {
                src: "covers/dune.jpg".into(),
                alt: None
            }
        );
    }
}
