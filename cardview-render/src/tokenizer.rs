//! Rich-text tokenizing for string property values.
//!
//! Output is a flat list of tokens. A string that is one complete markup
//! element is kept whole so its nesting survives; anything else is scanned
//! left to right for wiki-links, markup tags/entities and bare URLs, with
//! text tokens filling the gaps.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::value::LinkRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    WikiLink,
    Url,
    Html,
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    pub content: String,
}

impl Token {
    fn new(kind: TokenKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
        }
    }

    /// Link target and optional display text of a wiki-link token.
    pub fn wikilink(&self) -> Option<LinkRef> {
        if self.kind != TokenKind::WikiLink {
            return None;
        }
        LinkRef::from_wikilink(&self.content)
    }
}

fn opening_tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^<([a-zA-Z][a-zA-Z0-9-]*)(?:\s[^>]*)?>").expect("regex"))
}

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(concat!(
            r"(?P<wiki>!?\[\[[^\]|]+(?:\|[^\]]+)?\]\])",
            r"|(?P<html></?[a-zA-Z][a-zA-Z0-9-]*(?:\s[^<>]*)?/?>|&(?:[a-zA-Z]+|#[0-9]+|#x[0-9a-fA-F]+);)",
            r"|(?P<url>https?://[^\s<>\[\]]+)",
        ))
        .expect("regex")
    })
}

/// True when `text` is a single element: an opening tag at the start and the
/// matching closing tag at the end.
fn is_whole_markup(text: &str) -> bool {
    let Some(caps) = opening_tag_pattern().captures(text) else {
        return false;
    };
    let Some(tag) = caps.get(1) else {
        return false;
    };
    let closing = format!("</{}>", tag.as_str());
    text.len() > caps[0].len()
        && text
            .get(text.len().saturating_sub(closing.len())..)
            .is_some_and(|tail| tail.eq_ignore_ascii_case(&closing))
}

/// Characters that end a sentence rather than a URL.
fn trim_url(url: &str) -> &str {
    url.trim_end_matches(['.', ',', ';', ':', '!', '?', '"', '\''])
}

/// Split `text` into tokens.
pub fn tokenize(text: &str) -> Vec<Token> {
    if text.is_empty() {
        return Vec::new();
    }
    let trimmed = text.trim();
    if is_whole_markup(trimmed) {
        return vec![Token::new(TokenKind::Html, trimmed)];
    }

    let mut tokens = Vec::new();
    let mut cursor = 0;

    for caps in token_pattern().captures_iter(text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        let (kind, end) = if caps.name("wiki").is_some() {
            (TokenKind::WikiLink, whole.end())
        } else if caps.name("html").is_some() {
            (TokenKind::Html, whole.end())
        } else {
            (TokenKind::Url, whole.start() + trim_url(whole.as_str()).len())
        };

        if whole.start() > cursor {
            tokens.push(Token::new(TokenKind::Text, &text[cursor..whole.start()]));
        }
        tokens.push(Token::new(kind, &text[whole.start()..end]));
        cursor = end;
    }

    if cursor < text.len() {
        tokens.push(Token::new(TokenKind::Text, &text[cursor..]));
    }
    tokens
}

/// True when tokenizing found nothing but plain text.
pub fn is_plain(tokens: &[Token]) -> bool {
    tokens.iter().all(|token| token.kind == TokenKind::Text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(tokens: &[Token]) -> Vec<TokenKind> {
        tokens.iter().map(|t| t.kind).collect()
    }

    #[test]
    fn wikilink_text_and_url() {
        let tokens = tokenize("See [[Note A|Note]] at https://x.io");
        assert_eq!(
            tokens,
            vec![
                Token::new(TokenKind::Text, "See "),
                Token::new(TokenKind::WikiLink, "[[Note A|Note]]"),
                Token::new(TokenKind::Text, " at "),
                Token::new(TokenKind::Url, "https://x.io"),
            ]
        );

        let link = tokens[1].wikilink().unwrap();
        assert_eq!(link.path, "Note A");
        assert_eq!(link.display_text(), "Note");
        assert!(tokens[0].wikilink().is_none());
    }

    #[test]
    fn whole_markup_is_one_token() {
        let text = "<span class=\"x\"><b>bold</b> [[Link]]</span>";
        let tokens = tokenize(text);
        assert_eq!(tokens, vec![Token::new(TokenKind::Html, text)]);
    }

    #[test]
    fn mismatched_outer_tags_are_scanned() {
        let tokens = tokenize("<b>one</b> and <i>two</i>");
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::Html,
                TokenKind::Text,
                TokenKind::Html,
                TokenKind::Text,
                TokenKind::Html,
                TokenKind::Text,
                TokenKind::Html,
            ]
        );
    }

    #[test]
    fn entities_are_markup() {
        let tokens = tokenize("Fish &amp; chips");
        assert_eq!(kinds(&tokens), vec![TokenKind::Text, TokenKind::Html, TokenKind::Text]);
        assert_eq!(tokens[1].content, "&amp;");
    }

    #[test]
    fn trailing_punctuation_stays_text() {
        let tokens = tokenize("Visit https://example.com/a?b=1.");
        assert_eq!(tokens[1], Token::new(TokenKind::Url, "https://example.com/a?b=1"));
        assert_eq!(tokens[2], Token::new(TokenKind::Text, "."));
    }

    #[test]
    fn embeds_are_wikilinks() {
        let tokens = tokenize("![[cover.png]]");
        assert_eq!(kinds(&tokens), vec![TokenKind::WikiLink]);
        assert!(tokens[0].wikilink().unwrap().embed);
    }

    #[test]
    fn plain_text_and_empty() {
        assert!(tokenize("").is_empty());
        let tokens = tokenize("just words");
        assert!(is_plain(&tokens));
        assert_eq!(tokens, vec![Token::new(TokenKind::Text, "just words")]);
    }
}
