//! Block text parsing.
//!
//! A block is a query followed by an optional settings section. The two are
//! separated by the first line that is either a hyphen rule (`---` or longer)
//! or a `// settings` marker. Parsing never fails: the worst case is a query
//! with no settings and no aliases.

use std::sync::OnceLock;

use cardview_core::ColumnAlias;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Query-type keywords recognized at the start of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QueryType {
    Table,
    List,
    Task,
    Calendar,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Table => "TABLE",
            Self::List => "LIST",
            Self::Task => "TASK",
            Self::Calendar => "CALENDAR",
        }
    }

    fn from_keyword(word: &str) -> Option<Self> {
        match word.to_ascii_uppercase().as_str() {
            "TABLE" => Some(Self::Table),
            "LIST" => Some(Self::List),
            "TASK" => Some(Self::Task),
            "CALENDAR" => Some(Self::Calendar),
            _ => None,
        }
    }
}

/// Keyword inserted when a query starts without one.
pub const DEFAULT_QUERY_TYPE: QueryType = QueryType::List;

/// Marker that opens a settings section, matched case-insensitively.
pub const SETTINGS_MARKER: &str = "// settings";

const CLAUSE_KEYWORDS: &[&str] = &["FROM", "WHERE", "SORT", "GROUP BY", "FLATTEN", "LIMIT"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedBlock {
    /// Query text, guaranteed to carry a query-type keyword.
    pub query: String,
    pub settings_text: String,
    pub query_type: QueryType,
    pub aliases: Vec<ColumnAlias>,
}

/// Split a raw block, normalize its query and extract column aliases.
pub fn parse_block(raw: &str) -> ParsedBlock {
    let (query, settings_text) = split_block(raw);
    let query = ensure_query_type(&query, DEFAULT_QUERY_TYPE);
    let query_type = detect_query_type(&query).unwrap_or(DEFAULT_QUERY_TYPE);
    let aliases = if query_type == QueryType::Table {
        extract_aliases(&query)
    } else {
        Vec::new()
    };

    ParsedBlock {
        query,
        settings_text,
        query_type,
        aliases,
    }
}

/// Split block text at the first settings separator, trimming both halves.
pub fn split_block(raw: &str) -> (String, String) {
    let mut offset = 0;
    for line in raw.split_inclusive('\n') {
        if is_separator(line) {
            let query = raw[..offset].trim().to_string();
            let settings = raw[offset + line.len()..].trim().to_string();
            return (query, settings);
        }
        offset += line.len();
    }
    (raw.trim().to_string(), String::new())
}

fn is_separator(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.len() >= 3 && trimmed.chars().all(|c| c == '-') {
        return true;
    }
    trimmed
        .get(..SETTINGS_MARKER.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(SETTINGS_MARKER))
}

fn is_comment(line: &str) -> bool {
    line.trim_start().starts_with("//")
}

/// First query-type keyword of the first non-comment line, if recognized.
pub fn detect_query_type(query: &str) -> Option<QueryType> {
    let line = query
        .lines()
        .find(|line| !line.trim().is_empty() && !is_comment(line))?;
    let word = line.split_whitespace().next()?;
    QueryType::from_keyword(word)
}

/// Insert `keyword` before the first non-comment line unless a query-type
/// keyword is already there. A query of only comments gets the keyword on
/// its own line in front of everything.
pub fn ensure_query_type(query: &str, keyword: QueryType) -> String {
    let mut offset = 0;
    for line in query.split_inclusive('\n') {
        if line.trim().is_empty() || is_comment(line) {
            offset += line.len();
            continue;
        }

        let first_word = line.split_whitespace().next().unwrap_or_default();
        if QueryType::from_keyword(first_word).is_some() {
            return query.to_string();
        }

        let indent = line.len() - line.trim_start().len();
        let insert_at = offset + indent;
        let mut out = String::with_capacity(query.len() + 8);
        out.push_str(&query[..insert_at]);
        out.push_str(keyword.as_str());
        out.push(' ');
        out.push_str(&query[insert_at..]);
        return out;
    }

    if query.trim().is_empty() {
        keyword.as_str().to_string()
    } else {
        format!("{}\n{}", keyword.as_str(), query)
    }
}

fn alias_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?is)^(.+?)\s+AS\s+(?:"([^"]*)"|'([^']*)'|(\S+))\s*$"#).expect("regex")
    })
}

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[\w.\-]+$").expect("regex"))
}

fn concat_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"\(\s*(?:"[^"]*"|'[^']*')\s*\+\s*([\w.\-]+)\s*\+\s*(?:"[^"]*"|'[^']*')\s*\)"#)
            .expect("regex")
    })
}

/// Extract `expression AS alias` declarations from a TABLE query's column list.
pub fn extract_aliases(query: &str) -> Vec<ColumnAlias> {
    let Some(columns) = column_list(query) else {
        return Vec::new();
    };

    let mut aliases = Vec::new();
    for column in split_top_level(&columns, ',') {
        let column = column.trim();
        if column.is_empty() {
            continue;
        }
        let Some(caps) = alias_pattern().captures(column) else {
            if column.split_whitespace().any(|word| word.eq_ignore_ascii_case("as")) {
                tracing::debug!("skipping column without a usable alias: {column}");
            }
            continue;
        };

        let expression = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
        let alias = caps
            .get(2)
            .or_else(|| caps.get(3))
            .or_else(|| caps.get(4))
            .map(|m| m.as_str().trim())
            .unwrap_or_default();

        if expression.is_empty() || alias.is_empty() {
            tracing::debug!("skipping malformed column alias: {column}");
            continue;
        }

        aliases.push(ColumnAlias {
            original: original_field(expression),
            alias: alias.to_string(),
            expression: expression.to_string(),
        });
    }
    aliases
}

fn original_field(expression: &str) -> String {
    if identifier_pattern().is_match(expression) {
        return expression.to_string();
    }
    concat_pattern()
        .captures(expression)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| expression.to_string())
}

/// Text between the TABLE keyword (and an optional `WITHOUT ID`) and the
/// first clause keyword, with comment lines removed.
fn column_list(query: &str) -> Option<String> {
    let body = query
        .lines()
        .filter(|line| !is_comment(line))
        .collect::<Vec<_>>()
        .join("\n");
    let rest = body.trim_start();

    let keyword = rest.split_whitespace().next()?;
    if QueryType::from_keyword(keyword) != Some(QueryType::Table) {
        return None;
    }
    let mut rest = rest[keyword.len()..].trim_start();
    if let Some(after) = strip_keyword(rest, "WITHOUT")
        && let Some(after_id) = strip_keyword(after.trim_start(), "ID")
    {
        rest = after_id;
    }

    let end = find_clause_start(rest);
    Some(rest[..end].to_string())
}

fn strip_keyword<'a>(text: &'a str, keyword: &str) -> Option<&'a str> {
    let head = text.get(..keyword.len())?;
    if !head.eq_ignore_ascii_case(keyword) {
        return None;
    }
    let rest = &text[keyword.len()..];
    match rest.chars().next() {
        None => Some(rest),
        Some(c) if c.is_whitespace() => Some(rest),
        _ => None,
    }
}

fn starts_with_clause(text: &str) -> bool {
    CLAUSE_KEYWORDS.iter().any(|clause| {
        let mut rest = text;
        for word in clause.split(' ') {
            match strip_keyword(rest, word) {
                Some(after) => rest = after.trim_start(),
                None => return false,
            }
        }
        true
    })
}

/// Byte offset of the first top-level clause keyword, or the text length.
fn find_clause_start(text: &str) -> usize {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut prev: Option<char> = None;

    for (i, c) in text.char_indices() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            prev = Some(c);
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            _ => {}
        }
        let at_word_start = prev.is_none_or(char::is_whitespace);
        if depth == 0 && at_word_start && c.is_alphabetic() && starts_with_clause(&text[i..]) {
            return i;
        }
        prev = Some(c);
    }
    text.len()
}

/// Split on `separator` outside parentheses, brackets, braces and quotes.
pub fn split_top_level(text: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (i, c) in text.char_indices() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            c if c == separator && depth == 0 => {
                parts.push(&text[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_hyphen_rule() {
        let (query, settings) = split_block("TABLE rating\nFROM #books\n---\npreset: grid\ncolumns: 2\n");
        assert_eq!(query, "TABLE rating\nFROM #books");
        assert_eq!(settings, "preset: grid\ncolumns: 2");
    }

    #[test]
    fn hyphen_split_loses_nothing() {
        let cases = [
            ("LIST", "preset: grid"),
            ("  TABLE a, b\nFROM \"x\"  ", "\n\ncolumns: 3\n"),
            ("TASK\nWHERE !completed", ""),
        ];
        for (before, after) in cases {
            for rule in ["---", "-----", "   ----   "] {
                let raw = format!("{before}\n{rule}\n{after}");
                let (query, settings) = split_block(&raw);
                assert_eq!(query, before.trim());
                assert_eq!(settings, after.trim());
            }
        }
    }

    #[test]
    fn splits_on_settings_marker_without_blank_line() {
        let (query, settings) = split_block("LIST FROM #a\n// Settings\npreset: dense");
        assert_eq!(query, "LIST FROM #a");
        assert_eq!(settings, "preset: dense");
    }

    #[test]
    fn settings_marker_may_be_first_line() {
        let (query, settings) = split_block("// settings:\npreset: dense");
        assert_eq!(query, "");
        assert_eq!(settings, "preset: dense");
    }

    #[test]
    fn no_separator_means_no_settings() {
        let (query, settings) = split_block("  LIST FROM #a  \n");
        assert_eq!(query, "LIST FROM #a");
        assert!(settings.is_empty());
    }

    #[test]
    fn short_hyphen_runs_are_not_separators() {
        let (query, settings) = split_block("LIST\n--\nWHERE x");
        assert_eq!(query, "LIST\n--\nWHERE x");
        assert!(settings.is_empty());
    }

    #[test]
    fn keyword_is_inserted_before_first_non_comment_line() {
        let query = ensure_query_type("// books\nFROM #books\nSORT rating", QueryType::List);
        assert_eq!(query, "// books\nLIST FROM #books\nSORT rating");
    }

    #[test]
    fn existing_keyword_is_kept() {
        let query = ensure_query_type("// books\ntable rating FROM #books", QueryType::List);
        assert_eq!(query, "// books\ntable rating FROM #books");
        assert_eq!(detect_query_type(&query), Some(QueryType::Table));
    }

    #[test]
    fn comment_only_query_gets_keyword_prepended() {
        assert_eq!(ensure_query_type("// nothing", QueryType::List), "LIST\n// nothing");
        assert_eq!(ensure_query_type("", QueryType::List), "LIST");
    }

    #[test]
    fn extracts_simple_and_quoted_aliases() {
        let aliases = extract_aliases(
            "TABLE rating AS \"Score\", author as 'Written by', pages AS Pages FROM #books",
        );
        assert_eq!(aliases.len(), 3);
        assert_eq!(aliases[0].original, "rating");
        assert_eq!(aliases[0].alias, "Score");
        assert_eq!(aliases[1].original, "author");
        assert_eq!(aliases[1].alias, "Written by");
        assert_eq!(aliases[2].alias, "Pages");
    }

    #[test]
    fn alias_split_ignores_commas_in_parens_and_quotes() {
        let aliases = extract_aliases(
            "TABLE WITHOUT ID choice(done, \"yes, done\", \"no\") AS \"Done, really\", join(tags, \", \") AS Tags\nFROM #tasks",
        );
        assert_eq!(aliases.len(), 2);
        assert_eq!(aliases[0].expression, "choice(done, \"yes, done\", \"no\")");
        assert_eq!(aliases[0].original, "choice(done, \"yes, done\", \"no\")");
        assert_eq!(aliases[0].alias, "Done, really");
        assert_eq!(aliases[1].expression, "join(tags, \", \")");
        assert_eq!(aliases[1].alias, "Tags");
    }

    #[test]
    fn recovers_field_from_concatenation() {
        let aliases = extract_aliases("TABLE (\"⭐ \" + rating + \"/5\") AS Stars WHERE rating > 3");
        assert_eq!(aliases.len(), 1);
        assert_eq!(aliases[0].original, "rating");
        assert_eq!(aliases[0].expression, "(\"⭐ \" + rating + \"/5\")");
    }

    #[test]
    fn clause_keywords_inside_strings_do_not_end_the_column_list() {
        let aliases = extract_aliases("TABLE (\"from \" + source + \"\") AS Origin, status AS State SORT file.name");
        assert_eq!(aliases.len(), 2);
        assert_eq!(aliases[0].original, "source");
        assert_eq!(aliases[1].alias, "State");
    }

    #[test]
    fn group_by_ends_the_column_list_but_group_field_does_not() {
        let aliases = extract_aliases("TABLE group AS G, x AS Y GROUP BY status");
        assert_eq!(aliases.len(), 2);
        assert_eq!(aliases[0].original, "group");
        assert_eq!(aliases[1].alias, "Y");
    }

    #[test]
    fn malformed_alias_is_skipped() {
        let aliases = extract_aliases("TABLE rating AS, pages AS \"\", title AS Name FROM #x");
        assert_eq!(aliases.len(), 1);
        assert_eq!(aliases[0].alias, "Name");

        assert!(extract_aliases("TABLE rating AS FROM #x").is_empty());
        assert!(extract_aliases("TABLE author, AS Score FROM #x").is_empty());
    }

    #[test]
    fn aliases_only_come_from_table_queries() {
        let parsed = parse_block("LIST rating AS Score FROM #books");
        assert_eq!(parsed.query_type, QueryType::List);
        assert!(parsed.aliases.is_empty());
    }

    #[test]
    fn parse_block_end_to_end() {
        let parsed = parse_block("// my books\nFROM #books\n---\npreset: portrait");
        assert_eq!(parsed.query, "// my books\nLIST FROM #books");
        assert_eq!(parsed.settings_text, "preset: portrait");
        assert_eq!(parsed.query_type, QueryType::List);

        let parsed = parse_block("TABLE rating AS Score\nFROM #books\n// settings\ncolumns: 2");
        assert_eq!(parsed.query_type, QueryType::Table);
        assert_eq!(parsed.aliases.len(), 1);
        assert_eq!(parsed.settings_text, "columns: 2");
    }
}
