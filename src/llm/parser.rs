//! SQL extraction from model responses.
//!
//! Models are instructed to return SQL in a ```sql fence, but in practice
//! responses arrive in several shapes. Extraction tries, in order:
//! a ```sql fence, a `SQL:` labeled line, a generic ``` fence, and
//! finally a bare statement starting with SELECT or WITH.

/// Result of parsing an LLM response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedResponse {
    /// Explanatory text around the SQL.
    pub text: String,
    /// Extracted SQL statement, if found.
    pub sql: Option<String>,
}

impl ParsedResponse {
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sql: None,
        }
    }

    pub fn with_sql(text: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sql: Some(sql.into()),
        }
    }
}

/// Extracts a SQL statement from a model response.
pub fn extract_sql(response: &str) -> ParsedResponse {
    if let Some((sql, rest)) = take_fenced_block(response, "sql") {
        return ParsedResponse::with_sql(rest.trim(), sql.trim());
    }

    if let Some(sql) = take_labeled_sql(response) {
        return ParsedResponse::with_sql(response.trim(), sql);
    }

    if let Some((block, rest)) = take_fenced_block(response, "") {
        if looks_like_sql(&block) {
            return ParsedResponse::with_sql(rest.trim(), block.trim());
        }
    }

    if let Some(sql) = take_bare_select(response) {
        return ParsedResponse::with_sql(response.trim(), sql);
    }

    ParsedResponse::text_only(response.trim())
}

/// Finds the first fenced code block for the given language, returning the
/// block content and the response with the block removed.
///
/// An empty `lang` matches only fences with no language specifier.
fn take_fenced_block(text: &str, lang: &str) -> Option<(String, String)> {
    let fence = format!("```{lang}");
    let mut search_from = 0;

    while let Some(rel) = text[search_from..].find(&fence) {
        let start = search_from + rel;
        let after_fence = start + fence.len();
        let content_start = text[after_fence..].find('\n').map(|i| after_fence + i + 1)?;

        // A bare ``` fence must not have a language tag after it.
        let tag = text[after_fence..content_start - 1].trim();
        if lang.is_empty() && !tag.is_empty() {
            search_from = content_start;
            continue;
        }

        let Some(end_rel) = text[content_start..].find("```") else {
            return None;
        };
        let content_end = content_start + end_rel;
        let block = text[content_start..content_end].to_string();

        let mut rest = String::new();
        rest.push_str(text[..start].trim_end());
        let after = text[content_end + 3..].trim_start();
        if !rest.is_empty() && !after.is_empty() {
            rest.push('\n');
        }
        rest.push_str(after);
        return Some((block, rest));
    }
    None
}

/// Handles `SQL: SELECT ...` and `Generated SQL:` followed by the query.
fn take_labeled_sql(text: &str) -> Option<String> {
    let mut lines = text.lines().peekable();
    while let Some(line) = lines.next() {
        let trimmed = line.trim();
        let lower = trimmed.to_lowercase();
        let label_end = if lower.starts_with("sql:") {
            4
        } else if lower.starts_with("generated sql:") {
            14
        } else {
            continue;
        };

        let inline = trimmed[label_end..].trim();
        if !inline.is_empty() {
            return Some(collect_statement(inline, &mut lines));
        }
        // Label on its own line; the statement starts on the next.
        if let Some(next) = lines.next() {
            let next = next.trim();
            if looks_like_sql(next) {
                return Some(collect_statement(next, &mut lines));
            }
        }
        return None;
    }
    None
}

/// Extends a statement across following lines until a terminator or a
/// line that is clearly prose.
fn collect_statement(first: &str, lines: &mut std::iter::Peekable<std::str::Lines>) -> String {
    let mut sql = first.to_string();
    while !sql.trim_end().ends_with(';') {
        let Some(next) = lines.peek() else { break };
        let next = next.trim();
        if next.is_empty() || next.starts_with("```") {
            break;
        }
        sql.push(' ');
        sql.push_str(next);
        lines.next();
    }
    sql.trim().trim_end_matches(';').trim().to_string()
}

fn take_bare_select(text: &str) -> Option<String> {
    let mut lines = text.lines().peekable();
    while let Some(line) = lines.next() {
        let trimmed = line.trim();
        if looks_like_sql(trimmed) {
            return Some(collect_statement(trimmed, &mut lines));
        }
    }
    None
}

fn looks_like_sql(text: &str) -> bool {
    let upper = text.trim_start().to_uppercase();
    upper.starts_with("SELECT") || upper.starts_with("WITH")
}
