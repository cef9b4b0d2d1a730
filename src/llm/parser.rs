//! Extraction of fenced blocks (```` ```sql ... ``` ````) from free-form model
//! output. Pure functions only, so every malformed shape can be unit tested
//! without a model.

use regex::Regex;

/// Returns the trimmed inner text of the first block fenced with `tag`
/// (case-insensitive). Blocks for other tags and unterminated blocks are
/// ignored.
pub fn extract_fenced(text: &str, tag: &str) -> Option<String> {
    let pattern = format!(r"(?is)```{}\b\s*(.*?)```", regex::escape(tag));
    let re = Regex::new(&pattern).ok()?;

    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
}

/// The first ```` ```sql ```` block, or `None` when the model declined to
/// produce a query. An empty block counts as no query.
pub fn extract_sql(text: &str) -> Option<String> {
    extract_fenced(text, "sql").filter(|sql| !sql.is_empty())
}

/// The raw, lowercased contents of the first ```` ```viz ```` block.
pub fn extract_viz(text: &str) -> Option<String> {
    extract_fenced(text, "viz")
        .map(|tag| tag.to_lowercase())
        .filter(|tag| !tag.is_empty())
}
