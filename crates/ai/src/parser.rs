//! Recovering structured values from free-form completions.
//!
//! Models wrap answers in markdown fences, add a sentence of preamble, or trail
//! off with an offer to help further. These helpers strip that noise and report a
//! [`ParseError`] when nothing usable is left; they never panic.

use serde_json::{Map, Value};
use shopcast_core::ParseError;

/// Remove markdown code fences and surrounding whitespace.
pub fn strip_fences(text: &str) -> String {
    let trimmed = text.trim();
    let mut body = trimmed;

    if trimmed.starts_with("```") {
        if let Some(newline) = trimmed.find('\n') {
            body = &trimmed[newline + 1..];
            let tail = body.trim_end();
            if let Some(stripped) = tail.strip_suffix("```") {
                body = stripped;
            }
        }
    }

    body.replace("```json", "")
        .replace("```sql", "")
        .replace("```", "")
        .trim()
        .to_string()
}

/// Parse the first JSON object found in `text`.
pub fn extract_json_object(text: &str) -> Result<Map<String, Value>, ParseError> {
    let cleaned = strip_fences(text);
    if cleaned.is_empty() {
        return Err(ParseError::Empty);
    }

    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&cleaned) {
        return Ok(map);
    }

    let candidate = first_balanced_object(&cleaned).ok_or(ParseError::NoJsonObject)?;
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ParseError::NoJsonObject),
        Err(e) => Err(ParseError::InvalidJson(e.to_string())),
    }
}

/// Slice from the first `{` to its matching `}`, skipping braces inside strings.
fn first_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Pull a reporting query (text starting with `FROM`) out of a completion.
///
/// With several paragraphs, the first one starting with `FROM` wins. Otherwise
/// everything before the first `FROM` is dropped. Trailing statement terminators
/// are removed.
pub fn extract_query(text: &str) -> Result<String, ParseError> {
    let normalized = text.replace("\r\n", "\n");
    let cleaned = strip_fences(&normalized);
    if cleaned.is_empty() {
        return Err(ParseError::Empty);
    }

    let mut query = cleaned.as_str();
    if query.contains("\n\n") {
        if let Some(paragraph) = query
            .split("\n\n")
            .map(str::trim)
            .find(|p| starts_with_from(p))
        {
            query = paragraph;
        }
    }

    if !starts_with_from(query) {
        let at = find_ignore_ascii_case(query, "FROM").ok_or(ParseError::NoQuery)?;
        query = &query[at..];
    }

    Ok(query.trim().trim_end_matches(|c: char| c == ';' || c.is_whitespace()).to_string())
}

fn starts_with_from(text: &str) -> bool {
    text.len() >= 4 && text.as_bytes()[..4].eq_ignore_ascii_case(b"FROM")
}

fn find_ignore_ascii_case(haystack: &str, needle: &str) -> Option<usize> {
    let needle = needle.as_bytes();
    haystack
        .as_bytes()
        .windows(needle.len())
        .position(|w| w.eq_ignore_ascii_case(needle))
}

/// At most `max_chars` characters of `text`, cut on a char boundary.
pub fn truncate_for_log(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => text[..end].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fences_with_language_tags_are_removed() {
        assert_eq!(strip_fences("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_fences("```sql\nFROM orders SHOW x\n```\n"), "FROM orders SHOW x");
        assert_eq!(strip_fences("  plain text  "), "plain text");
        assert_eq!(strip_fences("```{\"a\":1}```"), "{\"a\":1}");
    }

    #[test]
    fn json_is_found_behind_preamble() {
        let text = "Sure! Here is the classification:\n{\"domain\": \"inventory_status\", \"note\": \"uses {braces}\"}\nHope this helps.";
        let map = extract_json_object(text).unwrap();
        assert_eq!(map["domain"], json!("inventory_status"));
        assert_eq!(map["note"], json!("uses {braces}"));
    }

    #[test]
    fn escaped_quotes_do_not_end_strings() {
        let map = extract_json_object(r#"x {"summary": "say \"hi\" }", "n": 2} y"#).unwrap();
        assert_eq!(map["n"], json!(2));
    }

    #[test]
    fn json_failures_are_reported_not_panicked() {
        assert_eq!(extract_json_object("   "), Err(ParseError::Empty));
        assert_eq!(extract_json_object("no braces at all"), Err(ParseError::NoJsonObject));
        assert_eq!(extract_json_object("{\"truncated\": "), Err(ParseError::NoJsonObject));
        assert!(matches!(
            extract_json_object("{\"a\": 1,}"),
            Err(ParseError::InvalidJson(_))
        ));
    }

    #[test]
    fn query_paragraph_is_selected_from_chatty_output() {
        let text = "Here is the query:\n\nFROM orders SHOW product_name\n\nLet me know if you need more.";
        assert_eq!(extract_query(text).unwrap(), "FROM orders SHOW product_name");
    }

    #[test]
    fn leading_prose_is_cut_at_from() {
        assert_eq!(
            extract_query("The query is: from products SHOW product_name").unwrap(),
            "from products SHOW product_name"
        );
        assert_eq!(
            extract_query("```sql\nFROM customers SHOW customer_email\n```").unwrap(),
            "FROM customers SHOW customer_email"
        );
    }

    #[test]
    fn trailing_terminators_are_dropped() {
        assert_eq!(
            extract_query("FROM orders SHOW product_name LIMIT 3;").unwrap(),
            "FROM orders SHOW product_name LIMIT 3"
        );
        assert_eq!(
            extract_query("```sql\nFROM products SHOW sku ; \n```").unwrap(),
            "FROM products SHOW sku"
        );
    }

    #[test]
    fn text_without_from_is_not_a_query() {
        assert_eq!(extract_query(""), Err(ParseError::Empty));
        assert_eq!(extract_query("I cannot answer that."), Err(ParseError::NoQuery));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_for_log("héllo wörld", 4), "héll");
        assert_eq!(truncate_for_log("short", 100), "short");
        assert_eq!(truncate_for_log("", 3), "");
    }
}
