//! Best-effort JSON extraction from LLM replies: providers routinely wrap
//! the JSON payload in prose or code fences, so this pulls out the first
//! balanced `{...}` substring before handing it to `serde_json`.

/// Finds the first balanced-brace substring and parses it as JSON.
/// Returns `None` if no balanced substring exists or it doesn't parse.
pub fn extract_json(raw: &str) -> Option<serde_json::Value> {
    let start = raw.find('{')?;
    let bytes = raw.as_bytes();
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        let ch = byte as char;
        if escape {
            escape = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + 1;
                    return serde_json::from_str(&raw[start..end]).ok();
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_json_surrounded_by_prose() {
        let raw = "Sure, here you go:\n{\"name\": \"tech\"}\nHope that helps!";
        let value = extract_json(raw).unwrap();
        assert_eq!(value["name"], "tech");
    }

    #[test]
    fn handles_nested_braces() {
        let raw = r#"{"outer": {"inner": 1}}"#;
        let value = extract_json(raw).unwrap();
        assert_eq!(value["outer"]["inner"], 1);
    }

    #[test]
    fn ignores_braces_inside_strings() {
        let raw = r#"{"text": "a } b { c"}"#;
        let value = extract_json(raw).unwrap();
        assert_eq!(value["text"], "a } b { c");
    }

    #[test]
    fn no_json_returns_none() {
        assert!(extract_json("no json here").is_none());
    }
}
