use crate::infrastructure::error::InfraError;
use serde_json::Value;

// Model output is prose-tolerant JSON: the payload may arrive wrapped in
// fenced code blocks, preceded by commentary, or littered with raw control
// characters. Extraction is kept separate from the network client so it can
// be tested against each malformed shape on its own.

pub fn extract_json_object(text: &str) -> Result<Value, InfraError> {
    let value = extract_json_value(text)?;
    if !value.is_object() {
        return Err(InfraError::Completion(
            "response did not contain a JSON object".to_string(),
        ));
    }
    Ok(value)
}

pub fn extract_json_array(text: &str) -> Result<Value, InfraError> {
    let value = extract_json_value(text)?;
    if !value.is_array() {
        return Err(InfraError::Completion(
            "response did not contain a JSON array".to_string(),
        ));
    }
    Ok(value)
}

pub fn extract_json_value(text: &str) -> Result<Value, InfraError> {
    let unfenced = strip_code_fences(text);
    let candidate = first_balanced_json(&unfenced).ok_or_else(|| {
        InfraError::Completion("no JSON object or array found in response".to_string())
    })?;
    let cleaned = replace_control_characters(candidate);
    serde_json::from_str(&cleaned)
        .map_err(|error| InfraError::Completion(format!("malformed JSON in response: {error}")))
}

fn strip_code_fences(text: &str) -> String {
    let fenced = if let Some(rest) = text.split("```json").nth(1) {
        rest.split("```").next()
    } else if let Some(rest) = text.split("```").nth(1) {
        rest.split("```").next()
    } else {
        None
    };
    fenced.unwrap_or(text).trim().to_string()
}

fn first_balanced_json(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let bytes = text.as_bytes();
    let open = bytes[start];
    let close = if open == b'{' { b'}' } else { b']' };

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, byte) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if *byte == b'\\' {
                escaped = true;
            } else if *byte == b'"' {
                in_string = false;
            }
            continue;
        }
        match *byte {
            b'"' => in_string = true,
            value if value == open => depth += 1,
            value if value == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

fn replace_control_characters(text: &str) -> String {
    text.chars()
        .map(|character| {
            if character.is_control() && character != '\n' && character != '\t' {
                ' '
            } else {
                character
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn extracts_plain_object() {
        let value = extract_json_object(r#"{"title": "Buy milk", "priority": "low"}"#)
            .expect("plain object");
        assert_eq!(value["title"], "Buy milk");
    }

    #[test]
    fn extracts_object_from_json_fence() {
        let text = "Here is your plan:\n```json\n{\"score\": 80}\n```\nGood luck!";
        let value = extract_json_object(text).expect("fenced object");
        assert_eq!(value["score"], 80);
    }

    #[test]
    fn extracts_object_from_bare_fence() {
        let text = "```\n{\"score\": 55}\n```";
        let value = extract_json_object(text).expect("bare fenced object");
        assert_eq!(value["score"], 55);
    }

    #[test]
    fn extracts_object_surrounded_by_prose() {
        let text = "Sure! The enhanced task is {\"title\": \"Plan sprint\"}. Let me know.";
        let value = extract_json_object(text).expect("object in prose");
        assert_eq!(value["title"], "Plan sprint");
    }

    #[test]
    fn braces_inside_strings_do_not_confuse_the_scan() {
        let text = r#"{"note": "use {curly} braces", "ok": true} trailing"#;
        let value = extract_json_object(text).expect("object with braces in string");
        assert_eq!(value["ok"], true);
    }

    #[test]
    fn escaped_quotes_inside_strings_are_handled() {
        let text = r#"{"note": "she said \"done\"", "ok": true}"#;
        let value = extract_json_object(text).expect("object with escaped quotes");
        assert_eq!(value["note"], "she said \"done\"");
    }

    #[test]
    fn control_characters_are_replaced() {
        let text = "{\"title\": \"line\u{0000}noise\u{0007}\"}";
        let value = extract_json_object(text).expect("object with control chars");
        assert_eq!(value["title"], "line noise ");
    }

    #[test]
    fn truncated_json_is_an_error() {
        let text = r#"{"title": "cut off"#;
        assert!(extract_json_object(text).is_err());
    }

    #[test]
    fn pure_prose_is_an_error() {
        assert!(extract_json_object("I could not produce a schedule today.").is_err());
    }

    #[test]
    fn array_extraction_rejects_objects() {
        assert!(extract_json_array(r#"{"not": "an array"}"#).is_err());
        let value = extract_json_array(r#"[1, 2, 3]"#).expect("array");
        assert_eq!(value.as_array().map(Vec::len), Some(3));
    }

    #[test]
    fn object_extraction_rejects_arrays() {
        assert!(extract_json_object(r#"["a", "b"]"#).is_err());
    }

    proptest! {
        #[test]
        fn any_embedded_object_survives_surrounding_prose(
            title in "[a-zA-Z0-9 ]{0,40}",
            score in 0u8..=100u8,
            prefix in "[a-zA-Z .,!]{0,60}",
            suffix in "[a-zA-Z .,!]{0,60}"
        ) {
            let payload = json!({"title": title, "score": score});
            let text = format!("{prefix}{payload}{suffix}");
            let value = extract_json_object(&text).expect("embedded object");
            prop_assert_eq!(value, payload);
        }
    }
}
