//! 从模型文本中提取 JSON
//!
//! 先严格解析整段文本，失败后再定位第一个括号配平的子串（忽略字符串字面量内的括号）。

use serde_json::{Map, Value};

/// 返回从第一个 `open` 开始、括号配平的子串；字符串内的括号与转义字符不计入
pub fn balanced_span(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            c if c == open => depth += 1,
            c if c == close => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + ch.len_utf8();
                    return Some(&text[start..end]);
                }
            }
            _ => {}
        }
    }
    None
}

/// 去掉 ```json ... ``` 围栏
fn strip_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed;
    };
    let rest = &trimmed[start + 3..];
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim())
}

/// 提取第一个 JSON 对象
pub fn extract_json_object(text: &str) -> Option<Map<String, Value>> {
    let body = strip_fence(text);
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        return Some(map);
    }
    let span = balanced_span(body, '{', '}')?;
    match serde_json::from_str::<Value>(span) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// 提取 JSON 数组：严格解析 → 第一个配平的 `[...]`
pub fn extract_json_array(text: &str) -> Option<Vec<Value>> {
    if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(text.trim()) {
        return Some(items);
    }
    let span = balanced_span(text, '[', ']')?;
    match serde_json::from_str::<Value>(span) {
        Ok(Value::Array(items)) => Some(items),
        _ => None,
    }
}
