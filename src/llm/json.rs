//! 从 LLM 回复中提取 JSON
//!
//! 模型常把 JSON 包在 ```json 代码块里或前后夹杂说明文字，这里统一剥离后再反序列化。

use serde::de::DeserializeOwned;

/// 取出回复中的 JSON 片段：优先 ```json 代码块，其次第一个 `{`/`[` 到最后一个 `}`/`]`
pub fn extract_json(output: &str) -> Option<&str> {
    let trimmed = output.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return Some(rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim()));
    }

    let open = trimmed.find(|c: char| c == '{' || c == '[')?;
    let close = match trimmed.as_bytes()[open] {
        b'{' => trimmed.rfind('}')?,
        _ => trimmed.rfind(']')?,
    };
    (close >= open).then(|| &trimmed[open..=close])
}

/// 提取并反序列化；失败时返回带原文片段的错误描述
pub fn parse_json_reply<T: DeserializeOwned>(output: &str) -> Result<T, String> {
    let json = extract_json(output).ok_or_else(|| format!("no JSON found in reply: {}", preview(output)))?;
    serde_json::from_str(json).map_err(|e| format!("{e}: {}", preview(json)))
}

pub(crate) fn preview(s: &str) -> String {
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Verdict {
        route: String,
    }

    #[test]
    fn test_extract_fenced_block() {
        let raw = "Sure:\n```json\n{\"route\": \"modification\"}\n```\nDone.";
        assert_eq!(extract_json(raw), Some("{\"route\": \"modification\"}"));
    }

    #[test]
    fn test_extract_with_surrounding_text() {
        let raw = "The answer is {\"route\": \"exact_answer\"} as requested";
        let v: Verdict = parse_json_reply(raw).unwrap();
        assert_eq!(v.route, "exact_answer");
    }

    #[test]
    fn test_extract_array() {
        let raw = "[{\"route\": \"a\"}]";
        let v: Vec<Verdict> = parse_json_reply(raw).unwrap();
        assert_eq!(v.len(), 1);
    }

    #[test]
    fn test_no_json_is_error() {
        let err = parse_json_reply::<Verdict>("no structure here").unwrap_err();
        assert!(err.contains("no JSON"));
    }
}
