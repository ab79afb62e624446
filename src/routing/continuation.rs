//! 续跑信号识别：本地规则匹配，不调用 LLM

/// 视为「继续执行计划」的短语（已归一化为小写、去掉首尾标点）
const CONTINUATION_PHRASES: &[&str] = &[
    "continue",
    "go on",
    "go ahead",
    "proceed",
    "next",
    "next step",
    "resume",
    "keep going",
    "carry on",
    "retry",
    "try again",
    "yes",
    "y",
    "yep",
    "yeah",
    "ok",
    "okay",
    "sure",
    "do it",
    "继续",
    "下一步",
    "好的",
    "好",
    "可以",
    "是",
    "重试",
];

/// 用户输入是否为续跑信号
pub fn is_continuation_signal(input: &str) -> bool {
    let normalized = input
        .trim()
        .trim_matches(|c: char| c.is_ascii_punctuation() || "。！，？".contains(c))
        .trim()
        .to_lowercase();
    if normalized.is_empty() {
        return false;
    }
    let normalized = normalized.strip_suffix(" please").unwrap_or(&normalized);
    let normalized = normalized.strip_prefix("please ").unwrap_or(normalized);
    CONTINUATION_PHRASES.contains(&normalized)
}
