//! 通用文本工具函数

use crate::error::{BodyMapError, Result};
use regex::{Regex, RegexBuilder, RegexSet, RegexSetBuilder};

/// 把一组词项编译为一个完整词匹配模式，忽略大小写
///
/// 任一词项命中即匹配，两端需为词边界，因此 `ear` 不会匹配 `heart`。
pub fn term_regex<S: AsRef<str>>(terms: &[S]) -> Result<Regex> {
    let alternatives: Vec<String> = terms
        .iter()
        .map(|term| term.as_ref().trim())
        .filter(|term| !term.is_empty())
        .map(regex::escape)
        .collect();
    if alternatives.is_empty() {
        return Err(BodyMapError::Validation("term pattern needs at least one term".to_string()));
    }

    let pattern = RegexBuilder::new(&format!(r"\b(?:{})\b", alternatives.join("|")))
        .case_insensitive(true)
        .build()?;
    Ok(pattern)
}

/// 为每个词项编译独立的完整词模式，用于统计命中了哪些词项
///
/// 集合下标与 `terms` 一一对应，不接受空词项。
pub fn term_set<S: AsRef<str>>(terms: &[S]) -> Result<RegexSet> {
    let mut patterns = Vec::with_capacity(terms.len());
    for term in terms {
        let term = term.as_ref().trim();
        if term.is_empty() {
            return Err(BodyMapError::Validation("term set contains an empty term".to_string()));
        }
        patterns.push(format!(r"\b{}\b", regex::escape(term)));
    }
    let set = RegexSetBuilder::new(patterns).case_insensitive(true).build()?;
    Ok(set)
}

/// 按字符数截断，超长时以省略号结尾
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    if max_chars == 0 {
        return String::new();
    }

    let kept: String = text.chars().take(max_chars - 1).collect();
    format!("{}…", kept.trim_end())
}

/// 将目录键转换为可读名称
pub fn humanize_key(key: &str) -> String {
    let spaced = key.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
