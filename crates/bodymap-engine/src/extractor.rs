//! 发现提取器
//!
//! 按坐标目录中的部位键在检查文本里做词法匹配，每个部位最多产生一条发现。

use bodymap_core::utils::{term_regex, truncate_chars};
use bodymap_core::{CoordinateCatalog, Finding};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, warn};

/// 发现排序方式
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FindingOrder {
    /// 按坐标目录键顺序
    #[default]
    Catalog,
    /// 按在文本中首次出现的位置
    Document,
}

/// 提取器配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExtractorConfig {
    /// 句子短于此字符数时视为噪声
    pub min_sentence_chars: usize,
    /// 描述片段最大字符数
    pub snippet_max_chars: usize,
    /// 图例标签最大字符数
    pub legend_max_chars: usize,
    pub order: FindingOrder,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            min_sentence_chars: 5,
            snippet_max_chars: 100,
            legend_max_chars: 40,
            order: FindingOrder::Catalog,
        }
    }
}

/// 文本中的一个句子
struct Sentence<'a> {
    text: &'a str,
    chars: usize,
    offset: usize,
}

fn split_sentences(text: &str) -> Vec<Sentence<'_>> {
    let mut sentences = Vec::new();
    let mut start = 0;

    for (index, c) in text.char_indices() {
        if matches!(c, '.' | '!' | '?' | '\n') {
            push_sentence(&mut sentences, text, start, index);
            start = index + c.len_utf8();
        }
    }
    push_sentence(&mut sentences, text, start, text.len());
    sentences
}

fn push_sentence<'a>(sentences: &mut Vec<Sentence<'a>>, text: &'a str, start: usize, end: usize) {
    let raw = &text[start..end];
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return;
    }
    let leading = raw.len() - raw.trim_start().len();
    sentences.push(Sentence {
        text: trimmed,
        chars: trimmed.chars().count(),
        offset: start + leading,
    });
}

/// 部位键的词法变体
///
/// `left_knee` 生成 `left knee`、`left_knee`、`lt knee`。
pub fn body_part_variants(key: &str) -> Vec<String> {
    let key = key.trim().to_lowercase();
    let spaced = key.replace('_', " ");
    let mut variants = vec![spaced.clone()];
    if key != spaced {
        variants.push(key.clone());
    }

    for (side, abbreviation) in [("left ", "lt "), ("right ", "rt ")] {
        if let Some(part) = spaced.strip_prefix(side) {
            variants.push(format!("{}{}", abbreviation, part));
        }
    }
    variants.retain(|variant| !variant.is_empty());
    variants
}

/// 发现提取器
///
/// 每个部位键的变体模式只编译一次，克隆出的提取器共享这份缓存。
#[derive(Debug, Clone, Default)]
pub struct FindingExtractor {
    config: ExtractorConfig,
    patterns: Arc<RwLock<HashMap<String, Arc<Vec<Regex>>>>>,
}

impl FindingExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self {
            config,
            patterns: Arc::default(),
        }
    }

    /// 部位键各变体的匹配模式，顺序与 [`body_part_variants`] 一致
    fn variant_patterns(&self, body_part: &str) -> Arc<Vec<Regex>> {
        if let Some(patterns) = self
            .patterns
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(body_part)
        {
            return patterns.clone();
        }

        let mut compiled = Vec::new();
        for variant in body_part_variants(body_part) {
            match term_regex(&[variant.as_str()]) {
                Ok(pattern) => compiled.push(pattern),
                Err(e) => warn!("Skipping variant {:?} of {}: {}", variant, body_part, e),
            }
        }
        let compiled = Arc::new(compiled);
        self.patterns
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(body_part.to_string(), compiled.clone());
        compiled
    }

    /// 已编译模式的部位键数量
    pub fn cached_patterns(&self) -> usize {
        self.patterns.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// 从文本中提取发现
    ///
    /// 只输出目录中存在的部位键；没有命中时返回空列表。
    pub fn extract(&self, text: &str, catalog: &CoordinateCatalog) -> Vec<Finding> {
        let sentences = split_sentences(text);
        if sentences.is_empty() {
            return Vec::new();
        }

        let mut located: Vec<(usize, Finding)> = Vec::new();
        for entry in catalog.entries() {
            // 每个变体只看第一个包含它的句子，句子过短则换下一个变体
            let patterns = self.variant_patterns(&entry.body_part);
            let hit = patterns.iter().find_map(|pattern| {
                let (sentence, start) = sentences
                    .iter()
                    .find_map(|sentence| pattern.find(sentence.text).map(|m| (sentence, m.start())))?;
                if sentence.chars < self.config.min_sentence_chars {
                    debug!("Skipping short sentence {:?} for {}", sentence.text, entry.body_part);
                    return None;
                }
                Some((sentence.text, sentence.offset + start))
            });

            if let Some((sentence, position)) = hit {
                debug!("Found {} at offset {}", entry.body_part, position);
                located.push((
                    position,
                    Finding {
                        body_part: entry.body_part.clone(),
                        description: truncate_chars(sentence, self.config.snippet_max_chars),
                        reference_coordinate: entry.coordinate,
                    },
                ));
            }
        }

        if self.config.order == FindingOrder::Document {
            located.sort_by_key(|(position, _)| *position);
        }

        debug!(
            "Extracted {} findings against catalog {}",
            located.len(),
            catalog.diagram_key
        );
        located.into_iter().map(|(_, finding)| finding).collect()
    }
}
