//! 关键词规则表
//!
//! 每条规则描述一个类别的关键词、命中后加分的目标视图以及权重。
//! 分类器只通过 [`RuleTable::evaluate`] 一个折叠函数使用这些规则。

use bodymap_core::utils::term_set;
use bodymap_core::{ExamField, ExaminationInput, ViewType};
use regex::RegexSet;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// 规则类别
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum RuleCategory {
    Cardiovascular,     // 心血管
    Respiratory,        // 呼吸
    Abdominal,          // 腹部
    Inguinal,           // 腹股沟及泌尿生殖
    Posterior,          // 脊柱及背部
    Musculoskeletal,    // 骨骼肌肉
    Dermatological,     // 皮肤
    LateralityLeft,     // 左侧方位词
    LateralityRight,    // 右侧方位词
    GeneralExamination, // 一般检查
}

impl RuleCategory {
    pub fn label(&self) -> &'static str {
        match self {
            RuleCategory::Cardiovascular => "Cardiovascular",
            RuleCategory::Respiratory => "Respiratory",
            RuleCategory::Abdominal => "Abdominal",
            RuleCategory::Inguinal => "Inguinal/genitourinary",
            RuleCategory::Posterior => "Spinal/posterior",
            RuleCategory::Musculoskeletal => "Musculoskeletal",
            RuleCategory::Dermatological => "Dermatological",
            RuleCategory::LateralityLeft => "Left laterality",
            RuleCategory::LateralityRight => "Right laterality",
            RuleCategory::GeneralExamination => "General examination",
        }
    }
}

/// 规则匹配方式
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RuleMatcher {
    /// 关键词集合，按命中的不同关键词计数
    Keywords(Vec<String>),
    /// 单个完整词项
    Term(String),
    /// 指定字段有内容
    FieldPresent(ExamField),
}

/// 计分方式
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RuleScoring {
    /// 命中数 × 权重
    PerMatch,
    /// 命中即加固定权重
    Fixed,
}

/// 关键词规则
///
/// 词项在创建时编译为 [`RegexSet`]，评估时只做一次扫描。
#[derive(Debug, Clone)]
pub struct KeywordRule {
    pub category: RuleCategory,
    pub matcher: RuleMatcher,
    pub targets: Vec<ViewType>,
    pub weight: f64,
    pub scoring: RuleScoring,
    pattern: Option<RegexSet>,
}

/// 单条规则的命中结果
#[derive(Debug, Clone, PartialEq)]
pub struct RuleMatch {
    pub category: RuleCategory,
    pub matched: Vec<String>,
    pub contribution: f64,
}

impl RuleMatch {
    /// 可读的理由说明，最多列出三个命中的关键词
    pub fn reasoning(&self) -> String {
        match self.category {
            RuleCategory::GeneralExamination => "General examination documented".to_string(),
            RuleCategory::LateralityLeft | RuleCategory::LateralityRight => {
                format!("{} term present: {}", self.category.label(), self.matched.join(", "))
            }
            _ => {
                let shown: Vec<&str> = self.matched.iter().take(3).map(String::as_str).collect();
                format!(
                    "{} keywords ({}): {}",
                    self.category.label(),
                    self.matched.len(),
                    shown.join(", ")
                )
            }
        }
    }
}

impl KeywordRule {
    pub fn new(
        category: RuleCategory,
        matcher: RuleMatcher,
        targets: Vec<ViewType>,
        weight: f64,
        scoring: RuleScoring,
    ) -> Self {
        let pattern = compile_terms(category, &matcher);
        Self {
            category,
            matcher,
            targets,
            weight,
            scoring,
            pattern,
        }
    }

    pub fn keywords(
        category: RuleCategory,
        keywords: &[&str],
        target: ViewType,
        weight: f64,
    ) -> Self {
        Self::new(
            category,
            RuleMatcher::Keywords(keywords.iter().map(|k| k.to_string()).collect()),
            vec![target],
            weight,
            RuleScoring::PerMatch,
        )
    }

    pub fn term(category: RuleCategory, term: &str, target: ViewType, weight: f64) -> Self {
        Self::new(
            category,
            RuleMatcher::Term(term.to_string()),
            vec![target],
            weight,
            RuleScoring::Fixed,
        )
    }

    pub fn field_present(category: RuleCategory, field: ExamField, target: ViewType, weight: f64) -> Self {
        Self::new(
            category,
            RuleMatcher::FieldPresent(field),
            vec![target],
            weight,
            RuleScoring::Fixed,
        )
    }

    /// 评估规则，匹配不区分大小写
    pub fn evaluate(&self, search_text: &str, input: &ExaminationInput) -> Option<RuleMatch> {
        let matched: Vec<String> = match &self.matcher {
            RuleMatcher::Keywords(_) | RuleMatcher::Term(_) => match &self.pattern {
                Some(pattern) => {
                    let terms = matcher_terms(&self.matcher);
                    pattern
                        .matches(search_text)
                        .into_iter()
                        .filter_map(|index| terms.get(index).cloned())
                        .collect()
                }
                None => Vec::new(),
            },
            RuleMatcher::FieldPresent(field) => match input.field(*field) {
                Some(_) => vec![format!("{:?}", field).to_lowercase()],
                None => Vec::new(),
            },
        };

        if matched.is_empty() {
            return None;
        }

        let contribution = match self.scoring {
            RuleScoring::PerMatch => matched.len() as f64 * self.weight,
            RuleScoring::Fixed => self.weight,
        };

        Some(RuleMatch {
            category: self.category,
            matched,
            contribution,
        })
    }
}

fn matcher_terms(matcher: &RuleMatcher) -> &[String] {
    match matcher {
        RuleMatcher::Keywords(keywords) => keywords.as_slice(),
        RuleMatcher::Term(term) => std::slice::from_ref(term),
        RuleMatcher::FieldPresent(_) => &[],
    }
}

/// 编译规则词项，失败的规则被禁用而不是中断分类
fn compile_terms(category: RuleCategory, matcher: &RuleMatcher) -> Option<RegexSet> {
    let terms = matcher_terms(matcher);
    if terms.is_empty() {
        return None;
    }
    match term_set(terms) {
        Ok(pattern) => Some(pattern),
        Err(e) => {
            warn!("Disabling {:?} rule: {}", category, e);
            None
        }
    }
}

/// 规则表
#[derive(Debug, Clone)]
pub struct RuleTable {
    rules: Vec<KeywordRule>,
}

impl RuleTable {
    pub fn new(rules: Vec<KeywordRule>) -> Self {
        Self { rules }
    }

    /// 标准规则表
    pub fn standard() -> Self {
        use RuleCategory::*;

        Self::new(vec![
            KeywordRule::keywords(
                Cardiovascular,
                &[
                    "heart", "heart sounds", "cardiac", "murmur", "murmurs", "s1", "s2", "s3",
                    "s4", "gallop", "pericardial rub", "pulse", "pulses", "tachycardia",
                    "bradycardia", "palpitations", "jvp", "jugular", "apex beat", "carotid",
                    "bruit", "regular rhythm", "irregular rhythm", "capillary refill",
                ],
                ViewType::Cardiorespiratory,
                2.0,
            ),
            KeywordRule::keywords(
                Respiratory,
                &[
                    "lung", "lungs", "breath sounds", "auscultation", "wheeze", "wheezes",
                    "wheezing", "crackles", "rales", "rhonchi", "dyspnea", "dyspnoea", "cough",
                    "respiratory", "air entry", "stridor", "pleural", "chest expansion",
                    "percussion note", "tachypnea", "trachea",
                ],
                ViewType::Cardiorespiratory,
                2.0,
            ),
            KeywordRule::keywords(
                Abdominal,
                &[
                    "abdomen", "abdominal", "bowel sounds", "liver", "spleen", "hepatomegaly",
                    "splenomegaly", "epigastric", "epigastrium", "umbilical", "umbilicus",
                    "guarding", "rebound", "distension", "distended", "organomegaly", "ruq",
                    "luq", "rlq", "llq", "upper quadrant", "lower quadrant", "murphy",
                    "mcburney",
                ],
                ViewType::AbdominalInguinal,
                2.0,
            ),
            KeywordRule::keywords(
                Inguinal,
                &[
                    "inguinal", "groin", "hernia", "scrotal", "scrotum", "testes", "testicular",
                    "suprapubic", "femoral", "genital", "adnexal", "pelvic",
                ],
                ViewType::AbdominalInguinal,
                2.0,
            ),
            KeywordRule::keywords(
                Posterior,
                &[
                    "spine", "spinal", "back", "lumbar", "thoracic spine", "cervical spine",
                    "sacral", "sacrum", "coccyx", "scapula", "scapular", "paraspinal",
                    "costovertebral", "cva", "buttock", "buttocks", "posterior", "vertebral",
                ],
                ViewType::Back,
                2.0,
            ),
            KeywordRule::keywords(
                Musculoskeletal,
                &[
                    "knee", "shoulder", "elbow", "wrist", "hip", "ankle", "joint", "joints",
                    "swelling", "swollen", "fracture", "deformity", "range of motion", "arm",
                    "leg", "hand", "foot", "thigh", "calf", "effusion",
                ],
                ViewType::Front,
                1.0,
            ),
            KeywordRule::keywords(
                Dermatological,
                &[
                    "rash", "lesion", "lesions", "wound", "scar", "bruise", "bruising",
                    "laceration", "erythema", "ulcer", "abrasion", "cellulitis",
                ],
                ViewType::Front,
                1.0,
            ),
            KeywordRule::term(LateralityLeft, "left", ViewType::LeftSide, 2.0),
            KeywordRule::term(LateralityRight, "right", ViewType::RightSide, 2.0),
            KeywordRule::field_present(GeneralExamination, ExamField::General, ViewType::Front, 0.5),
        ])
    }

    /// 覆盖某一类别所有规则的权重
    pub fn with_weight(mut self, category: RuleCategory, weight: f64) -> Self {
        for rule in self.rules.iter_mut().filter(|rule| rule.category == category) {
            rule.weight = weight;
        }
        self
    }

    pub fn rules(&self) -> &[KeywordRule] {
        &self.rules
    }

    /// 对所有规则做一次折叠，返回每个视图的加分和理由
    pub fn evaluate(&self, search_text: &str, input: &ExaminationInput) -> Vec<(ViewType, RuleMatch)> {
        self.rules.iter().fold(Vec::new(), |mut acc, rule| {
            if let Some(rule_match) = rule.evaluate(search_text, input) {
                debug!(
                    "Rule {:?} matched {:?} (+{})",
                    rule.category,
                    rule_match.matched,
                    rule_match.contribution
                );
                for target in &rule.targets {
                    acc.push((*target, rule_match.clone()));
                }
            }
            acc
        })
    }
}

impl Default for RuleTable {
    fn default() -> Self {
        Self::standard()
    }
}
