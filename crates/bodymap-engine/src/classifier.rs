//! 内容分类器
//!
//! 根据检查记录文本为每个候选视图打分，选出主视图、备选视图和置信度。
//! 纯函数，没有 I/O。

use crate::rules::{RuleCategory, RuleTable};
use bodymap_core::{AnalysisResult, DiagramConfig, ExaminationInput, ScoredCandidate, ViewType};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// 最低置信度
pub const FLOOR_CONFIDENCE: f64 = 0.5;

/// 备选视图数量的硬上限
pub const MAX_SECONDARY: usize = 2;

/// 分类器配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClassifierConfig {
    /// 正面视图的基础分
    pub front_base_score: f64,
    /// 出现 left/right 时对应侧面视图的加分
    pub laterality_bonus: f64,
    /// 一般检查有内容时正面视图的加分
    pub general_exam_bonus: f64,
    /// 每一分领先优势对应的置信度增量
    pub confidence_step: f64,
    /// 置信度上限
    pub max_confidence: f64,
    /// 备选视图数量上限，不超过 [`MAX_SECONDARY`]
    pub max_secondary: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            front_base_score: 1.0,
            laterality_bonus: 2.0,
            general_exam_bonus: 0.5,
            confidence_step: 0.05,
            max_confidence: 0.9,
            max_secondary: 2,
        }
    }
}

/// 内容分类器
#[derive(Debug, Clone)]
pub struct ContentClassifier {
    rules: RuleTable,
    config: ClassifierConfig,
}

impl ContentClassifier {
    /// 使用标准规则表创建分类器
    pub fn new(config: ClassifierConfig) -> Self {
        let rules = RuleTable::standard()
            .with_weight(RuleCategory::LateralityLeft, config.laterality_bonus)
            .with_weight(RuleCategory::LateralityRight, config.laterality_bonus)
            .with_weight(RuleCategory::GeneralExamination, config.general_exam_bonus);
        Self { rules, config }
    }

    /// 使用自定义规则表，配置中的加分项不再覆盖规则权重
    pub fn with_rules(rules: RuleTable, config: ClassifierConfig) -> Self {
        Self { rules, config }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// 对检查记录分类
    ///
    /// 不会失败：没有任何命中时返回正面视图，置信度为 0.5。
    pub fn classify(&self, input: &ExaminationInput) -> AnalysisResult {
        let search_text = input.combined_text();

        let mut candidates: Vec<ScoredCandidate> = ViewType::all()
            .into_iter()
            .map(|view_type| ScoredCandidate {
                view_type,
                score: if view_type == ViewType::Front {
                    self.config.front_base_score
                } else {
                    0.0
                },
                evidence: 0.0,
                reasoning: Vec::new(),
            })
            .collect();

        for (view_type, rule_match) in self.rules.evaluate(&search_text, input) {
            if let Some(candidate) = candidates.iter_mut().find(|c| c.view_type == view_type) {
                candidate.score += rule_match.contribution;
                candidate.evidence += rule_match.contribution;
                candidate.reasoning.push(rule_match.reasoning());
            }
        }

        // 稳定排序，同分时保持枚举顺序
        candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

        let top = &candidates[0];
        let second_evidence = candidates.get(1).map_or(0.0, |c| c.evidence);
        let margin = (top.evidence - second_evidence).max(0.0);
        let confidence = (FLOOR_CONFIDENCE + margin * self.config.confidence_step)
            .min(self.config.max_confidence)
            .max(FLOOR_CONFIDENCE);

        let primary_diagram = DiagramConfig::for_view(input.sex, top.view_type);
        let secondary_diagrams: Vec<DiagramConfig> = candidates
            .iter()
            .skip(1)
            .filter(|c| c.score > 0.0)
            .take(self.config.max_secondary.min(MAX_SECONDARY))
            .map(|c| DiagramConfig::for_view(input.sex, c.view_type))
            .collect();

        let mut reasoning = top.reasoning.clone();
        if reasoning.is_empty() {
            reasoning.push(format!(
                "No view-specific findings matched; using default {} view",
                top.view_type.slug()
            ));
        }

        for candidate in &candidates {
            debug!(
                "Candidate {:?}: score {:.2}, evidence {:.2}",
                candidate.view_type, candidate.score, candidate.evidence
            );
        }
        info!(
            "Selected {} view (confidence {:.2}, {} alternates)",
            primary_diagram.coordinate_key,
            confidence,
            secondary_diagrams.len()
        );

        AnalysisResult {
            primary_diagram,
            secondary_diagrams,
            confidence,
            reasoning,
            scores: candidates,
        }
    }
}

impl Default for ContentClassifier {
    fn default() -> Self {
        Self::new(ClassifierConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bodymap_core::{ExamField, Sex};

    fn score_of(result: &AnalysisResult, view_type: ViewType) -> f64 {
        result
            .scores
            .iter()
            .find(|c| c.view_type == view_type)
            .map(|c| c.score)
            .unwrap()
    }

    #[test]
    fn test_empty_input_defaults_to_front() {
        let classifier = ContentClassifier::default();
        let result = classifier.classify(&ExaminationInput::empty(Sex::Male));

        assert_eq!(result.primary_diagram.view_type, ViewType::Front);
        assert_eq!(result.confidence, 0.5);
        assert!(result.secondary_diagrams.is_empty());
        assert_eq!(result.reasoning.len(), 1);
    }

    #[test]
    fn test_empty_female_input_uses_female_front() {
        let result = ContentClassifier::default().classify(&ExaminationInput::empty(Sex::Female));

        assert_eq!(result.primary_diagram, DiagramConfig::for_view(Sex::Female, ViewType::Front));
        assert_eq!(result.confidence, 0.5);
    }

    #[test]
    fn test_cardiorespiratory_scenario() {
        let input = ExaminationInput::empty(Sex::Male).with_field(
            ExamField::Cardiovascular,
            "Heart sounds S1 S2 normal, no murmurs. Lungs clear to auscultation.",
        );
        let result = ContentClassifier::default().classify(&input);

        assert_eq!(result.primary_diagram.view_type, ViewType::Cardiorespiratory);
        assert!(result.confidence > 0.5);
        assert!(result.confidence <= 0.9);
        assert!(score_of(&result, ViewType::Cardiorespiratory) > score_of(&result, ViewType::AbdominalInguinal));
        assert_eq!(result.secondary_diagrams.len(), 1);
        assert_eq!(result.secondary_diagrams[0].view_type, ViewType::Front);
    }

    #[test]
    fn test_cardio_keyword_beats_abdominal_without_abdominal_keywords() {
        let input = ExaminationInput::empty(Sex::Female).with_field(ExamField::Respiratory, "Mild wheeze");
        let result = ContentClassifier::default().classify(&input);

        assert!(score_of(&result, ViewType::Cardiorespiratory) > score_of(&result, ViewType::AbdominalInguinal));
    }

    #[test]
    fn test_laterality_bonus_applies_to_both_sides() {
        let input = ExaminationInput::empty(Sex::Male)
            .with_field(ExamField::OtherSystems, "Left knee swollen. Right shoulder pain on abduction.");
        let result = ContentClassifier::default().classify(&input);

        assert_eq!(score_of(&result, ViewType::LeftSide), 2.0);
        assert_eq!(score_of(&result, ViewType::RightSide), 2.0);
        // knee, shoulder, swollen
        assert_eq!(score_of(&result, ViewType::Front), 4.0);
        assert_eq!(result.primary_diagram.view_type, ViewType::Front);

        // 同分时保持枚举顺序：左侧在右侧之前
        let alternates: Vec<ViewType> = result.secondary_diagrams.iter().map(|d| d.view_type).collect();
        assert_eq!(alternates, vec![ViewType::LeftSide, ViewType::RightSide]);
    }

    #[test]
    fn test_general_text_adds_front_bonus() {
        let input = ExaminationInput::empty(Sex::Male).with_field(ExamField::General, "Alert, well appearing");
        let result = ContentClassifier::default().classify(&input);

        assert_eq!(score_of(&result, ViewType::Front), 1.5);
        assert!((result.confidence - 0.525).abs() < 1e-9);
    }

    #[test]
    fn test_confidence_is_capped() {
        let input = ExaminationInput::empty(Sex::Male).with_field(
            ExamField::Abdominal,
            "Abdomen distended with guarding and rebound. Hepatomegaly, splenomegaly. \
             Bowel sounds reduced. RUQ and epigastric tenderness, positive Murphy sign. \
             Umbilical hernia, inguinal and groin tenderness, suprapubic fullness.",
        );
        let result = ContentClassifier::default().classify(&input);

        assert_eq!(result.primary_diagram.view_type, ViewType::AbdominalInguinal);
        assert_eq!(result.confidence, 0.9);
    }

    #[test]
    fn test_classify_is_idempotent() {
        let input = ExaminationInput::empty(Sex::Female)
            .with_field(ExamField::General, "Comfortable at rest")
            .with_field(ExamField::Abdominal, "Soft, LLQ tenderness")
            .with_field(ExamField::OtherSystems, "Lumbar spine tender on the right");
        let classifier = ContentClassifier::default();

        assert_eq!(classifier.classify(&input), classifier.classify(&input));
    }

    #[test]
    fn test_alternates_never_exceed_two() {
        let classifier = ContentClassifier::new(ClassifierConfig {
            max_secondary: 5,
            ..ClassifierConfig::default()
        });
        let input = ExaminationInput::empty(Sex::Male)
            .with_field(ExamField::Cardiovascular, "Heart sounds normal")
            .with_field(ExamField::Abdominal, "Abdomen soft, no hernia")
            .with_field(ExamField::OtherSystems, "Lumbar spine tender. Left knee and right hip swollen.");
        let result = classifier.classify(&input);

        assert_eq!(result.secondary_diagrams.len(), MAX_SECONDARY);
    }

    #[test]
    fn test_back_keywords_select_back_view() {
        let input = ExaminationInput::empty(Sex::Male)
            .with_field(ExamField::OtherSystems, "Paraspinal spasm over lumbar spine, sacral tenderness");
        let result = ContentClassifier::default().classify(&input);

        assert_eq!(result.primary_diagram.view_type, ViewType::Back);
        assert!(result.reasoning[0].starts_with("Spinal/posterior keywords"));
    }
}
