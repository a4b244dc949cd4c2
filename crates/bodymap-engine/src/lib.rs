//! # BodyMap映射引擎
//!
//! 将检查记录映射到人体示意图，包括：
//! - 关键词规则表：类别、关键词、目标视图和权重
//! - 内容分类器：为候选视图打分并选出主视图和备选视图
//! - 发现提取器：按坐标目录从文本中提取部位发现
//! - 坐标投影：把参考图坐标换算到实际显示尺寸
//! - 叠加层编排：串联上述步骤并处理回退与过期结果

pub mod classifier;
pub mod extractor;
pub mod orchestrator;
pub mod projector;
pub mod rules;
pub mod state_machine;

// 重新导出主要类型
pub use classifier::{ClassifierConfig, ContentClassifier, MAX_SECONDARY};
pub use extractor::{ExtractorConfig, FindingExtractor, FindingOrder};
pub use orchestrator::{CatalogRequest, CatalogResponse, OverlayOrchestrator};
pub use projector::{project, LegendEntry, OverlayLayer, Projection, RenderTransform};
pub use rules::{KeywordRule, RuleCategory, RuleMatch, RuleMatcher, RuleScoring, RuleTable};
pub use state_machine::{OverlayEvent, OverlayState, OverlayStateMachine};
