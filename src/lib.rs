//! BodyMap
//!
//! 把检查记录映射到人体示意图。汇总导出各子 crate，便于演示程序和下游直接依赖。

pub use bodymap_catalog::{CatalogSource, CoordinateRepository, FileCatalogSource, InMemoryCatalogSource};
pub use bodymap_core::{BodyMapError, ExamField, ExaminationInput, Result, Sex, ViewType};
pub use bodymap_engine::{OverlayLayer, OverlayOrchestrator, OverlayState};
