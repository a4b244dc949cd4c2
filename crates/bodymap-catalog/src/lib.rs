//! # BodyMap坐标目录模块
//!
//! 负责按示意图键解析坐标目录，提供缓存与回退策略。

pub mod repository;
pub mod source;

pub use repository::{CatalogOrigin, CatalogResolution, CoordinateRepository};
pub use source::{CatalogSource, FileCatalogSource, InMemoryCatalogSource};
