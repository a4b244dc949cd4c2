//! # BodyMap管理模块
//!
//! 提供配置管理、日志初始化，以及按配置创建文档视图的统一入口

pub mod config;
pub mod logging;

use anyhow::Result;
use bodymap_catalog::{CoordinateRepository, FileCatalogSource};
use bodymap_engine::{ContentClassifier, FindingExtractor, OverlayOrchestrator};
use std::sync::Arc;
use tracing::info;

pub use config::{BodyMapConfig, CatalogConfig, ConfigManager, ConfigValidator, LogFormat, LoggingConfig};
pub use logging::init_tracing;

/// 系统管理器
///
/// 持有配置，按需为每个文档视图创建独立的编排器
#[derive(Debug)]
pub struct SystemManager {
    /// 配置管理器
    config_manager: Arc<ConfigManager>,
}

impl SystemManager {
    /// 创建新的系统管理器
    pub fn new(config_path: Option<&str>) -> Result<Self> {
        let config_manager = Arc::new(ConfigManager::new(config_path)?);
        Ok(Self { config_manager })
    }

    /// 获取配置管理器
    pub fn config_manager(&self) -> &ConfigManager {
        &self.config_manager
    }

    /// 打开一个新的文档视图，目录缓存随视图创建和释放
    pub async fn open_view(&self) -> OverlayOrchestrator<FileCatalogSource> {
        let config = self.config_manager.get_config().await;
        let repository = CoordinateRepository::new(FileCatalogSource::new(&config.catalog.root_path))
            .with_cache(config.catalog.cache_enabled);

        let orchestrator = OverlayOrchestrator::with_components(
            Arc::new(repository),
            ContentClassifier::new(config.classifier.clone()),
            FindingExtractor::new(config.extractor.clone()),
        );
        info!(
            "Opened document view {} with catalogs from {}",
            orchestrator.view_id(),
            config.catalog.root_path
        );
        orchestrator
    }
}
