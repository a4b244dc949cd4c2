//! 配置管理
//!
//! 从 TOML 文件和 `BODYMAP_*` 环境变量加载配置，提供验证与保存。

use anyhow::{bail, Context, Result};
use bodymap_engine::{ClassifierConfig, ExtractorConfig, MAX_SECONDARY};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// 配置管理器
#[derive(Debug)]
pub struct ConfigManager {
    /// 配置数据
    config: Arc<RwLock<BodyMapConfig>>,
    /// 配置文件路径
    config_path: Option<String>,
    /// 配置验证器
    validator: ConfigValidator,
}

/// 完整配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct BodyMapConfig {
    /// 坐标目录配置
    pub catalog: CatalogConfig,
    /// 分类器配置
    pub classifier: ClassifierConfig,
    /// 提取器配置
    pub extractor: ExtractorConfig,
    /// 日志配置
    pub logging: LoggingConfig,
}

/// 坐标目录配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CatalogConfig {
    /// 目录文件根路径
    pub root_path: String,
    /// 是否缓存已加载的目录
    pub cache_enabled: bool,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            root_path: "./catalogs".to_string(),
            cache_enabled: true,
        }
    }
}

/// 日志格式
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Compact,
    Pretty,
    Full,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别或过滤指令，例如 `info,bodymap_engine=debug`
    pub level: String,
    /// 日志格式
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

/// 配置验证器
#[derive(Debug, Default)]
pub struct ConfigValidator;

impl ConfigValidator {
    pub fn new() -> Self {
        Self
    }

    /// 验证配置
    pub fn validate(&self, config: &BodyMapConfig) -> Result<()> {
        if config.catalog.root_path.trim().is_empty() {
            bail!("catalog.root_path must not be empty");
        }

        let classifier = &config.classifier;
        if !(classifier.max_confidence > 0.5 && classifier.max_confidence <= 0.9) {
            bail!(
                "classifier.max_confidence must be in (0.5, 0.9], got {}",
                classifier.max_confidence
            );
        }
        if classifier.confidence_step <= 0.0 {
            bail!("classifier.confidence_step must be positive");
        }
        if classifier.max_secondary > MAX_SECONDARY {
            bail!(
                "classifier.max_secondary must be at most {}, got {}",
                MAX_SECONDARY,
                classifier.max_secondary
            );
        }
        for (name, value) in [
            ("front_base_score", classifier.front_base_score),
            ("laterality_bonus", classifier.laterality_bonus),
            ("general_exam_bonus", classifier.general_exam_bonus),
        ] {
            if !value.is_finite() || value < 0.0 {
                bail!("classifier.{} must be a non-negative number, got {}", name, value);
            }
        }

        let extractor = &config.extractor;
        if extractor.min_sentence_chars == 0 {
            bail!("extractor.min_sentence_chars must be positive");
        }
        if extractor.snippet_max_chars == 0 {
            bail!("extractor.snippet_max_chars must be positive");
        }
        if !(30..=60).contains(&extractor.legend_max_chars) {
            bail!(
                "extractor.legend_max_chars must be between 30 and 60, got {}",
                extractor.legend_max_chars
            );
        }

        if config.logging.level.trim().is_empty() {
            bail!("logging.level must not be empty");
        }

        debug!("Configuration validated");
        Ok(())
    }
}

impl ConfigManager {
    /// 创建新的配置管理器，未指定文件时只使用默认值和环境变量
    pub fn new(config_path: Option<&str>) -> Result<Self> {
        let config = Self::load_config(config_path)?;
        let validator = ConfigValidator::new();
        validator.validate(&config)?;

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_path: config_path.map(str::to_string),
            validator,
        })
    }

    /// 从文件和环境变量加载配置
    fn load_config(config_path: Option<&str>) -> Result<BodyMapConfig> {
        let mut builder = Config::builder();
        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path));
        }
        let settings = builder
            .add_source(
                Environment::with_prefix("BODYMAP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to load configuration sources")?;

        let config: BodyMapConfig = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        debug!(
            "Configuration loaded from {}",
            config_path.unwrap_or("defaults and environment")
        );
        Ok(config)
    }

    /// 配置文件路径
    pub fn config_path(&self) -> Option<&str> {
        self.config_path.as_deref()
    }

    /// 获取配置
    pub async fn get_config(&self) -> BodyMapConfig {
        let config = self.config.read().await;
        config.clone()
    }

    /// 更新配置
    pub async fn update_config(&self, new_config: BodyMapConfig) -> Result<()> {
        self.validator.validate(&new_config)?;

        {
            let mut config = self.config.write().await;
            *config = new_config;
        }

        info!("Configuration updated successfully");
        Ok(())
    }

    /// 保存配置到文件
    pub async fn save_config(&self) -> Result<()> {
        let Some(path) = &self.config_path else {
            bail!("No configuration file path to save to");
        };

        let config = self.config.read().await;
        let config_str = toml::to_string_pretty(&*config).context("Failed to serialize configuration")?;

        tokio::fs::write(path, config_str)
            .await
            .context("Failed to write configuration file")?;

        info!("Configuration saved to: {}", path);
        Ok(())
    }

    /// 重新加载配置
    pub async fn reload_config(&self) -> Result<()> {
        let new_config = Self::load_config(self.config_path.as_deref())?;
        self.update_config(new_config).await
    }
}
