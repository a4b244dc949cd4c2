//! 坐标目录来源

use async_trait::async_trait;
use bodymap_core::{BodyMapError, CoordinateCatalog, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// 坐标目录来源
///
/// 只负责按键取回目录，找不到时返回 `CatalogNotFound`，不做回退。
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// 来源名称，用于日志
    fn name(&self) -> &str;

    /// 按坐标键获取目录
    async fn fetch(&self, key: &str) -> Result<CoordinateCatalog>;
}

/// 内存目录来源
#[derive(Debug, Default, Clone)]
pub struct InMemoryCatalogSource {
    catalogs: HashMap<String, CoordinateCatalog>,
}

impl InMemoryCatalogSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以目录自身的键注册
    pub fn with_catalog(mut self, catalog: CoordinateCatalog) -> Self {
        self.insert(catalog);
        self
    }

    pub fn insert(&mut self, catalog: CoordinateCatalog) {
        self.catalogs.insert(catalog.diagram_key.clone(), catalog);
    }
}

#[async_trait]
impl CatalogSource for InMemoryCatalogSource {
    fn name(&self) -> &str {
        "memory"
    }

    async fn fetch(&self, key: &str) -> Result<CoordinateCatalog> {
        self.catalogs
            .get(key)
            .cloned()
            .ok_or_else(|| BodyMapError::CatalogNotFound(key.to_string()))
    }
}

/// 文件目录来源
///
/// 每个坐标键对应 `<root>/<key>.json`。
#[derive(Debug, Clone)]
pub struct FileCatalogSource {
    root: PathBuf,
}

impl FileCatalogSource {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn catalog_path(&self, key: &str) -> Result<PathBuf> {
        // 键来自性别和视图枚举，这里仍然拒绝路径分隔符
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(BodyMapError::Validation(format!("invalid catalog key: {:?}", key)));
        }
        Ok(self.root.join(format!("{}.json", key)))
    }
}

#[async_trait]
impl CatalogSource for FileCatalogSource {
    fn name(&self) -> &str {
        "file"
    }

    async fn fetch(&self, key: &str) -> Result<CoordinateCatalog> {
        let path = self.catalog_path(key)?;
        debug!("Reading catalog {} from {}", key, path.display());

        let data = match tokio::fs::read_to_string(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BodyMapError::CatalogNotFound(key.to_string()));
            }
            Err(e) => {
                return Err(BodyMapError::CatalogLoad {
                    key: key.to_string(),
                    reason: e.to_string(),
                });
            }
        };

        CoordinateCatalog::from_json(key, &data).map_err(|e| BodyMapError::CatalogLoad {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_source_not_found() {
        let source = InMemoryCatalogSource::new()
            .with_catalog(CoordinateCatalog::new("male_front").with_entry("head", 250.0, 80.0));

        assert_eq!(source.fetch("male_front").await.unwrap().len(), 1);
        assert!(matches!(
            source.fetch("male_back").await,
            Err(BodyMapError::CatalogNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_file_source_reads_and_classifies_errors() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("female_front.json"),
            r#"{"diagram": "female_front", "coordinates": {"head": {"x": 250, "y": 80}}}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("female_back.json"), "{not json").unwrap();

        let source = FileCatalogSource::new(dir.path());

        let catalog = source.fetch("female_front").await.unwrap();
        assert!(catalog.contains("head"));

        assert!(matches!(
            source.fetch("female_back").await,
            Err(BodyMapError::CatalogLoad { .. })
        ));
        assert!(matches!(
            source.fetch("female_left_side").await,
            Err(BodyMapError::CatalogNotFound(_))
        ));
        assert!(matches!(
            source.fetch("../secrets").await,
            Err(BodyMapError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_bundled_catalogs_cover_every_view() {
        use bodymap_core::{coordinate_key, Sex, ViewType};

        let source = FileCatalogSource::new(concat!(env!("CARGO_MANIFEST_DIR"), "/../../catalogs"));
        for sex in [Sex::Male, Sex::Female] {
            for view_type in ViewType::all() {
                let key = coordinate_key(sex, view_type);
                let catalog = source.fetch(&key).await.unwrap();
                assert!(!catalog.is_empty(), "{} is empty", key);
            }
        }
    }
}
