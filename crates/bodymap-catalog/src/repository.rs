//! 坐标目录仓库
//!
//! 在目录来源之上提供按视图缓存和一次性回退。

use crate::source::CatalogSource;
use bodymap_core::{CoordinateCatalog, DiagramConfig, Result, ViewType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// 目录来源类别
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CatalogOrigin {
    /// 请求的目录
    Requested,
    /// 回退到同性别的正面目录
    Fallback,
    /// 回退也失败，返回空目录
    Empty,
}

/// 目录解析结果
///
/// `diagram` 是目录坐标所在的示意图：回退时为同性别正面图，
/// 投影必须使用它的参考尺寸。
#[derive(Debug, Clone)]
pub struct CatalogResolution {
    pub requested_key: String,
    pub diagram: DiagramConfig,
    pub catalog: Arc<CoordinateCatalog>,
    pub origin: CatalogOrigin,
}

impl CatalogResolution {
    pub fn is_degraded(&self) -> bool {
        self.origin != CatalogOrigin::Requested
    }
}

/// 坐标目录仓库
///
/// 每个文档视图持有一个实例，缓存随视图一起释放。
pub struct CoordinateRepository<S: CatalogSource> {
    source: S,
    cache: RwLock<HashMap<String, Arc<CoordinateCatalog>>>,
    cache_enabled: bool,
}

impl<S: CatalogSource> std::fmt::Debug for CoordinateRepository<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinateRepository")
            .field("source", &self.source.name())
            .field("cache_enabled", &self.cache_enabled)
            .finish()
    }
}

impl<S: CatalogSource> CoordinateRepository<S> {
    /// 创建新的目录仓库
    pub fn new(source: S) -> Self {
        Self {
            source,
            cache: RwLock::new(HashMap::new()),
            cache_enabled: true,
        }
    }

    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// 按键获取目录，不做回退
    pub async fn get_key(&self, key: &str) -> Result<Arc<CoordinateCatalog>> {
        if self.cache_enabled {
            if let Some(catalog) = self.cache.read().await.get(key) {
                debug!("Catalog cache hit for {}", key);
                return Ok(catalog.clone());
            }
        }

        let catalog = Arc::new(self.source.fetch(key).await?);
        debug!(
            "Loaded catalog {} with {} entries from {} source",
            key,
            catalog.len(),
            self.source.name()
        );

        if self.cache_enabled {
            self.cache
                .write()
                .await
                .insert(key.to_string(), catalog.clone());
        }
        Ok(catalog)
    }

    /// 解析示意图对应的目录
    ///
    /// 失败时回退一次到同性别的正面目录，仍失败则返回空目录，从不返回错误。
    pub async fn get(&self, diagram: &DiagramConfig) -> CatalogResolution {
        let requested_key = diagram.coordinate_key.clone();

        let error = match self.get_key(&requested_key).await {
            Ok(catalog) => {
                return CatalogResolution {
                    requested_key,
                    diagram: diagram.clone(),
                    catalog,
                    origin: CatalogOrigin::Requested,
                };
            }
            Err(e) => e,
        };

        warn!("Catalog {} unavailable: {}", requested_key, error);

        let fallback = DiagramConfig::for_view(diagram.sex, ViewType::Front);
        if fallback.coordinate_key != requested_key {
            match self.get_key(&fallback.coordinate_key).await {
                Ok(catalog) => {
                    info!("Falling back from catalog {} to {}", requested_key, fallback.coordinate_key);
                    return CatalogResolution {
                        requested_key,
                        diagram: fallback,
                        catalog,
                        origin: CatalogOrigin::Fallback,
                    };
                }
                Err(e) => warn!("Fallback catalog {} unavailable: {}", fallback.coordinate_key, e),
            }
        }

        warn!("No catalog available for {}, rendering without overlays", requested_key);
        CatalogResolution {
            catalog: Arc::new(CoordinateCatalog::new(requested_key.clone())),
            requested_key,
            diagram: diagram.clone(),
            origin: CatalogOrigin::Empty,
        }
    }

    /// 清空缓存
    pub async fn clear_cache(&self) {
        self.cache.write().await.clear();
    }

    pub async fn cached_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.cache.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::InMemoryCatalogSource;
    use async_trait::async_trait;
    use bodymap_core::{BodyMapError, Dimensions, Sex};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 记录调用次数的来源
    struct CountingSource {
        inner: InMemoryCatalogSource,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CatalogSource for CountingSource {
        fn name(&self) -> &str {
            "counting"
        }

        async fn fetch(&self, key: &str) -> Result<CoordinateCatalog> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.fetch(key).await
        }
    }

    fn female_front() -> CoordinateCatalog {
        CoordinateCatalog::new("female_front")
            .with_entry("head", 250.0, 80.0)
            .with_entry("left_knee", 290.0, 760.0)
    }

    #[tokio::test]
    async fn test_get_requested_catalog() {
        let repository = CoordinateRepository::new(InMemoryCatalogSource::new().with_catalog(female_front()));

        let resolution = repository.get(&DiagramConfig::default_for(Sex::Female)).await;
        assert_eq!(resolution.origin, CatalogOrigin::Requested);
        assert_eq!(resolution.catalog.len(), 2);
        assert!(!resolution.is_degraded());
    }

    #[tokio::test]
    async fn test_missing_catalog_falls_back_to_front_of_same_sex() {
        let source = InMemoryCatalogSource::new()
            .with_catalog(female_front())
            .with_catalog(CoordinateCatalog::new("male_front").with_entry("chest", 1.0, 1.0));
        let repository = CoordinateRepository::new(source);

        let diagram = DiagramConfig::for_view(Sex::Female, ViewType::AbdominalInguinal);
        let resolution = repository.get(&diagram).await;

        assert_eq!(resolution.origin, CatalogOrigin::Fallback);
        assert_eq!(resolution.requested_key, "female_abdominal_inguinal");
        assert_eq!(resolution.catalog.diagram_key, "female_front");
        assert_eq!(resolution.diagram, DiagramConfig::for_view(Sex::Female, ViewType::Front));
        assert_eq!(resolution.diagram.reference_dimensions, Dimensions::new(500.0, 1000.0));
    }

    #[tokio::test]
    async fn test_double_failure_yields_empty_catalog() {
        let repository = CoordinateRepository::new(InMemoryCatalogSource::new());

        let diagram = DiagramConfig::for_view(Sex::Male, ViewType::Back);
        let resolution = repository.get(&diagram).await;

        assert_eq!(resolution.origin, CatalogOrigin::Empty);
        assert!(resolution.catalog.is_empty());
        assert_eq!(resolution.diagram, diagram);
    }

    #[tokio::test]
    async fn test_front_failure_does_not_retry_same_key() {
        let source = CountingSource {
            inner: InMemoryCatalogSource::new(),
            calls: AtomicUsize::new(0),
        };
        let repository = CoordinateRepository::new(source);

        let resolution = repository.get(&DiagramConfig::default_for(Sex::Male)).await;
        assert_eq!(resolution.origin, CatalogOrigin::Empty);
        assert_eq!(repository.source().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cache_avoids_second_fetch() {
        let source = CountingSource {
            inner: InMemoryCatalogSource::new().with_catalog(female_front()),
            calls: AtomicUsize::new(0),
        };
        let repository = CoordinateRepository::new(source);

        repository.get_key("female_front").await.unwrap();
        repository.get_key("female_front").await.unwrap();
        assert_eq!(repository.source().calls.load(Ordering::SeqCst), 1);
        assert_eq!(repository.cached_keys().await, vec!["female_front".to_string()]);

        repository.clear_cache().await;
        repository.get_key("female_front").await.unwrap();
        assert_eq!(repository.source().calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_get_key_propagates_not_found() {
        let repository = CoordinateRepository::new(InMemoryCatalogSource::new()).with_cache(false);
        assert!(matches!(
            repository.get_key("male_back").await,
            Err(BodyMapError::CatalogNotFound(_))
        ));
    }
}
