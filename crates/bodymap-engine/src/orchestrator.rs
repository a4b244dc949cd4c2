//! 叠加层编排
//!
//! 串联分类、目录加载、发现提取和坐标投影。每个实例对应一个文档视图。
//!
//! 目录加载是唯一的异步步骤，它被拆成三段：
//! [`OverlayOrchestrator::submit_input`] 产生带序号的 [`CatalogRequest`]，
//! [`CatalogRequest::fetch`] 在不持有编排器的情况下完成加载，
//! [`OverlayOrchestrator::apply_catalog`] 只接受最新序号的结果。

use crate::classifier::ContentClassifier;
use crate::extractor::FindingExtractor;
use crate::projector::OverlayLayer;
use crate::state_machine::{OverlayEvent, OverlayState, OverlayStateMachine};
use bodymap_catalog::{CatalogOrigin, CatalogResolution, CatalogSource, CoordinateRepository};
use bodymap_core::{
    AnalysisResult, BodyMapError, DiagramConfig, Dimensions, ExaminationInput, Finding, Result,
    ViewType,
};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// 目录加载请求
#[derive(Debug, Clone)]
pub struct CatalogRequest {
    pub request_id: u64,
    pub diagram: DiagramConfig,
}

impl CatalogRequest {
    /// 加载目录，仓库负责回退，这里不会失败
    pub async fn fetch<S: CatalogSource>(self, repository: &CoordinateRepository<S>) -> CatalogResponse {
        let resolution = repository.get(&self.diagram).await;
        CatalogResponse {
            request_id: self.request_id,
            diagram: self.diagram,
            resolution,
        }
    }
}

/// 目录加载结果
#[derive(Debug, Clone)]
pub struct CatalogResponse {
    pub request_id: u64,
    pub diagram: DiagramConfig,
    pub resolution: CatalogResolution,
}

/// 叠加层编排器
pub struct OverlayOrchestrator<S: CatalogSource> {
    view_id: Uuid,
    repository: Arc<CoordinateRepository<S>>,
    classifier: ContentClassifier,
    extractor: FindingExtractor,
    state_machine: OverlayStateMachine,
    state: OverlayState,
    latest_request_id: u64,
    input: Option<ExaminationInput>,
    analysis: Option<AnalysisResult>,
    active_diagram: Option<DiagramConfig>,
    catalog_origin: Option<CatalogOrigin>,
    findings: Vec<Finding>,
    display: Option<Dimensions>,
}

impl<S: CatalogSource> std::fmt::Debug for OverlayOrchestrator<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlayOrchestrator")
            .field("view_id", &self.view_id)
            .field("state", &self.state)
            .field("latest_request_id", &self.latest_request_id)
            .field("active_diagram", &self.active_diagram.as_ref().map(|d| &d.coordinate_key))
            .field("findings", &self.findings.len())
            .finish()
    }
}

impl<S: CatalogSource> OverlayOrchestrator<S> {
    /// 使用默认分类器和提取器创建编排器
    pub fn new(repository: Arc<CoordinateRepository<S>>) -> Self {
        Self::with_components(repository, ContentClassifier::default(), FindingExtractor::default())
    }

    pub fn with_components(
        repository: Arc<CoordinateRepository<S>>,
        classifier: ContentClassifier,
        extractor: FindingExtractor,
    ) -> Self {
        Self {
            view_id: Uuid::new_v4(),
            repository,
            classifier,
            extractor,
            state_machine: OverlayStateMachine::new(),
            state: OverlayState::Uninitialized,
            latest_request_id: 0,
            input: None,
            analysis: None,
            active_diagram: None,
            catalog_origin: None,
            findings: Vec::new(),
            display: None,
        }
    }

    fn fire(&mut self, event: OverlayEvent) -> Result<()> {
        let next = self.state_machine.transition(&self.state, &event)?;
        debug!("View {}: {:?} --{:?}--> {:?}", self.view_id, self.state, event, next);
        self.state = next;
        Ok(())
    }

    fn next_request(&mut self, diagram: DiagramConfig) -> CatalogRequest {
        self.latest_request_id += 1;
        CatalogRequest {
            request_id: self.latest_request_id,
            diagram,
        }
    }

    /// 切换示意图；底图变化时之前的显示尺寸作废
    ///
    /// 尚无示意图时先到的尺寸属于即将显示的第一张底图，予以保留。
    fn activate(&mut self, diagram: DiagramConfig) {
        let keep_display = self
            .active_diagram
            .as_ref()
            .map_or(true, |active| active.image_path == diagram.image_path);
        if !keep_display {
            self.display = None;
        }
        self.active_diagram = Some(diagram);
        self.catalog_origin = None;
        self.findings.clear();
    }

    fn select(&mut self) -> Result<CatalogRequest> {
        let input = self
            .input
            .as_ref()
            .ok_or_else(|| BodyMapError::Internal("selection without input".to_string()))?;
        let analysis = self.classifier.classify(input);
        let diagram = analysis.primary_diagram.clone();
        self.analysis = Some(analysis);

        self.fire(OverlayEvent::DiagramSelected)?;
        self.activate(diagram.clone());
        Ok(self.next_request(diagram))
    }

    /// 提交新的检查记录，从分类开始重新运行
    pub fn submit_input(&mut self, input: ExaminationInput) -> Result<CatalogRequest> {
        info!("View {}: examination input changed", self.view_id);
        self.fire(OverlayEvent::InputChanged)?;
        self.input = Some(input);
        self.select()
    }

    /// 用户手动切换视图，不重新分类
    pub fn switch_view(&mut self, view_type: ViewType) -> Result<CatalogRequest> {
        let sex = self
            .input
            .as_ref()
            .map(|input| input.sex)
            .ok_or_else(|| BodyMapError::InvalidStateTransition {
                from: format!("{:?}", self.state),
                event: format!("{:?}", OverlayEvent::ViewSwitched),
            })?;

        self.fire(OverlayEvent::ViewSwitched)?;
        let diagram = DiagramConfig::for_view(sex, view_type);
        info!("View {}: switching to {}", self.view_id, diagram.coordinate_key);
        self.activate(diagram.clone());
        Ok(self.next_request(diagram))
    }

    /// 重置整个流程，包括分类
    ///
    /// 尚未收到检查记录时返回 `None`。
    pub fn reset(&mut self) -> Result<Option<CatalogRequest>> {
        info!("View {}: reset requested", self.view_id);
        self.fire(OverlayEvent::Reset)?;
        if self.input.is_none() {
            return Ok(None);
        }
        self.select().map(Some)
    }

    /// 应用目录加载结果
    ///
    /// 序号不是最新的结果被丢弃并返回 `false`。
    pub fn apply_catalog(&mut self, response: CatalogResponse) -> Result<bool> {
        if response.request_id != self.latest_request_id || self.state != OverlayState::CatalogLoading {
            warn!(
                "View {}: discarding stale catalog {} (request {}, latest {})",
                self.view_id, response.resolution.requested_key, response.request_id, self.latest_request_id
            );
            return Ok(false);
        }

        let resolution = response.resolution;
        if resolution.is_degraded() {
            self.fire(OverlayEvent::CatalogFailed)?;
            self.fire(OverlayEvent::FallbackApplied)?;
        } else {
            self.fire(OverlayEvent::CatalogResolved)?;
        }

        // 回退目录的坐标属于正面图，底图、参考尺寸和翻转都随之切换
        if resolution.origin == CatalogOrigin::Fallback {
            info!(
                "View {}: showing {} in place of {}",
                self.view_id, resolution.diagram.coordinate_key, resolution.requested_key
            );
            self.activate(resolution.diagram.clone());
        }

        let text = self
            .input
            .as_ref()
            .map(ExaminationInput::combined_text)
            .unwrap_or_default();
        self.findings = self.extractor.extract(&text, &resolution.catalog);
        self.catalog_origin = Some(resolution.origin);

        info!(
            "View {}: catalog {} ({:?}) yielded {} findings",
            self.view_id,
            resolution.catalog.diagram_key,
            resolution.origin,
            self.findings.len()
        );

        if self.display.is_some() {
            self.fire(OverlayEvent::ImageReady)?;
        }
        Ok(true)
    }

    /// 图像加载完成或尺寸变化
    pub fn image_ready(&mut self, size: Dimensions) -> Result<()> {
        if !size.is_usable() {
            warn!("View {}: ignoring unusable display size {:?}", self.view_id, size);
            return Ok(());
        }
        self.fire(OverlayEvent::ImageReady)?;
        self.display = Some(size);
        Ok(())
    }

    /// 当前叠加层，只有在渲染状态下可用
    pub fn overlay(&self) -> Option<OverlayLayer> {
        if self.state != OverlayState::Rendering {
            return None;
        }
        let diagram = self.active_diagram.as_ref()?;
        let display = self.display?;
        OverlayLayer::build(
            diagram,
            &self.findings,
            display,
            self.extractor.config().legend_max_chars,
        )
    }

    /// 提交输入并完成目录加载
    pub async fn refresh(&mut self, input: ExaminationInput) -> Result<()> {
        let request = self.submit_input(input)?;
        let response = request.fetch(&self.repository).await;
        self.apply_catalog(response)?;
        Ok(())
    }

    /// 切换视图并完成目录加载
    pub async fn show_view(&mut self, view_type: ViewType) -> Result<()> {
        let request = self.switch_view(view_type)?;
        let response = request.fetch(&self.repository).await;
        self.apply_catalog(response)?;
        Ok(())
    }

    pub fn view_id(&self) -> Uuid {
        self.view_id
    }

    pub fn state(&self) -> OverlayState {
        self.state
    }

    pub fn analysis(&self) -> Option<&AnalysisResult> {
        self.analysis.as_ref()
    }

    pub fn active_diagram(&self) -> Option<&DiagramConfig> {
        self.active_diagram.as_ref()
    }

    pub fn catalog_origin(&self) -> Option<CatalogOrigin> {
        self.catalog_origin
    }

    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    pub fn repository(&self) -> &Arc<CoordinateRepository<S>> {
        &self.repository
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bodymap_catalog::InMemoryCatalogSource;
    use bodymap_core::{CoordinateCatalog, DisplayPosition, ExamField, Sex};

    fn repository() -> Arc<CoordinateRepository<InMemoryCatalogSource>> {
        let source = InMemoryCatalogSource::new()
            .with_catalog(
                CoordinateCatalog::new("male_front")
                    .with_entry("chest", 250.0, 300.0)
                    .with_entry("left_knee", 290.0, 760.0)
                    .with_entry("right_shoulder", 170.0, 230.0),
            )
            .with_catalog(
                CoordinateCatalog::new("male_cardiorespiratory")
                    .with_entry("heart", 330.0, 320.0)
                    .with_entry("lungs", 300.0, 250.0),
            )
            .with_catalog(CoordinateCatalog::new("female_front").with_entry("abdomen", 250.0, 450.0))
            .with_catalog(CoordinateCatalog::new("male_left_side").with_entry("left_knee", 200.0, 760.0));
        Arc::new(CoordinateRepository::new(source))
    }

    fn cardio_input() -> ExaminationInput {
        ExaminationInput::empty(Sex::Male).with_field(
            ExamField::Cardiovascular,
            "Heart sounds S1 S2 normal, no murmurs. Lungs clear to auscultation.",
        )
    }

    #[tokio::test]
    async fn test_full_pipeline_renders_after_image_ready() {
        let mut orchestrator = OverlayOrchestrator::new(repository());
        assert_eq!(orchestrator.state(), OverlayState::Uninitialized);

        orchestrator.refresh(cardio_input()).await.unwrap();
        assert_eq!(orchestrator.state(), OverlayState::Ready);
        assert_eq!(orchestrator.catalog_origin(), Some(CatalogOrigin::Requested));
        assert_eq!(orchestrator.findings().len(), 2);
        assert!(orchestrator.overlay().is_none());

        orchestrator.image_ready(Dimensions::new(300.0, 300.0)).unwrap();
        assert_eq!(orchestrator.state(), OverlayState::Rendering);

        let overlay = orchestrator.overlay().unwrap();
        assert_eq!(overlay.diagram.view_type, ViewType::Cardiorespiratory);
        assert_eq!(overlay.markers[0].finding.body_part, "heart");
        assert!((overlay.markers[0].position.left - 165.0).abs() < 1e-9);
        assert_eq!(overlay.markers[0].ordinal, 1);
        assert_eq!(overlay.markers[1].ordinal, 2);
    }

    #[tokio::test]
    async fn test_empty_female_input_renders_front_without_findings() {
        let mut orchestrator = OverlayOrchestrator::new(repository());
        orchestrator.refresh(ExaminationInput::empty(Sex::Female)).await.unwrap();

        let analysis = orchestrator.analysis().unwrap();
        assert_eq!(analysis.primary_diagram.coordinate_key, "female_front");
        assert_eq!(analysis.confidence, 0.5);
        assert!(orchestrator.findings().is_empty());
    }

    #[tokio::test]
    async fn test_stale_response_is_discarded() {
        let mut orchestrator = OverlayOrchestrator::new(repository());
        let repository = orchestrator.repository().clone();

        let first = orchestrator.submit_input(cardio_input()).unwrap();
        let second = orchestrator
            .submit_input(ExaminationInput::empty(Sex::Male).with_field(ExamField::OtherSystems, "Left knee swollen"))
            .unwrap();
        assert!(second.request_id > first.request_id);

        let first_response = first.fetch(&repository).await;
        let second_response = second.fetch(&repository).await;

        assert!(orchestrator.apply_catalog(second_response).unwrap());
        assert!(!orchestrator.apply_catalog(first_response).unwrap());

        assert_eq!(orchestrator.active_diagram().unwrap().coordinate_key, "male_front");
        let keys: Vec<&str> = orchestrator.findings().iter().map(|f| f.body_part.as_str()).collect();
        assert_eq!(keys, vec!["left_knee"]);
    }

    #[tokio::test]
    async fn test_older_response_arriving_first_is_discarded() {
        let mut orchestrator = OverlayOrchestrator::new(repository());
        let repository = orchestrator.repository().clone();

        let first = orchestrator.submit_input(cardio_input()).unwrap();
        let second = orchestrator.switch_view(ViewType::LeftSide).unwrap();

        assert!(!orchestrator.apply_catalog(first.fetch(&repository).await).unwrap());
        assert_eq!(orchestrator.state(), OverlayState::CatalogLoading);
        assert!(orchestrator.apply_catalog(second.fetch(&repository).await).unwrap());
        assert_eq!(orchestrator.active_diagram().unwrap().view_type, ViewType::LeftSide);
    }

    #[tokio::test]
    async fn test_missing_catalog_falls_back_through_errored() {
        let mut orchestrator = OverlayOrchestrator::new(repository());
        orchestrator.refresh(cardio_input()).await.unwrap();

        orchestrator.show_view(ViewType::AbdominalInguinal).await.unwrap();
        assert_eq!(orchestrator.state(), OverlayState::Ready);
        assert_eq!(orchestrator.catalog_origin(), Some(CatalogOrigin::Fallback));
        assert_eq!(orchestrator.active_diagram().unwrap().coordinate_key, "male_front");
        // 回退目录中的 chest 等键不在文本中
        assert!(orchestrator.findings().is_empty());
    }

    #[tokio::test]
    async fn test_fallback_findings_use_front_reference_space() {
        let source = InMemoryCatalogSource::new()
            .with_catalog(CoordinateCatalog::new("male_front").with_entry("abdomen", 250.0, 500.0));
        let mut orchestrator = OverlayOrchestrator::new(Arc::new(CoordinateRepository::new(source)));

        let input = ExaminationInput::empty(Sex::Male).with_field(ExamField::Abdominal, "Abdomen distended");
        orchestrator.refresh(input).await.unwrap();
        assert_eq!(
            orchestrator.analysis().unwrap().primary_diagram.view_type,
            ViewType::AbdominalInguinal
        );
        assert_eq!(orchestrator.catalog_origin(), Some(CatalogOrigin::Fallback));

        orchestrator.image_ready(Dimensions::new(250.0, 500.0)).unwrap();
        let overlay = orchestrator.overlay().unwrap();
        assert_eq!(overlay.diagram.coordinate_key, "male_front");
        assert_eq!(overlay.diagram.reference_dimensions, Dimensions::new(500.0, 1000.0));
        assert_eq!(overlay.markers[0].position, DisplayPosition { left: 125.0, top: 250.0 });
    }

    #[tokio::test]
    async fn test_image_ready_before_first_input_is_kept() {
        let mut orchestrator = OverlayOrchestrator::new(repository());
        orchestrator.image_ready(Dimensions::new(250.0, 500.0)).unwrap();
        assert_eq!(orchestrator.state(), OverlayState::Uninitialized);

        let input = ExaminationInput::empty(Sex::Male).with_field(ExamField::OtherSystems, "Left knee swollen");
        orchestrator.refresh(input).await.unwrap();

        assert_eq!(orchestrator.state(), OverlayState::Rendering);
        let overlay = orchestrator.overlay().unwrap();
        assert_eq!(overlay.markers[0].position, DisplayPosition { left: 145.0, top: 380.0 });
    }

    #[tokio::test]
    async fn test_switch_view_keeps_analysis_and_mirrors_left_side() {
        let mut orchestrator = OverlayOrchestrator::new(repository());
        let input = ExaminationInput::empty(Sex::Male).with_field(ExamField::OtherSystems, "Left knee swollen");
        orchestrator.refresh(input).await.unwrap();
        orchestrator.image_ready(Dimensions::new(250.0, 500.0)).unwrap();
        let analysis_before = orchestrator.analysis().cloned();

        orchestrator.show_view(ViewType::LeftSide).await.unwrap();
        assert_eq!(orchestrator.analysis().cloned(), analysis_before);
        // 新底图尚未加载完成
        assert_eq!(orchestrator.state(), OverlayState::Ready);
        assert!(orchestrator.overlay().is_none());

        orchestrator.image_ready(Dimensions::new(200.0, 500.0)).unwrap();
        let overlay = orchestrator.overlay().unwrap();
        assert!(overlay.diagram.mirrored);
        assert_eq!(overlay.transform.css(), "scaleX(-1)");
        assert_eq!(overlay.markers[0].position.left, 100.0);
    }

    #[tokio::test]
    async fn test_same_image_keeps_display_size_across_inputs() {
        let mut orchestrator = OverlayOrchestrator::new(repository());
        let input = ExaminationInput::empty(Sex::Male).with_field(ExamField::OtherSystems, "Chest wall bruise");
        orchestrator.refresh(input.clone()).await.unwrap();
        orchestrator.image_ready(Dimensions::new(250.0, 500.0)).unwrap();

        orchestrator
            .refresh(input.with_field(ExamField::General, "Right shoulder pain, chest clear"))
            .await
            .unwrap();
        assert_eq!(orchestrator.state(), OverlayState::Rendering);
        assert_eq!(orchestrator.overlay().unwrap().markers.len(), 2);
    }

    #[tokio::test]
    async fn test_reset_reruns_classification() {
        let mut orchestrator = OverlayOrchestrator::new(repository());
        assert!(orchestrator.reset().unwrap().is_none());
        assert_eq!(orchestrator.state(), OverlayState::Uninitialized);

        orchestrator.refresh(cardio_input()).await.unwrap();
        orchestrator.show_view(ViewType::LeftSide).await.unwrap();

        let request = orchestrator.reset().unwrap().unwrap();
        assert_eq!(request.diagram.view_type, ViewType::Cardiorespiratory);
        assert_eq!(orchestrator.state(), OverlayState::CatalogLoading);
    }

    #[tokio::test]
    async fn test_switch_view_before_input_is_rejected() {
        let mut orchestrator = OverlayOrchestrator::new(repository());
        assert!(matches!(
            orchestrator.switch_view(ViewType::Back),
            Err(BodyMapError::InvalidStateTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_unusable_display_is_deferred() {
        let mut orchestrator = OverlayOrchestrator::new(repository());
        orchestrator.refresh(cardio_input()).await.unwrap();

        orchestrator.image_ready(Dimensions::new(0.0, 0.0)).unwrap();
        assert_eq!(orchestrator.state(), OverlayState::Ready);
        assert!(orchestrator.overlay().is_none());
    }
}
