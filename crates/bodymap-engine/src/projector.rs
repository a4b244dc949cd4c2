//! 坐标投影
//!
//! 把参考图坐标线性缩放到实际显示尺寸。镜像视图的水平翻转在渲染时整体施加，
//! 不改变这里计算出的坐标。

use bodymap_core::{Coordinate, DiagramConfig, Dimensions, DisplayPosition, Finding, ProjectedFinding};
use serde::{Deserialize, Serialize};

/// 投影结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    Position(DisplayPosition),
    /// 显示尺寸未知，需等待图像加载完成
    Unavailable,
}

impl Projection {
    pub fn position(&self) -> Option<DisplayPosition> {
        match self {
            Projection::Position(position) => Some(*position),
            Projection::Unavailable => None,
        }
    }
}

/// 投影单个坐标
pub fn project(reference: Coordinate, reference_dimensions: Dimensions, display: Option<Dimensions>) -> Projection {
    let display = match display {
        Some(display) if display.is_usable() => display,
        _ => return Projection::Unavailable,
    };
    if !reference_dimensions.is_usable() {
        return Projection::Unavailable;
    }

    Projection::Position(DisplayPosition {
        left: reference.x / reference_dimensions.width * display.width,
        top: reference.y / reference_dimensions.height * display.height,
    })
}

/// 投影一组发现，序号从 1 开始
///
/// 显示尺寸未知时返回 `None`。
pub fn project_findings(
    findings: &[Finding],
    reference_dimensions: Dimensions,
    display: Option<Dimensions>,
) -> Option<Vec<ProjectedFinding>> {
    findings
        .iter()
        .enumerate()
        .map(|(index, finding)| {
            project(finding.reference_coordinate, reference_dimensions, display)
                .position()
                .map(|position| ProjectedFinding {
                    position,
                    ordinal: index + 1,
                    finding: finding.clone(),
                })
        })
        .collect()
}

/// 渲染变换
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RenderTransform {
    Identity,
    /// 图像和叠加层整体水平翻转
    FlipHorizontal,
}

impl RenderTransform {
    pub fn for_diagram(diagram: &DiagramConfig) -> Self {
        if diagram.mirrored {
            RenderTransform::FlipHorizontal
        } else {
            RenderTransform::Identity
        }
    }

    /// 对应的 CSS transform
    pub fn css(&self) -> &'static str {
        match self {
            RenderTransform::Identity => "none",
            RenderTransform::FlipHorizontal => "scaleX(-1)",
        }
    }

    /// 无法翻转容器的渲染端（例如打印文档）用此方法换算单个位置
    pub fn apply(&self, position: DisplayPosition, display: Dimensions) -> DisplayPosition {
        match self {
            RenderTransform::Identity => position,
            RenderTransform::FlipHorizontal => DisplayPosition {
                left: display.width - position.left,
                top: position.top,
            },
        }
    }
}

/// 图例条目
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LegendEntry {
    pub ordinal: usize,
    pub label: String,
    pub snippet: String,
}

/// 叠加层，交给展示层渲染
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OverlayLayer {
    pub diagram: DiagramConfig,
    pub display: Dimensions,
    pub transform: RenderTransform,
    pub markers: Vec<ProjectedFinding>,
    pub legend: Vec<LegendEntry>,
}

impl OverlayLayer {
    /// 构建叠加层，显示尺寸不可用时返回 `None`
    pub fn build(
        diagram: &DiagramConfig,
        findings: &[Finding],
        display: Dimensions,
        legend_max_chars: usize,
    ) -> Option<Self> {
        if !display.is_usable() {
            return None;
        }
        let markers = project_findings(findings, diagram.reference_dimensions, Some(display))?;
        let legend = markers
            .iter()
            .map(|marker| LegendEntry {
                ordinal: marker.ordinal,
                label: marker.finding.body_part_label(),
                snippet: marker.finding.legend_label(legend_max_chars),
            })
            .collect();

        Some(Self {
            diagram: diagram.clone(),
            display,
            transform: RenderTransform::for_diagram(diagram),
            markers,
            legend,
        })
    }
}
