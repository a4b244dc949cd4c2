//! 核心数据模型定义

use crate::error::{BodyMapError, Result};
use crate::utils::{humanize_key, truncate_chars};
use serde::{Deserialize, Serialize};

/// 性别枚举
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Male,
    Female,
}

impl Sex {
    pub fn slug(&self) -> &'static str {
        match self {
            Sex::Male => "male",
            Sex::Female => "female",
        }
    }
}

impl std::str::FromStr for Sex {
    type Err = BodyMapError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "male" | "m" => Ok(Sex::Male),
            "female" | "f" => Ok(Sex::Female),
            other => Err(BodyMapError::Validation(format!("unknown sex: {}", other))),
        }
    }
}

/// 示意图视图类型
///
/// 枚举顺序是固定的，评分相同时按此顺序决定先后。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum ViewType {
    Front,             // 正面
    Back,              // 背面
    LeftSide,          // 左侧（右侧图镜像）
    RightSide,         // 右侧
    Cardiorespiratory, // 心肺
    AbdominalInguinal, // 腹部及腹股沟
}

impl ViewType {
    /// 按枚举顺序列出所有视图
    pub fn all() -> [ViewType; 6] {
        [
            ViewType::Front,
            ViewType::Back,
            ViewType::LeftSide,
            ViewType::RightSide,
            ViewType::Cardiorespiratory,
            ViewType::AbdominalInguinal,
        ]
    }

    pub fn slug(&self) -> &'static str {
        match self {
            ViewType::Front => "front",
            ViewType::Back => "back",
            ViewType::LeftSide => "left_side",
            ViewType::RightSide => "right_side",
            ViewType::Cardiorespiratory => "cardiorespiratory",
            ViewType::AbdominalInguinal => "abdominal_inguinal",
        }
    }

    /// 枚举中的位置，同时作为展示优先级
    pub fn priority(&self) -> u32 {
        match self {
            ViewType::Front => 1,
            ViewType::Back => 2,
            ViewType::LeftSide => 3,
            ViewType::RightSide => 4,
            ViewType::Cardiorespiratory => 5,
            ViewType::AbdominalInguinal => 6,
        }
    }

    /// 左侧视图没有独立底图，使用右侧图水平翻转
    pub fn is_mirrored(&self) -> bool {
        matches!(self, ViewType::LeftSide)
    }

    fn image_slug(&self) -> &'static str {
        match self {
            ViewType::LeftSide => ViewType::RightSide.slug(),
            other => other.slug(),
        }
    }

    fn reference_dimensions(&self) -> Dimensions {
        match self {
            ViewType::Front | ViewType::Back => Dimensions::new(500.0, 1000.0),
            ViewType::LeftSide | ViewType::RightSide => Dimensions::new(400.0, 1000.0),
            ViewType::Cardiorespiratory => Dimensions::new(600.0, 600.0),
            ViewType::AbdominalInguinal => Dimensions::new(600.0, 700.0),
        }
    }
}

impl std::str::FromStr for ViewType {
    type Err = BodyMapError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        ViewType::all()
            .into_iter()
            .find(|view| view.slug() == normalized)
            .ok_or_else(|| BodyMapError::Validation(format!("unknown view type: {}", s)))
    }
}

/// 宽高尺寸（像素）
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Dimensions {
    pub width: f64,
    pub height: f64,
}

impl Dimensions {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// 宽高都是有限正数
    pub fn is_usable(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }
}

/// 参考图像素空间中的坐标
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Coordinate {
    pub x: f64,
    pub y: f64,
}

impl Coordinate {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// 示意图配置
///
/// 由 (性别, 视图类型) 纯函数构造，构造后不再修改。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiagramConfig {
    pub view_type: ViewType,
    pub sex: Sex,
    pub image_path: String,
    pub coordinate_key: String,
    pub priority: u32,
    pub mirrored: bool,
    pub reference_dimensions: Dimensions,
}

impl DiagramConfig {
    pub fn for_view(sex: Sex, view_type: ViewType) -> Self {
        Self {
            view_type,
            sex,
            image_path: format!("diagrams/{}_{}.png", sex.slug(), view_type.image_slug()),
            coordinate_key: coordinate_key(sex, view_type),
            priority: view_type.priority(),
            mirrored: view_type.is_mirrored(),
            reference_dimensions: view_type.reference_dimensions(),
        }
    }

    /// 默认的正面视图
    pub fn default_for(sex: Sex) -> Self {
        Self::for_view(sex, ViewType::Front)
    }
}

/// 坐标目录键，例如 `female_cardiorespiratory`
pub fn coordinate_key(sex: Sex, view_type: ViewType) -> String {
    format!("{}_{}", sex.slug(), view_type.slug())
}

/// 检查记录字段
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ExamField {
    General,
    Cardiovascular,
    Respiratory,
    Abdominal,
    OtherSystems,
}

/// 检查记录输入
///
/// 每次调用整体提供，没有局部更新语义。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExaminationInput {
    #[serde(default)]
    pub general: Option<String>,
    #[serde(default)]
    pub cardiovascular: Option<String>,
    #[serde(default)]
    pub respiratory: Option<String>,
    #[serde(default)]
    pub abdominal: Option<String>,
    #[serde(default)]
    pub other_systems: Option<String>,
    pub sex: Sex,
}

impl ExaminationInput {
    /// 创建空白检查记录
    pub fn empty(sex: Sex) -> Self {
        Self {
            general: None,
            cardiovascular: None,
            respiratory: None,
            abdominal: None,
            other_systems: None,
            sex,
        }
    }

    pub fn with_field(mut self, field: ExamField, text: impl Into<String>) -> Self {
        let value = Some(text.into());
        match field {
            ExamField::General => self.general = value,
            ExamField::Cardiovascular => self.cardiovascular = value,
            ExamField::Respiratory => self.respiratory = value,
            ExamField::Abdominal => self.abdominal = value,
            ExamField::OtherSystems => self.other_systems = value,
        }
        self
    }

    /// 读取字段文本，空白视为缺失
    pub fn field(&self, field: ExamField) -> Option<&str> {
        let value = match field {
            ExamField::General => &self.general,
            ExamField::Cardiovascular => &self.cardiovascular,
            ExamField::Respiratory => &self.respiratory,
            ExamField::Abdominal => &self.abdominal,
            ExamField::OtherSystems => &self.other_systems,
        };
        value.as_deref().map(str::trim).filter(|text| !text.is_empty())
    }

    /// 按固定顺序拼接所有非空字段，字段之间以换行分隔
    pub fn combined_text(&self) -> String {
        [
            ExamField::General,
            ExamField::Cardiovascular,
            ExamField::Respiratory,
            ExamField::Abdominal,
            ExamField::OtherSystems,
        ]
        .iter()
        .filter_map(|field| self.field(*field))
        .collect::<Vec<_>>()
        .join("\n")
    }

    pub fn is_empty(&self) -> bool {
        self.combined_text().is_empty()
    }
}

/// 候选视图评分
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredCandidate {
    pub view_type: ViewType,
    pub score: f64,
    /// 基础分之外由关键词规则贡献的分数
    pub evidence: f64,
    pub reasoning: Vec<String>,
}

/// 分类结果
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisResult {
    pub primary_diagram: DiagramConfig,
    pub secondary_diagrams: Vec<DiagramConfig>,
    /// 取值范围 [0.5, 0.9]
    pub confidence: f64,
    pub reasoning: Vec<String>,
    pub scores: Vec<ScoredCandidate>,
}

/// 坐标目录条目
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogEntry {
    pub body_part: String,
    pub coordinate: Coordinate,
}

/// 坐标目录
///
/// 保持来源文档中的键顺序，提取器按此顺序输出发现。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CoordinateCatalog {
    pub diagram_key: String,
    entries: Vec<CatalogEntry>,
}

/// 坐标目录文件格式
#[derive(Debug, Deserialize)]
struct CatalogDocument {
    #[serde(default)]
    diagram: Option<String>,
    coordinates: serde_json::Map<String, serde_json::Value>,
}

impl CoordinateCatalog {
    pub fn new(diagram_key: impl Into<String>) -> Self {
        Self {
            diagram_key: diagram_key.into(),
            entries: Vec::new(),
        }
    }

    /// 解析 JSON 目录文件
    ///
    /// 文件格式为 `{"diagram": "...", "coordinates": {"left_knee": {"x": 1, "y": 2}}}`。
    pub fn from_json(diagram_key: &str, json: &str) -> Result<Self> {
        let document: CatalogDocument = serde_json::from_str(json)?;
        if let Some(declared) = &document.diagram {
            if declared != diagram_key {
                tracing::debug!(
                    "Catalog file declares diagram {} but was requested as {}",
                    declared,
                    diagram_key
                );
            }
        }

        let mut catalog = Self::new(diagram_key);
        for (body_part, value) in document.coordinates {
            let coordinate: Coordinate = serde_json::from_value(value)?;
            catalog.insert(body_part, coordinate);
        }
        Ok(catalog)
    }

    /// 插入或替换坐标，替换时保留原有位置
    pub fn insert(&mut self, body_part: impl Into<String>, coordinate: Coordinate) {
        let body_part = body_part.into();
        match self.entries.iter_mut().find(|entry| entry.body_part == body_part) {
            Some(entry) => entry.coordinate = coordinate,
            None => self.entries.push(CatalogEntry { body_part, coordinate }),
        }
    }

    pub fn with_entry(mut self, body_part: impl Into<String>, x: f64, y: f64) -> Self {
        self.insert(body_part, Coordinate::new(x, y));
        self
    }

    pub fn get(&self, body_part: &str) -> Option<Coordinate> {
        self.entries
            .iter()
            .find(|entry| entry.body_part == body_part)
            .map(|entry| entry.coordinate)
    }

    pub fn contains(&self, body_part: &str) -> bool {
        self.get(body_part).is_some()
    }

    pub fn entries(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.body_part.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 提取出的单条检查发现
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Finding {
    pub body_part: String,
    pub description: String,
    pub reference_coordinate: Coordinate,
}

impl Finding {
    /// 部位名称，例如 `left_knee` -> `Left knee`
    pub fn body_part_label(&self) -> String {
        humanize_key(&self.body_part)
    }

    /// 图例用的短描述
    pub fn legend_label(&self, max_chars: usize) -> String {
        truncate_chars(&self.description, max_chars)
    }
}

/// 显示坐标（像素，相对图像左上角）
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DisplayPosition {
    pub left: f64,
    pub top: f64,
}

/// 投影后的发现
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectedFinding {
    pub position: DisplayPosition,
    /// 从 1 开始的序号，用于图上标记与图例对应
    pub ordinal: usize,
    pub finding: Finding,
}
