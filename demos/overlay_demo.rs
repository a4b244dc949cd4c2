//! 映射引擎演示程序
//!
//! 展示分类、目录回退、手动切换视图和叠加层投影

use bodymap_catalog::{CoordinateRepository, FileCatalogSource};
use bodymap_core::{Dimensions, ExamField, ExaminationInput, Sex, ViewType};
use bodymap_engine::OverlayOrchestrator;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt::init();

    let repository = Arc::new(CoordinateRepository::new(FileCatalogSource::new("./catalogs")));
    let mut view = OverlayOrchestrator::new(repository);

    println!("🩺 BodyMap 映射引擎演示\n");

    // 1. 心肺检查
    let input = ExaminationInput::empty(Sex::Male)
        .with_field(ExamField::General, "Alert, well appearing.")
        .with_field(
            ExamField::Cardiovascular,
            "Heart sounds S1 S2 normal, no murmurs. Apex beat not displaced.",
        )
        .with_field(ExamField::Respiratory, "Crackles at the right lower lobe. Left lung clear.");
    view.refresh(input).await?;

    if let Some(analysis) = view.analysis() {
        println!("📋 主视图: {}", analysis.primary_diagram.coordinate_key);
        println!("   置信度: {:.2}", analysis.confidence);
        for reason in &analysis.reasoning {
            println!("   - {}", reason);
        }
        for alternate in &analysis.secondary_diagrams {
            println!("   备选: {}", alternate.coordinate_key);
        }
    }

    // 2. 图像加载完成后投影
    view.image_ready(Dimensions::new(300.0, 300.0))?;
    if let Some(overlay) = view.overlay() {
        println!("\n📍 叠加层 ({}):", overlay.transform.css());
        for marker in &overlay.markers {
            println!(
                "   {}. {} @ ({:.1}, {:.1}) {}",
                marker.ordinal,
                marker.finding.body_part_label(),
                marker.position.left,
                marker.position.top,
                marker.finding.description
            );
        }
    }

    // 3. 手动切换到左侧视图
    view.show_view(ViewType::LeftSide).await?;
    view.image_ready(Dimensions::new(200.0, 500.0))?;
    if let Some(overlay) = view.overlay() {
        println!("\n↔️  左侧视图 ({}), {} 个标记", overlay.transform.css(), overlay.markers.len());
    }

    println!("\n{}", serde_json::to_string_pretty(&view.findings())?);
    Ok(())
}
