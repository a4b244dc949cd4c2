//! BodyMap命令行程序
//!
//! 对一份检查记录运行完整的映射流程，并以 JSON 输出分类结果和叠加层。

use anyhow::{bail, Context, Result};
use bodymap_admin::{init_tracing, ConfigValidator, SystemManager};
use bodymap_catalog::CatalogOrigin;
use bodymap_core::{AnalysisResult, Dimensions, ExamField, ExaminationInput, Finding, Sex, ViewType};
use bodymap_engine::{OverlayLayer, OverlayState};
use clap::Parser;
use serde::Serialize;
use tracing::{error, info};

/// 命令行参数
#[derive(Parser, Debug)]
#[command(name = "bodymap")]
#[command(about = "把检查记录映射到人体示意图并输出叠加层")]
struct Args {
    /// 检查记录 JSON 文件
    #[arg(short, long)]
    input: Option<String>,

    /// 一般检查
    #[arg(long)]
    general: Option<String>,

    /// 心血管检查
    #[arg(long)]
    cardiovascular: Option<String>,

    /// 呼吸系统检查
    #[arg(long)]
    respiratory: Option<String>,

    /// 腹部检查
    #[arg(long)]
    abdominal: Option<String>,

    /// 其他系统检查
    #[arg(long)]
    other_systems: Option<String>,

    /// 性别 (male/female)，覆盖输入文件中的值
    #[arg(short, long)]
    sex: Option<String>,

    /// 手动指定视图，例如 left-side
    #[arg(long)]
    view: Option<String>,

    /// 显示尺寸，例如 250x500
    #[arg(short, long)]
    display: Option<String>,

    /// 配置文件路径
    #[arg(short, long)]
    config: Option<String>,

    /// 坐标目录路径，覆盖配置
    #[arg(long)]
    catalog_dir: Option<String>,

    /// 日志级别，覆盖配置
    #[arg(short, long)]
    log_level: Option<String>,
}

/// 输出报告
#[derive(Serialize)]
struct Report<'a> {
    view_id: String,
    state: OverlayState,
    analysis: Option<&'a AnalysisResult>,
    catalog_origin: Option<CatalogOrigin>,
    findings: &'a [Finding],
    overlay: Option<OverlayLayer>,
}

fn parse_display(value: &str) -> Result<Dimensions> {
    let (width, height) = value
        .split_once(|c: char| c == 'x' || c == 'X')
        .with_context(|| format!("Display size must look like WIDTHxHEIGHT, got {}", value))?;
    let dimensions = Dimensions::new(
        width.trim().parse().context("Invalid display width")?,
        height.trim().parse().context("Invalid display height")?,
    );
    if !dimensions.is_usable() {
        bail!("Display size must be positive, got {}", value);
    }
    Ok(dimensions)
}

fn read_input(args: &Args) -> Result<ExaminationInput> {
    let sex_override = args.sex.as_deref().map(str::parse::<Sex>).transpose()?;

    let mut input = match &args.input {
        Some(path) => {
            let data = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read input file {}", path))?;
            let mut value: serde_json::Value =
                serde_json::from_str(&data).context("Input file is not valid JSON")?;
            if let (Some(object), Some(sex)) = (value.as_object_mut(), sex_override) {
                object.insert("sex".to_string(), serde_json::to_value(sex)?);
            }
            serde_json::from_value(value).context("Input file is not a valid examination record")?
        }
        None => ExaminationInput::empty(sex_override.unwrap_or(Sex::Female)),
    };

    for (field, text) in [
        (ExamField::General, &args.general),
        (ExamField::Cardiovascular, &args.cardiovascular),
        (ExamField::Respiratory, &args.respiratory),
        (ExamField::Abdominal, &args.abdominal),
        (ExamField::OtherSystems, &args.other_systems),
    ] {
        if let Some(text) = text {
            input = input.with_field(field, text.clone());
        }
    }
    Ok(input)
}

async fn run(args: Args) -> Result<()> {
    // 先加载配置，日志在订阅器安装之后才输出
    let manager = SystemManager::new(args.config.as_deref())?;

    let mut config = manager.config_manager().get_config().await;
    if let Some(dir) = &args.catalog_dir {
        config.catalog.root_path = dir.clone();
    }
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    ConfigValidator::new().validate(&config)?;

    init_tracing(&config.logging)?;
    info!(
        "Configuration loaded from {}",
        manager.config_manager().config_path().unwrap_or("defaults and environment")
    );
    manager.config_manager().update_config(config.clone()).await?;
    info!("Catalog directory: {}", config.catalog.root_path);

    let input = read_input(&args)?;
    let mut view = manager.open_view().await;
    view.refresh(input).await?;

    if let Some(view_name) = &args.view {
        let view_type: ViewType = view_name.parse()?;
        view.show_view(view_type).await?;
    }
    if let Some(display) = &args.display {
        view.image_ready(parse_display(display)?)?;
    }

    let report = Report {
        view_id: view.view_id().to_string(),
        state: view.state(),
        analysis: view.analysis(),
        catalog_origin: view.catalog_origin(),
        findings: view.findings(),
        overlay: view.overlay(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Err(e) = run(args).await {
        error!("bodymap failed: {:#}", e);
        return Err(e);
    }
    Ok(())
}
