//! 画像1枚を分類して結果をJSONで表示する

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use waste_classifier_lib::{init_tracing, load_service, AppConfig};

#[derive(Parser, Debug)]
#[command(version, about = "画像1枚を分類して結果をJSONで表示します")]
struct Args {
    /// 分類する画像（JPG / PNG）
    image: PathBuf,

    /// 設定ファイル（JSON）
    #[arg(short, long, default_value_os_t = AppConfig::default_path())]
    config: PathBuf,

    /// 重みファイル（設定ファイルより優先）
    #[arg(short, long)]
    weights: Option<PathBuf>,

    /// クラスラベルファイル（設定ファイルより優先）
    #[arg(short, long)]
    labels: Option<PathBuf>,

    /// 重みが読み込めなくても推論する
    #[arg(long)]
    serve_uninitialized: bool,
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();

    let mut config = AppConfig::load_or_default(&args.config);
    if let Some(weights) = args.weights {
        config.model.weights_path = weights;
    }
    if let Some(labels) = args.labels {
        config.model.labels_path = labels;
    }
    config.model.serve_uninitialized |= args.serve_uninitialized;

    let service = load_service(&config);
    let result = service
        .predict(&args.image)
        .with_context(|| format!("分類できませんでした: {}", args.image.display()))?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
