//! 重みファイルの内容と、選択される分類ヘッドを表示する

use std::path::PathBuf;

use anyhow::Context;
use burn::backend::NdArray;
use clap::Parser;
use waste_classifier_lib::ml::{HeadVariant, InferenceEngine};
use waste_classifier_lib::model::{is_model_bundle, load_class_labels, load_metadata, print_metadata_info};

#[derive(Parser, Debug)]
#[command(version, about = "重みファイルのメタデータと分類ヘッドを表示します")]
struct Args {
    /// 重みファイル（.tar.gz バンドル または .bin）
    weights: PathBuf,

    /// 指定するとラベルファイルと組み合わせて実際に読み込みを試す
    #[arg(short, long)]
    labels: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    waste_classifier_lib::init_tracing();
    let args = Args::parse();

    println!("=== 重みファイル: {} ===", args.weights.display());

    let declared = if is_model_bundle(&args.weights) {
        let metadata = load_metadata(&args.weights).context("メタデータ読み込みエラー")?;
        println!("✓ メタデータ読み込み成功");
        print_metadata_info(&metadata);
        metadata.head
    } else {
        println!("重みのみのファイル（メタデータなし）");
        None
    };

    let head = HeadVariant::for_weights(&args.weights, declared);
    println!("選択される分類ヘッド: {}", head);

    let Some(labels_path) = args.labels else {
        return Ok(());
    };

    let labels = load_class_labels(&labels_path)?;
    let engine = InferenceEngine::<NdArray>::load(&args.weights, &labels, Default::default());
    if let Some(reason) = engine.load_error() {
        anyhow::bail!("読み込み失敗: {}", reason);
    }

    println!("✓ 読み込み成功（クラス数: {}）", labels.len());
    Ok(())
}
