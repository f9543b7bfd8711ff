use std::path::PathBuf;

use clap::Parser;
use waste_classifier_lib::{init_tracing, run, AppConfig};

/// 廃棄物画像分類サーバー
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// 設定ファイル（JSON）
    #[arg(short, long, default_value_os_t = AppConfig::default_path())]
    config: PathBuf,

    /// 待ち受けポート（設定ファイルより優先）
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Args::parse();
    let mut config = AppConfig::load_or_default(&args.config);
    if let Some(port) = args.port {
        config.server.port = port;
    }

    run(config).await
}
