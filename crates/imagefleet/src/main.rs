mod commands;

use clap::{Parser, Subcommand};
use imagefleet_core::TagFailurePolicy;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "imagefleet")]
#[command(about = "依存関係の順にコンテナイメージをまとめてビルド", long_about = None)]
struct Cli {
    /// マニフェストファイル（省略時は IMAGEFLEET_FILE またはカレントディレクトリから探索）
    #[arg(short = 'f', long = "file", global = true)]
    file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// イメージをビルド・タグ付け・プッシュ
    Build(BuildArgs),
    /// イメージをビルド順に表示
    List,
    /// マニフェストと依存関係を検証
    Validate,
    /// バージョン情報を表示
    Version,
}

#[derive(clap::Args, Debug, Clone)]
pub struct BuildArgs {
    /// ビルド対象（依存イメージも含む）。省略時は全イメージ
    pub targets: Vec<String>,

    /// 同時にビルドするイメージ数の上限
    #[arg(short = 'j', long)]
    pub concurrency: Option<usize>,

    /// プッシュしない
    #[arg(long)]
    pub no_push: bool,

    /// Dockerを使わずにビルド計画だけを確認
    #[arg(long)]
    pub dry_run: bool,

    /// キャッシュを使わずにビルド
    #[arg(long)]
    pub no_cache: bool,

    /// ベースイメージを常にpull
    #[arg(long)]
    pub pull: bool,

    /// タグ付けに失敗したとき残りのタグを続けるか (continue, abort)
    #[arg(long, value_name = "POLICY")]
    pub tag_failure: Option<TagFailurePolicy>,

    /// 結果をJSONで出力
    #[arg(long)]
    pub json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Version => {
            println!("imagefleet {}", env!("CARGO_PKG_VERSION"));
        }
        Commands::Validate => {
            commands::validate::handle(cli.file.as_deref())?;
        }
        Commands::List => {
            commands::list::handle(cli.file.as_deref())?;
        }
        Commands::Build(args) => {
            let success = commands::build::handle(cli.file.as_deref(), &args).await?;
            if !success {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
