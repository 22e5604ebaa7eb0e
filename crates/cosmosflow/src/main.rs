mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "cosmosflow")]
#[command(
    about = "Provision a Cosmos DB account, exercise it, and tear it all down",
    long_about = None
)]
struct Cli {
    /// 設定ファイル (YAML)。省略時は COSMOSFLOW_CONFIG、~/.config/cosmosflow/config.yaml の順
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// リソースグループとアカウントを作成し、検証後に削除する
    Run {
        /// 書き込みリージョン (リソースグループも同じリージョン)
        #[arg(short, long)]
        region: Option<String>,
        /// パッチで追加する読み取りリージョン (複数指定可、順序がフェイルオーバー優先度)
        #[arg(long = "read-region")]
        read_regions: Vec<String>,
        /// データベース ID
        #[arg(long)]
        database_id: Option<String>,
        /// コンテナ ID
        #[arg(long)]
        container_id: Option<String>,
        /// コンテナのスループット (RU/s)
        #[arg(long)]
        throughput: Option<u32>,
    },
    /// リソースグループ内のデータベースアカウントを一覧表示
    Accounts {
        /// リソースグループ名
        #[arg(short = 'g', long)]
        resource_group: String,
    },
    /// 解決済みの設定を表示 (シークレットはマスク)
    Config,
    /// バージョン情報を表示
    Version,
}

#[tokio::main]
async fn main() -> ExitCode {
    // ログは stderr、結果表示は stdout
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:?}", e);
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(cli: Cli) -> anyhow::Result<ExitCode> {
    // Versionコマンドは設定ファイル不要
    if matches!(cli.command, Commands::Version) {
        println!("cosmosflow {}", env!("CARGO_PKG_VERSION"));
        return Ok(ExitCode::SUCCESS);
    }

    let config_path = cli.config.as_deref();
    let settings = commands::load_settings(config_path)?;

    match cli.command {
        Commands::Run {
            region,
            read_regions,
            database_id,
            container_id,
            throughput,
        } => {
            let overrides = commands::run::Overrides {
                region,
                read_regions,
                database_id,
                container_id,
                throughput,
            };
            commands::run::handle(settings, overrides).await
        }
        Commands::Accounts { resource_group } => {
            commands::accounts::handle(&settings, &resource_group).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Config => {
            commands::config::handle(&settings, config_path)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Version => unreachable!("Version is handled before config loading"),
    }
}
