pub mod error;
pub mod settings;

pub use error::*;
pub use settings::{Credentials, Settings};

use std::path::PathBuf;

pub const CONFIG_PATH_ENV: &str = "COSMOSFLOW_CONFIG";
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// CosmosFlowの設定ディレクトリを取得
pub fn get_config_dir() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("cosmosflow"))
}

/// 設定ファイルを探す
///
/// 以下の優先順位で検索:
/// 1. 環境変数 COSMOSFLOW_CONFIG (直接パス指定、存在しなければエラー)
/// 2. ~/.config/cosmosflow/config.yaml (グローバル設定)
///
/// どちらも無い場合は `None` (組み込みデフォルトを使う)
pub fn find_config_file() -> Result<Option<PathBuf>> {
    // 1. 環境変数で直接指定
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV)
        && !config_path.trim().is_empty()
    {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(Some(path));
        }
        return Err(ConfigError::ConfigFileNotFound(path));
    }

    // 2. グローバル設定ファイル
    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join("cosmosflow").join(CONFIG_FILE_NAME);
        if global_config.exists() {
            return Ok(Some(global_config));
        }
    }

    Ok(None)
}
