use colored::Colorize;
use cosmosflow_config::Settings;
use std::path::Path;

pub fn handle(settings: &Settings, explicit: Option<&Path>) -> anyhow::Result<()> {
    let source = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => cosmosflow_config::find_config_file()?,
    };
    match source {
        Some(path) => println!("{} {}", "設定ファイル:".bold(), path.display()),
        None => println!("{}", "設定ファイル: なし (デフォルト + 環境変数)".dimmed()),
    }
    println!();
    print!("{}", settings.to_redacted_yaml()?);
    Ok(())
}
