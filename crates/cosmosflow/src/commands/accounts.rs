use colored::Colorize;
use cosmosflow_cloud::ManagementApi;
use cosmosflow_config::Settings;

pub async fn handle(settings: &Settings, resource_group: &str) -> anyhow::Result<()> {
    let provider = super::build_provider(settings)?;

    let auth = provider.authenticate().await?;
    if !auth.authenticated {
        anyhow::bail!(
            "認証に失敗しました: {}",
            auth.error.unwrap_or_else(|| "unknown".to_string())
        );
    }

    let subscription = provider.resolve_subscription().await?;
    println!(
        "サブスクリプション: {}",
        subscription
            .display_name
            .as_deref()
            .unwrap_or(&subscription.id)
            .cyan()
    );

    let accounts = provider.list_accounts(resource_group).await?;
    if accounts.is_empty() {
        println!(
            "{}",
            format!("{} にデータベースアカウントはありません", resource_group).dimmed()
        );
        return Ok(());
    }

    println!(
        "{}",
        format!("データベースアカウント ({} 個):", accounts.len()).bold()
    );
    for account in &accounts {
        let regions: Vec<&str> = account.locations.iter().map(|l| l.region.as_str()).collect();
        println!("  • {} [{}]", account.name.cyan(), account.kind);
        println!("    {}", account.id.dimmed());
        if !regions.is_empty() {
            println!("    {}", regions.join(", "));
        }
    }

    Ok(())
}
