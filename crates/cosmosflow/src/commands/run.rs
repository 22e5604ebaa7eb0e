use colored::Colorize;
use cosmosflow_cloud::{Outcome, ProvisioningWorkflow, StepStatus, WorkflowReport};
use cosmosflow_cloud_azure::CosmosDataPlane;
use cosmosflow_config::Settings;
use std::process::ExitCode;

/// CLI フラグによる上書き (設定の最上位)
#[derive(Debug, Default)]
pub struct Overrides {
    pub region: Option<String>,
    pub read_regions: Vec<String>,
    pub database_id: Option<String>,
    pub container_id: Option<String>,
    pub throughput: Option<u32>,
}

impl Overrides {
    pub fn apply(self, settings: &mut Settings) {
        if let Some(region) = self.region {
            settings.region = region;
        }
        if !self.read_regions.is_empty() {
            settings.read_regions = self.read_regions;
        }
        if let Some(id) = self.database_id {
            settings.database_id = id;
        }
        if let Some(id) = self.container_id {
            settings.container_id = id;
        }
        if let Some(throughput) = self.throughput {
            settings.throughput = throughput;
        }
    }
}

pub async fn handle(mut settings: Settings, overrides: Overrides) -> anyhow::Result<ExitCode> {
    overrides.apply(&mut settings);

    // リモート呼び出しの前にすべて検証する
    let plan = settings.workflow_plan()?;
    let provider = super::build_provider(&settings)?;
    let data_plane = CosmosDataPlane::new();

    println!("{}", "Cosmos DB ワークフローを開始...".yellow().bold());
    println!("  リソースグループ: {}", plan.resource_group_name.cyan());
    println!("  アカウント:       {}", plan.account.name.cyan());
    println!(
        "  リージョン:       {}",
        plan.replica_locations
            .regions()
            .iter()
            .map(|r| r.as_str())
            .collect::<Vec<_>>()
            .join(" → ")
            .cyan()
    );
    println!();

    let workflow = ProvisioningWorkflow::new(&provider, &data_plane, plan);
    let report = workflow.run().await;

    print_report(&report);

    Ok(match report.outcome() {
        Outcome::Aborted(_) => ExitCode::FAILURE,
        Outcome::Succeeded | Outcome::Degraded => ExitCode::SUCCESS,
    })
}

fn print_report(report: &WorkflowReport) {
    println!("{}", "ステップ:".bold());
    let mut in_teardown = false;
    for record in &report.records {
        if record.step.is_teardown() && !in_teardown {
            in_teardown = true;
            println!("{}", "後片付け:".bold());
        }
        let line = format!("{:<22} {}", record.step.to_string(), record.message);
        match record.status {
            StepStatus::Succeeded => {
                let elapsed = format!("({}ms)", record.duration_ms);
                println!("  {} {} {}", "✓".green(), line, elapsed.dimmed())
            }
            StepStatus::NotFound => println!("  {} {}", "ℹ".blue(), line),
            StepStatus::Skipped => println!("  {} {}", "-".dimmed(), line.dimmed()),
            StepStatus::Failed => {
                let error = record.error.as_deref().unwrap_or("unknown error");
                println!("  {} {} {}", "✗".red(), line, error.red())
            }
        }
    }

    println!();
    println!("{}", report.summary());
    match report.outcome() {
        Outcome::Succeeded => println!("{}", "✓ 完了".green().bold()),
        Outcome::Degraded => println!(
            "{}",
            format!("⚠ 完了 (警告 {} 件)", report.warnings().len())
                .yellow()
                .bold()
        ),
        Outcome::Aborted(step) => {
            println!("{}", format!("✗ {} で中断しました", step).red().bold());
            if let Some((_, error)) = &report.aborted {
                println!("  {}", error.red());
            }
        }
    }
}
