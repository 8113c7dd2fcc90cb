use anyhow::{Context, Result};
use serde_json::json;

use manuel_core::models::ExportFormat;

use crate::app::App;
use crate::cli::{ExportFormatArg, UsageCommand};

pub async fn run(app: &App, command: UsageCommand) -> Result<()> {
    let api = app.api()?;
    let _countdown = app.watch_retries();
    let out = app.output;

    match command {
        UsageCommand::Stats => {
            let stats = api.usage_stats().await?;
            out.emit(&stats, |stats| {
                println!("Queries:  {} ({} text, {} voice)", stats.total_queries, stats.text_queries, stats.voice_queries);
                println!("Manuals:  {}", stats.manuals_uploaded);
                println!("Cost:     ${:.2}", stats.total_cost);
                if let (Some(start), Some(end)) = (stats.period_start, stats.period_end) {
                    println!("Period:   {} to {}", start.format("%Y-%m-%d"), end.format("%Y-%m-%d"));
                }
            })?;
        }
        UsageCommand::History { limit } => {
            let history = api.usage_history(limit).await?;
            out.emit(&history, |history| {
                if history.entries.is_empty() {
                    println!("No queries yet");
                }
                for entry in &history.entries {
                    let cost = entry
                        .cost
                        .map(|c| format!("${:.4}", c))
                        .unwrap_or_default();
                    println!(
                        "{}  {:<6} {:>9}  {}",
                        entry.timestamp.format("%Y-%m-%d %H:%M"),
                        entry.query_type,
                        cost,
                        entry.question.as_deref().unwrap_or("")
                    );
                }
            })?;
        }
        UsageCommand::Costs => {
            let costs = api.usage_costs().await?;
            out.emit(&costs, |costs| {
                for (service, amount) in &costs.by_service {
                    println!("{:<20} {:>10.4}", service, amount);
                }
                println!("{:<20} {:>10.4} {}", "Total", costs.total, costs.currency);
            })?;
        }
        UsageCommand::Quotas => {
            let quotas = api.usage_quotas().await?;
            out.emit(&quotas, |quotas| {
                match quotas.queries_limit {
                    Some(limit) => println!("Queries: {} of {} used", quotas.queries_used, limit),
                    None => println!("Queries: {} used (no limit)", quotas.queries_used),
                }
                if let Some(limit) = quotas.storage_limit_bytes {
                    println!("Storage: {} of {} bytes used", quotas.storage_used_bytes, limit);
                }
                if let Some(resets_at) = quotas.resets_at {
                    println!("Resets:  {}", resets_at.format("%Y-%m-%d"));
                }
            })?;
        }
        UsageCommand::Export { format, output } => {
            let export = api.export_usage(export_format(format)).await?;
            match output {
                Some(path) => {
                    std::fs::write(&path, export.data.as_bytes())
                        .with_context(|| format!("Could not write {}", path.display()))?;
                    out.emit(&json!({ "format": export.format, "path": path }), |_| {
                        println!("Exported usage to {}", path.display())
                    })?;
                }
                None if out.is_json() => out.emit(&export, |_| {})?,
                None => print!("{}", export.data),
            }
        }
    }
    Ok(())
}

fn export_format(arg: ExportFormatArg) -> ExportFormat {
    match arg {
        ExportFormatArg::Csv => ExportFormat::Csv,
        ExportFormatArg::Json => ExportFormat::Json,
    }
}
