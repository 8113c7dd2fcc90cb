use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::json;

use manuel_core::models::Manual;

use crate::app::App;
use crate::cli::ManualsCommand;

pub async fn run(app: &App, command: ManualsCommand) -> Result<()> {
    let api = app.api()?;
    let _countdown = app.watch_retries();
    let out = app.output;

    match command {
        ManualsCommand::List => {
            let manuals = api.list_manuals().await?;
            out.emit(&manuals, |manuals| print_manuals(manuals))?;
        }
        ManualsCommand::Upload { file, name } => {
            let content = std::fs::read(&file)
                .with_context(|| format!("Could not read {}", file.display()))?;
            let file_name = match name {
                Some(name) => name,
                None => file_name_of(&file)?,
            };
            let manual = api
                .upload_manual(&file_name, document_content_type(&file), &content)
                .await?;
            out.emit(&manual, |manual| {
                println!("Uploaded {} ({})", manual.display_name(), manual.id);
            })?;
        }
        ManualsCommand::Download { id, output } => {
            let bytes = api.download_manual(&id).await?;
            let path = output.unwrap_or_else(|| PathBuf::from(format!("{}.pdf", id)));
            std::fs::write(&path, &bytes)
                .with_context(|| format!("Could not write {}", path.display()))?;
            out.emit(
                &json!({ "id": id, "path": path, "bytes": bytes.len() }),
                |_| println!("Saved {} bytes to {}", bytes.len(), path.display()),
            )?;
        }
        ManualsCommand::Delete { id } => {
            api.delete_manual(&id).await?;
            out.success(&format!("Deleted manual {}", id));
        }
    }
    Ok(())
}

fn print_manuals(manuals: &[Manual]) {
    if manuals.is_empty() {
        println!("No manuals uploaded yet");
        return;
    }
    println!("{:<38} {:<40} {:>10} {:>6}", "ID", "NAME", "SIZE", "PAGES");
    for manual in manuals {
        let pages = manual
            .pages
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<38} {:<40} {:>10} {:>6}",
            manual.id,
            manual.display_name(),
            manual.size_display(),
            pages
        );
    }
}

fn file_name_of(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .with_context(|| format!("{} has no file name", path.display()))
}

fn document_content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}
