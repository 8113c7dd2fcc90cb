use std::path::Path;

use anyhow::{Context, Result};

use manuel_core::models::QueryResponse;

use crate::app::App;
use crate::cli::QueryCommand;

pub async fn run(app: &App, command: QueryCommand) -> Result<()> {
    let api = app.api()?;
    let _countdown = app.watch_retries();

    let response = match command {
        QueryCommand::Ask { question, manual } => api.ask(&question, manual.as_deref()).await?,
        QueryCommand::Voice {
            file,
            manual,
            content_type,
        } => {
            let audio = std::fs::read(&file)
                .with_context(|| format!("Could not read recording {}", file.display()))?;
            let content_type = content_type.unwrap_or_else(|| audio_content_type(&file).to_string());
            api.ask_voice(&audio, &content_type, manual.as_deref()).await?
        }
    };

    app.output.emit(&response, print_answer)
}

fn print_answer(response: &QueryResponse) {
    if let Some(transcription) = &response.transcription {
        println!("You asked: {}\n", transcription);
    }
    println!("{}", response.answer);

    if !response.sources.is_empty() {
        println!("\nSources:");
        for source in &response.sources {
            println!("  - {}", source.citation());
        }
    }

    match (response.cost, response.processing_time_ms) {
        (Some(cost), Some(ms)) => println!("\n${:.4} · {} ms", cost, ms),
        (Some(cost), None) => println!("\n${:.4}", cost),
        (None, Some(ms)) => println!("\n{} ms", ms),
        (None, None) => {}
    }
}

fn audio_content_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("wav") => "audio/wav",
        Some("mp3") => "audio/mpeg",
        Some("m4a") | Some("mp4") => "audio/mp4",
        Some("webm") => "audio/webm",
        Some("ogg") | Some("opus") => "audio/ogg",
        _ => "application/octet-stream",
    }
}
