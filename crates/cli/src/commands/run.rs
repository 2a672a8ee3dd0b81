//! `deepdive run`: research a query end to end.

use deepdive_core::research::{Depth, ResearchStatus};
use deepdive_pipeline::{PipelineSettings, ResearchPipeline, ResearchView};

use super::{default_provider, load_config, open_store};

pub const MIN_QUERY_CHARS: usize = 5;

/// Reject queries too short to plan research for.
pub fn validate_query(query: &str) -> Result<&str, String> {
    let trimmed = query.trim();
    if trimmed.chars().count() < MIN_QUERY_CHARS {
        return Err(format!(
            "Query must be at least {MIN_QUERY_CHARS} characters long"
        ));
    }
    Ok(trimmed)
}

pub async fn run(query: String, depth: Depth, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let query = validate_query(&query)?;
    let config = load_config()?;
    if !config.has_api_key() {
        return Err("No API key set (set DEEPDIVE_API_KEY or GEMINI_API_KEY)".into());
    }

    let provider = default_provider(&config)?;
    let store = open_store(&config).await?;
    let pipeline = ResearchPipeline::new(provider, store, PipelineSettings::from_config(&config));
    let listener = pipeline.spawn();

    println!("🔎 Researching ({depth}): {query}");
    let view = pipeline.run(query, depth).await?;
    listener.abort();

    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        print_view(&view);
    }
    Ok(())
}

pub(crate) fn print_view(view: &ResearchView) {
    let record = &view.record;
    println!();
    println!("  Research:  {}", record.id);
    println!("  Query:     {}", record.query);
    println!("  Depth:     {}", record.depth);
    println!("  Status:    {}", record.status);
    for (stage, state) in record.stage_progress.iter() {
        println!("    {:<10} {state}", stage.as_str());
    }

    match record.status {
        ResearchStatus::Completed => {
            if let Some(report) = &record.report {
                println!();
                println!("  📄 {}", report.title);
                println!("  Confidence: {}", report.confidence_level);
                println!();
                println!("{}", report.executive_summary);
                if !report.key_takeaways.is_empty() {
                    println!();
                    println!("  Key takeaways:");
                    for takeaway in &report.key_takeaways {
                        println!("   • {takeaway}");
                    }
                }
                if !report.conclusions.is_empty() {
                    println!();
                    println!("{}", report.conclusions);
                }
            }
        }
        ResearchStatus::Failed => {
            if let Some(error) = &record.error {
                println!();
                println!("  ❌ {error}");
            }
            if let Some(details) = &record.error_details {
                println!("  💡 {}", details.suggestion);
            }
        }
        ResearchStatus::Initiated => {
            println!();
            println!("  ⏳ Still in progress (phase: {:?})", record.phase());
        }
    }
}
