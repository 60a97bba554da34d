//! The `pixelgrade evaluate` command.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use pixelgrade_core::engine::Evaluator;
use pixelgrade_core::parser;
use pixelgrade_core::results::{EvaluationResult, PASS_GATE};
use pixelgrade_render::BrowserComparer;
use pixelgrade_store::config::load_config_from;

use super::render_config;

pub async fn execute(
    challenge_path: PathBuf,
    candidate_path: PathBuf,
    format: String,
    output: Option<PathBuf>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    anyhow::ensure!(
        matches!(format.as_str(), "text" | "json"),
        "unknown format '{format}' (expected text or json)"
    );

    let challenge = parser::parse_challenge(&challenge_path)?.challenge;
    let candidate = parser::load_candidate(&candidate_path)?;
    let config = load_config_from(config_path.as_deref())?;

    let (comparer, pool) = BrowserComparer::chrome(render_config(&config.render));
    let evaluator = Evaluator::new(Arc::new(comparer)).context("failed to build evaluator")?;

    let run_id = uuid::Uuid::new_v4().to_string();
    let result = evaluator
        .evaluate(
            &candidate,
            &challenge.expected_solution,
            challenge.passing_threshold,
            &run_id,
            Some(&challenge.id),
        )
        .await;
    pool.shutdown().await;

    if let Some(path) = &output {
        result.save_json(path)?;
        eprintln!("Result saved to: {}", path.display());
    }

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }

    Ok(())
}

fn yes_no(passed: bool) -> &'static str {
    if passed {
        "yes"
    } else {
        "no"
    }
}

/// Print a score table followed by feedback.
pub fn print_result(result: &EvaluationResult) {
    use comfy_table::{Cell, Table};

    let mut table = Table::new();
    table.set_header(vec!["Stage", "Score", "Threshold", "Passed"]);

    let structure_passed = result.structure.as_ref().is_some_and(|s| s.passed);
    let visual_passed = result.visual.as_ref().is_some_and(|v| v.passed);
    let content_passed = result.content.as_ref().is_some_and(|c| c.passed);

    table.add_row(vec![
        Cell::new("Content"),
        Cell::new(result.content_score),
        Cell::new(PASS_GATE),
        Cell::new(yes_no(content_passed)),
    ]);
    table.add_row(vec![
        Cell::new("Structure"),
        Cell::new(result.structure_score),
        Cell::new(result.thresholds.structure),
        Cell::new(yes_no(structure_passed)),
    ]);
    table.add_row(vec![
        Cell::new("Visual"),
        Cell::new(result.visual_score),
        Cell::new(result.thresholds.visual),
        Cell::new(yes_no(visual_passed)),
    ]);
    table.add_row(vec![
        Cell::new("Final"),
        Cell::new(result.final_score),
        Cell::new(PASS_GATE),
        Cell::new(yes_no(result.passed)),
    ]);

    println!("Submission: {}", result.submission_id);
    if let Some(challenge) = &result.challenge_id {
        println!("Challenge:  {challenge}");
    }
    println!("{table}");

    if let Some(visual) = &result.visual {
        if !visual.diff.screenshots.diff.is_empty() {
            println!("Diff image: {}", visual.diff.screenshots.diff);
        }
    }

    if !result.feedback.is_empty() {
        println!("\nFeedback:");
        for line in &result.feedback {
            println!("  - {line}");
        }
    }

    println!("\nResult: {}", if result.passed { "PASSED" } else { "FAILED" });
}
