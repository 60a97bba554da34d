//! The `pixelgrade status` command.

use std::path::PathBuf;

use anyhow::Result;

use pixelgrade_store::config::{create_store, load_config_from};

use super::evaluate::print_result;

pub async fn execute(id: String, format: String, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let stores = create_store(&config.store)?;

    let submission = stores
        .submissions
        .get_submission(&id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("submission not found: {id}"))?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&submission)?);
        return Ok(());
    }

    println!("Submission {} [{}]", submission.id, submission.status);
    println!("Challenge:  {}", submission.challenge_id);
    println!("Created:    {}", submission.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
    if let Some(result) = &submission.evaluation {
        println!();
        print_result(result);
    }
    Ok(())
}
