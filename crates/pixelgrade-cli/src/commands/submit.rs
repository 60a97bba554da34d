//! The `pixelgrade submit` command.

use std::path::PathBuf;

use anyhow::Result;

use pixelgrade_core::model::Submission;
use pixelgrade_core::parser;
use pixelgrade_store::config::{create_store, load_config_from};

pub async fn execute(
    challenge_id: String,
    candidate_path: PathBuf,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let stores = create_store(&config.store)?;

    if stores.challenges.get_challenge(&challenge_id).await?.is_none() {
        anyhow::bail!("unknown challenge '{challenge_id}'");
    }

    let code = parser::load_candidate(&candidate_path)?;
    let submission = Submission::queued(&challenge_id, code);
    let id = submission.id.clone();
    stores.submissions.enqueue(submission).await?;

    tracing::info!(id = %id, challenge = %challenge_id, "submission queued");
    println!("Queued submission {id}");
    Ok(())
}
