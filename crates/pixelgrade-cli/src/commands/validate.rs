//! The `pixelgrade validate` command.

use std::path::PathBuf;

use anyhow::Result;

use pixelgrade_core::parser;

pub fn execute(challenge_path: PathBuf) -> Result<()> {
    let challenges = parser::load_challenges(&challenge_path)?;
    anyhow::ensure!(
        !challenges.is_empty(),
        "no challenges found in {}",
        challenge_path.display()
    );

    for parsed in &challenges {
        let c = &parsed.challenge;
        let t = c.passing_threshold;
        println!(
            "Challenge: {} ({}) thresholds structure {} / visual {} / overall {}",
            c.id, c.name, t.structure, t.visual, t.overall
        );
    }

    let warnings = parser::validate_challenges(&challenges);
    for w in &warnings {
        let prefix = w
            .challenge_id
            .as_ref()
            .map(|id| format!("  [{id}]"))
            .unwrap_or_else(|| "  ".to_string());
        println!("{prefix} WARNING: {}", w.message);
    }

    if warnings.is_empty() {
        println!("All challenges valid.");
    } else {
        println!("\n{} warning(s) found.", warnings.len());
    }

    Ok(())
}
