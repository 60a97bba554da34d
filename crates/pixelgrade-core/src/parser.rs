//! TOML challenge parser and candidate loader.
//!
//! Loads challenges from TOML files and directories, validates them, and
//! reads candidate code from a project directory or a TOML file.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::content::{extract_requirements, MAX_TEXT_LEN, MIN_TEXT_LEN};
use crate::dom::Dom;
use crate::model::{Challenge, CodeTriple, Thresholds};
use crate::results::RequirementKind;

/// File names read from a candidate project directory.
pub const HTML_FILE: &str = "index.html";
pub const CSS_FILE: &str = "style.css";
pub const JS_FILE: &str = "script.js";

/// Intermediate TOML structure for challenge files.
#[derive(Debug, Deserialize)]
struct TomlChallengeFile {
    challenge: TomlChallengeHeader,
    expected: TomlCode,
}

#[derive(Debug, Deserialize)]
struct TomlChallengeHeader {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
    /// Kept wide so out-of-range values surface as validation warnings.
    #[serde(default)]
    passing_threshold: Option<TomlThresholds>,
}

#[derive(Debug, Deserialize)]
struct TomlThresholds {
    #[serde(default = "default_threshold")]
    structure: u32,
    #[serde(default = "default_threshold")]
    visual: u32,
    #[serde(default = "default_threshold")]
    overall: u32,
}

fn default_threshold() -> u32 {
    70
}

#[derive(Debug, Default, Deserialize)]
struct TomlCode {
    #[serde(default)]
    html: String,
    #[serde(default)]
    css: String,
    #[serde(default)]
    js: String,
}

impl From<TomlCode> for CodeTriple {
    fn from(code: TomlCode) -> Self {
        CodeTriple::new(code.html, code.css, code.js)
    }
}

#[derive(Debug, Deserialize)]
struct TomlCandidateFile {
    code: TomlCode,
}

/// A challenge together with values that needed clamping while parsing.
#[derive(Debug, Clone)]
pub struct ParsedChallenge {
    pub challenge: Challenge,
    /// Threshold fields that were above 100, as `(field, value)`.
    pub clamped: Vec<(&'static str, u32)>,
}

/// Parse a single challenge TOML file.
pub fn parse_challenge(path: &Path) -> Result<ParsedChallenge> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read challenge file: {}", path.display()))?;

    parse_challenge_str(&content, path)
}

/// Parse a challenge from a TOML string.
pub fn parse_challenge_str(content: &str, source_path: &Path) -> Result<ParsedChallenge> {
    let parsed: TomlChallengeFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    if parsed.challenge.id.trim().is_empty() {
        bail!("challenge id is empty in {}", source_path.display());
    }

    let mut clamped = Vec::new();
    let passing_threshold = match parsed.challenge.passing_threshold {
        Some(t) => {
            let mut clamp = |field: &'static str, value: u32| -> u8 {
                if value > 100 {
                    clamped.push((field, value));
                }
                value.min(100) as u8
            };
            Thresholds {
                structure: clamp("structure", t.structure),
                visual: clamp("visual", t.visual),
                overall: clamp("overall", t.overall),
            }
        }
        None => Thresholds::default(),
    };

    let challenge = Challenge {
        id: parsed.challenge.id,
        name: parsed.challenge.name,
        description: parsed.challenge.description,
        expected_solution: parsed.expected.into(),
        passing_threshold,
    };

    Ok(ParsedChallenge { challenge, clamped })
}

/// Recursively load all `.toml` challenge files from a directory.
pub fn load_challenge_directory(dir: &Path) -> Result<Vec<ParsedChallenge>> {
    let mut challenges = Vec::new();

    if !dir.is_dir() {
        bail!("not a directory: {}", dir.display());
    }

    let mut entries: Vec<_> = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
        .collect::<std::io::Result<_>>()?;
    entries.sort_by_key(|e| e.path());

    for entry in entries {
        let path = entry.path();

        if path.is_dir() {
            challenges.extend(load_challenge_directory(&path)?);
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            match parse_challenge(&path) {
                Ok(parsed) => challenges.push(parsed),
                Err(e) => {
                    tracing::warn!("skipping {}: {:#}", path.display(), e);
                }
            }
        }
    }

    Ok(challenges)
}

/// Load challenges from a single file or a directory.
pub fn load_challenges(path: &Path) -> Result<Vec<ParsedChallenge>> {
    if path.is_dir() {
        load_challenge_directory(path)
    } else {
        Ok(vec![parse_challenge(path)?])
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// A warning from challenge validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationWarning {
    pub challenge_id: Option<String>,
    pub message: String,
}

impl ValidationWarning {
    fn new(challenge_id: &str, message: impl Into<String>) -> Self {
        Self {
            challenge_id: Some(challenge_id.to_string()),
            message: message.into(),
        }
    }
}

/// Validate one challenge for common authoring mistakes.
pub fn validate_challenge(parsed: &ParsedChallenge) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();
    let challenge = &parsed.challenge;
    let expected = &challenge.expected_solution;

    for (field, value) in &parsed.clamped {
        warnings.push(ValidationWarning::new(
            &challenge.id,
            format!("passing_threshold.{field} is {value}, clamped to 100"),
        ));
    }

    if expected.html.trim().is_empty() {
        warnings.push(ValidationWarning::new(
            &challenge.id,
            "expected html is empty",
        ));
        return warnings;
    }

    let has_text = Dom::parse(&expected.html)
        .text_nodes()
        .iter()
        .any(|t| (MIN_TEXT_LEN..=MAX_TEXT_LEN).contains(&t.chars().count()));
    if !has_text {
        warnings.push(ValidationWarning::new(
            &challenge.id,
            "expected solution has no extractable text; text content will always pass",
        ));
    }

    let requirements = extract_requirements(expected);
    if !requirements
        .iter()
        .any(|r| r.kind == RequirementKind::ClassNames && !r.required.is_empty())
    {
        warnings.push(ValidationWarning::new(
            &challenge.id,
            "expected solution uses no class names",
        ));
    }

    warnings
}

/// Validate a set of challenges, including cross-challenge checks.
pub fn validate_challenges(challenges: &[ParsedChallenge]) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    let mut seen_ids = HashSet::new();
    for parsed in challenges {
        if !seen_ids.insert(&parsed.challenge.id) {
            warnings.push(ValidationWarning::new(
                &parsed.challenge.id,
                format!("duplicate challenge ID: {}", parsed.challenge.id),
            ));
        }
    }

    for parsed in challenges {
        warnings.extend(validate_challenge(parsed));
    }

    warnings
}

// ---------------------------------------------------------------------------
// Candidate code
// ---------------------------------------------------------------------------

/// Load candidate code from a project directory or a TOML file with a
/// `[code]` table. Missing files in a directory read as empty.
pub fn load_candidate(path: &Path) -> Result<CodeTriple> {
    if path.is_dir() {
        let read = |name: &str| -> Result<String> {
            let file = path.join(name);
            if file.is_file() {
                std::fs::read_to_string(&file)
                    .with_context(|| format!("failed to read {}", file.display()))
            } else {
                Ok(String::new())
            }
        };
        let code = CodeTriple::new(read(HTML_FILE)?, read(CSS_FILE)?, read(JS_FILE)?);
        if code.is_blank() {
            bail!(
                "no {HTML_FILE}, {CSS_FILE} or {JS_FILE} found in {}",
                path.display()
            );
        }
        return Ok(code);
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read candidate file: {}", path.display()))?;

    match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => {
            let parsed: TomlCandidateFile = toml::from_str(&content)
                .with_context(|| format!("failed to parse TOML: {}", path.display()))?;
            Ok(parsed.code.into())
        }
        Some("html") | Some("htm") => Ok(CodeTriple::html(content)),
        _ => bail!(
            "unsupported candidate file {} (expected a directory, .toml or .html)",
            path.display()
        ),
    }
}
