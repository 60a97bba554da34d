//! Evaluation result types.
//!
//! An `EvaluationResult` is created fresh for every evaluation call and handed
//! to whoever asked for it; the engine never keeps a copy.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dom::ImageRef;
use crate::model::Thresholds;

/// Weight of the content score in the final blend.
pub const CONTENT_WEIGHT: f64 = 0.50;
/// Weight of the structure score in the final blend.
pub const STRUCTURE_WEIGHT: f64 = 0.00;
/// Weight of the visual score in the final blend.
pub const VISUAL_WEIGHT: f64 = 0.50;
/// Weight of the behavior score in the final blend.
pub const BEHAVIOR_WEIGHT: f64 = 0.00;

/// Fixed gate applied to content, visual and final scores.
pub const PASS_GATE: u8 = 70;

/// Blend stage scores into the final score.
pub fn final_score(content: u8, structure: u8, visual: u8, behavior: u8) -> u8 {
    let blended = content as f64 * CONTENT_WEIGHT
        + structure as f64 * STRUCTURE_WEIGHT
        + visual as f64 * VISUAL_WEIGHT
        + behavior as f64 * BEHAVIOR_WEIGHT;
    clamp_score(blended)
}

/// Round a percentage and clamp it into `0..=100`.
pub fn clamp_score(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(0.0, 100.0) as u8
}

// ---------------------------------------------------------------------------
// Content
// ---------------------------------------------------------------------------

/// The kind of criterion a requirement checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequirementKind {
    TextContent,
    HtmlStructure,
    Images,
    CssProperties,
    ClassNames,
}

impl fmt::Display for RequirementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequirementKind::TextContent => write!(f, "text content"),
            RequirementKind::HtmlStructure => write!(f, "html structure"),
            RequirementKind::Images => write!(f, "images"),
            RequirementKind::CssProperties => write!(f, "css properties"),
            RequirementKind::ClassNames => write!(f, "class names"),
        }
    }
}

/// What a requirement needs to see in the candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "values", rename_all = "snake_case")]
pub enum RequirementData {
    Texts(Vec<String>),
    TagCounts(BTreeMap<String, u32>),
    Images(Vec<ImageRef>),
    CssProperties(Vec<String>),
    ClassNames(Vec<String>),
}

impl RequirementData {
    pub fn len(&self) -> usize {
        match self {
            RequirementData::Texts(v)
            | RequirementData::CssProperties(v)
            | RequirementData::ClassNames(v) => v.len(),
            RequirementData::TagCounts(m) => m.len(),
            RequirementData::Images(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One scored criterion mined from the expected solution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Requirement {
    pub kind: RequirementKind,
    pub description: String,
    pub required: RequirementData,
    pub weight: u32,
}

/// Outcome of checking one requirement against the candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequirementResult {
    pub kind: RequirementKind,
    pub passed: bool,
    /// Share of the requirement satisfied, `0..=100`.
    pub score: u8,
    pub weight: u32,
    pub details: String,
    /// Items the candidate satisfied.
    #[serde(default)]
    pub matched: Vec<String>,
    /// Items the candidate is missing.
    #[serde(default)]
    pub missing: Vec<String>,
}

/// Output of the structural content checker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentReport {
    pub score: u8,
    pub passed: bool,
    pub requirements: Vec<RequirementResult>,
}

impl ContentReport {
    pub fn requirement(&self, kind: RequirementKind) -> Option<&RequirementResult> {
        self.requirements.iter().find(|r| r.kind == kind)
    }
}

// ---------------------------------------------------------------------------
// Structure
// ---------------------------------------------------------------------------

/// How confidently a role was located.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    /// Found, full credit.
    High,
    /// Partially matched, half credit.
    Medium,
    Missing,
}

impl Confidence {
    /// Credit toward the structure score.
    pub fn credit(self) -> f64 {
        match self {
            Confidence::High => 1.0,
            Confidence::Medium => 0.5,
            Confidence::Missing => 0.0,
        }
    }
}

/// Where one semantic role was found (or not).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleMatch {
    pub role: String,
    pub required: bool,
    /// Whether the role contributes to the structure score.
    pub counted: bool,
    pub confidence: Confidence,
    /// Evidence score of the best element.
    pub score: u32,
    /// Locator and reasons for the best element, empty when missing.
    pub evidence: String,
}

/// Output of the semantic role matcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureReport {
    pub score: u8,
    /// `score >= thresholds.structure`.
    pub passed: bool,
    /// Roles counted in the denominator.
    pub total_roles: usize,
    pub matches: Vec<RoleMatch>,
}

impl StructureReport {
    pub fn role(&self, name: &str) -> Option<&RoleMatch> {
        self.matches.iter().find(|m| m.role == name)
    }

    pub fn with_confidence(&self, confidence: Confidence) -> impl Iterator<Item = &RoleMatch> {
        self.matches
            .iter()
            .filter(move |m| m.confidence == confidence)
    }
}

// ---------------------------------------------------------------------------
// Visual
// ---------------------------------------------------------------------------

/// Paths of the screenshots written for one comparison.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenshotRefs {
    pub candidate: String,
    pub expected: String,
    pub diff: String,
}

/// Dimensions recorded when the two screenshots differ in size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeMismatch {
    pub candidate_width: u32,
    pub candidate_height: u32,
    pub expected_width: u32,
    pub expected_height: u32,
}

/// Output of the visual diff engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualDiffResult {
    pub score: u8,
    pub diff_pixels: u64,
    pub total_pixels: u64,
    pub diff_percentage: f64,
    #[serde(default)]
    pub screenshots: ScreenshotRefs,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_mismatch: Option<SizeMismatch>,
    /// Message of an exception thrown by the candidate's script, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_error: Option<String>,
}

impl VisualDiffResult {
    /// Build a result from raw pixel counts.
    pub fn from_counts(diff_pixels: u64, total_pixels: u64) -> Self {
        let diff_percentage = if total_pixels == 0 {
            0.0
        } else {
            diff_pixels as f64 / total_pixels as f64 * 100.0
        };
        Self {
            score: clamp_score((100.0 - diff_percentage).max(0.0)),
            diff_pixels,
            total_pixels,
            diff_percentage,
            screenshots: ScreenshotRefs::default(),
            size_mismatch: None,
            script_error: None,
        }
    }
}

/// Visual stage as reported inside an `EvaluationResult`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualReport {
    /// `score >= thresholds.visual`.
    pub passed: bool,
    #[serde(flatten)]
    pub diff: VisualDiffResult,
}

// ---------------------------------------------------------------------------
// EvaluationResult
// ---------------------------------------------------------------------------

/// Top-level result of one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub submission_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenge_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub content_score: u8,
    pub structure_score: u8,
    pub visual_score: u8,
    /// Reserved for interactivity testing; always 0.
    pub behavior_score: u8,
    pub final_score: u8,
    pub passed: bool,
    /// Thresholds the caller supplied for the per-stage flags.
    pub thresholds: Thresholds,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<ContentReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structure: Option<StructureReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual: Option<VisualReport>,
    pub feedback: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EvaluationResult {
    /// A zero-score result carrying an error, used when a stage fails.
    pub fn degraded(
        submission_id: &str,
        challenge_id: Option<&str>,
        thresholds: Thresholds,
        error: impl fmt::Display,
    ) -> Self {
        let message = error.to_string();
        Self {
            submission_id: submission_id.to_string(),
            challenge_id: challenge_id.map(str::to_string),
            timestamp: Utc::now(),
            content_score: 0,
            structure_score: 0,
            visual_score: 0,
            behavior_score: 0,
            final_score: 0,
            passed: false,
            thresholds,
            content: None,
            structure: None,
            visual: None,
            feedback: vec![format!("Evaluation failed: {message}")],
            error: Some(message),
        }
    }

    /// Save the result as pretty JSON.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize result")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write result to {}", path.display()))?;
        Ok(())
    }

    /// Load a result saved with [`EvaluationResult::save_json`].
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read result from {}", path.display()))?;
        serde_json::from_str(&content).context("failed to parse result JSON")
    }
}
