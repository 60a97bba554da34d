//! Semantic role matcher.
//!
//! Locates UI roles (title, price, button, ...) by structural evidence rather
//! than exact markup. The catalogue is plain data: each [`RoleSpec`] lists the
//! [`MatchStrategy`]s that contribute evidence, and [`score_element`] is a pure
//! function over [`ElementFacts`], so the heuristic can be exercised without a
//! DOM.

use regex::Regex;
use tracing::debug;

use crate::dom::{Dom, ElementFacts};
use crate::model::CodeTriple;
use crate::results::{clamp_score, Confidence, RoleMatch, StructureReport};
use crate::similarity::{char_jaccard, split_words};

/// Evidence points per strategy.
const TAG_POINTS: u32 = 2;
const CLASS_POINTS: u32 = 3;
const TEXT_POINTS: u32 = 2;
const ATTRIBUTE_POINTS: u32 = 1;

/// Score at or above which a role counts as found.
pub const FOUND_SCORE: u32 = 4;
/// Score at or above which a role counts as partially matched.
pub const PARTIAL_SCORE: u32 = 2;

const CLASS_WORD_SIMILARITY: f64 = 0.6;

/// One way an element can show evidence of playing a role.
#[derive(Debug, Clone)]
pub enum MatchStrategy {
    /// Element tag is one of these.
    TagMatch(Vec<String>),
    /// A class contains a pattern, or one of its words is similar to one.
    ClassPattern(Vec<String>),
    /// The element's text matches any of these expressions.
    TextPattern(Vec<Regex>),
    /// One point for each of these attributes present.
    AttributePresence(Vec<String>),
}

impl MatchStrategy {
    /// Points this strategy awards to `facts`, with a short reason.
    fn evaluate(&self, facts: &ElementFacts) -> Option<(u32, String)> {
        match self {
            MatchStrategy::TagMatch(tags) => tags
                .iter()
                .any(|t| t == &facts.tag)
                .then(|| (TAG_POINTS, format!("<{}>", facts.tag))),
            MatchStrategy::ClassPattern(patterns) => facts
                .classes
                .iter()
                .find(|class| class_matches(class, patterns))
                .map(|class| (CLASS_POINTS, format!("class '{class}'"))),
            MatchStrategy::TextPattern(regexes) => {
                if facts.text.is_empty() {
                    return None;
                }
                regexes
                    .iter()
                    .any(|re| re.is_match(&facts.text))
                    .then(|| (TEXT_POINTS, "text".to_string()))
            }
            MatchStrategy::AttributePresence(attrs) => {
                let present: Vec<&String> = attrs
                    .iter()
                    .filter(|a| facts.attributes.contains(a))
                    .collect();
                if present.is_empty() {
                    None
                } else {
                    let names: Vec<&str> = present.iter().map(|s| s.as_str()).collect();
                    Some((
                        ATTRIBUTE_POINTS * present.len() as u32,
                        format!("[{}]", names.join(", ")),
                    ))
                }
            }
        }
    }
}

fn class_matches(class: &str, patterns: &[String]) -> bool {
    let lower = class.to_lowercase();
    let words = split_words(class);
    patterns.iter().any(|pattern| {
        lower.contains(pattern.as_str())
            || words
                .iter()
                .any(|w| char_jaccard(w, pattern) >= CLASS_WORD_SIMILARITY)
    })
}

/// A semantic UI role and how to recognise it.
#[derive(Debug, Clone)]
pub struct RoleSpec {
    pub name: String,
    /// Only required roles count toward the structure score.
    pub required: bool,
    pub strategies: Vec<MatchStrategy>,
}

impl RoleSpec {
    pub fn new(name: &str, required: bool) -> Self {
        Self {
            name: name.to_string(),
            required,
            strategies: Vec::new(),
        }
    }

    pub fn tags(mut self, tags: &[&str]) -> Self {
        self.strategies
            .push(MatchStrategy::TagMatch(to_strings(tags)));
        self
    }

    pub fn classes(mut self, patterns: &[&str]) -> Self {
        self.strategies
            .push(MatchStrategy::ClassPattern(to_strings(patterns)));
        self
    }

    pub fn text(mut self, patterns: &[&str]) -> Result<Self, regex::Error> {
        let regexes = patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;
        self.strategies.push(MatchStrategy::TextPattern(regexes));
        Ok(self)
    }

    pub fn attributes(mut self, attrs: &[&str]) -> Self {
        self.strategies
            .push(MatchStrategy::AttributePresence(to_strings(attrs)));
        self
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Score one element against one role.
///
/// Returns the evidence score and the reasons that contributed to it.
pub fn score_element(spec: &RoleSpec, facts: &ElementFacts) -> (u32, Vec<String>) {
    let mut score = 0;
    let mut reasons = Vec::new();
    for strategy in &spec.strategies {
        if let Some((points, reason)) = strategy.evaluate(facts) {
            score += points;
            reasons.push(reason);
        }
    }
    (score, reasons)
}

/// Classify an evidence score.
pub fn classify(score: u32) -> Confidence {
    if score >= FOUND_SCORE {
        Confidence::High
    } else if score >= PARTIAL_SCORE {
        Confidence::Medium
    } else {
        Confidence::Missing
    }
}

/// The set of roles the matcher looks for.
#[derive(Debug, Clone)]
pub struct RoleCatalogue {
    roles: Vec<RoleSpec>,
}

impl RoleCatalogue {
    pub fn new(roles: Vec<RoleSpec>) -> Self {
        Self { roles }
    }

    /// Built-in catalogue for product-card style challenges.
    pub fn builtin() -> Result<Self, regex::Error> {
        Ok(Self::new(vec![
            RoleSpec::new("productImage", true)
                .tags(&["img", "picture", "figure"])
                .classes(&["image", "img", "photo", "thumbnail"])
                .attributes(&["src", "alt"]),
            RoleSpec::new("productTitle", true)
                .tags(&["h1", "h2", "h3", "h4", "h5", "h6"])
                .classes(&["title", "name", "heading", "headline"]),
            RoleSpec::new("productPrice", true)
                .tags(&["span", "strong", "b", "em", "data"])
                .classes(&["price", "cost", "amount"])
                .text(&[r"[$€£¥]\s*\d", r"\d+[.,]\d{2}\b"])?,
            RoleSpec::new("productButton", true)
                .tags(&["button", "a", "input"])
                .classes(&["btn", "button", "cta", "buy", "purchase"])
                .text(&[r"(?i)\b(add to (cart|bag)|buy( now)?|shop now|order|purchase)\b"])?
                .attributes(&["type", "onclick"]),
            RoleSpec::new("productDescription", false)
                .tags(&["p"])
                .classes(&["description", "desc", "details", "summary"])
                .text(&[r"\w+(\s+\w+){5,}"])?,
            RoleSpec::new("productRating", false)
                .tags(&["span", "div"])
                .classes(&["rating", "stars", "review"])
                .text(&[r"[★☆⭐]", r"\b\d(\.\d)?\s*/\s*5\b"])?,
            RoleSpec::new("productCard", false)
                .tags(&["div", "article", "section", "li"])
                .classes(&["card", "product", "item"]),
        ]))
    }

    pub fn roles(&self) -> &[RoleSpec] {
        &self.roles
    }

    /// Best-scoring element per role. Earlier elements win ties.
    pub fn locate(&self, elements: &[ElementFacts]) -> Vec<RoleMatch> {
        self.roles
            .iter()
            .map(|spec| {
                let mut best: Option<(u32, Vec<String>, &ElementFacts)> = None;
                for facts in elements {
                    let (score, reasons) = score_element(spec, facts);
                    if score > best.as_ref().map_or(0, |(s, _, _)| *s) {
                        best = Some((score, reasons, facts));
                    }
                }
                let (score, evidence) = match best {
                    Some((score, reasons, facts)) => {
                        (score, format!("{}: {}", facts.locator(), reasons.join(", ")))
                    }
                    None => (0, String::new()),
                };
                RoleMatch {
                    role: spec.name.clone(),
                    required: spec.required,
                    counted: false,
                    confidence: classify(score),
                    score,
                    evidence,
                }
            })
            .collect()
    }

    /// Compare role coverage of `candidate` against `expected`.
    ///
    /// Required roles the expected solution exhibits form the denominator; if
    /// it exhibits none, every required role does.
    pub fn evaluate(
        &self,
        candidate: &CodeTriple,
        expected: &CodeTriple,
        threshold: u8,
    ) -> StructureReport {
        let expected_matches = self.locate(&Dom::parse(&expected.html).facts());
        let mut matches = self.locate(&Dom::parse(&candidate.html).facts());

        let exhibited: Vec<&str> = expected_matches
            .iter()
            .filter(|m| m.required && m.confidence != Confidence::Missing)
            .map(|m| m.role.as_str())
            .collect();

        for m in &mut matches {
            m.counted = m.required && (exhibited.is_empty() || exhibited.contains(&m.role.as_str()));
        }

        let total_roles = matches.iter().filter(|m| m.counted).count();
        let credit: f64 = matches
            .iter()
            .filter(|m| m.counted)
            .map(|m| m.confidence.credit())
            .sum();
        let score = if total_roles == 0 {
            0
        } else {
            clamp_score(credit / total_roles as f64 * 100.0)
        };

        debug!(score, total_roles, "role matching complete");

        StructureReport {
            score,
            passed: score >= threshold,
            total_roles,
            matches,
        }
    }
}

/// `productTitle` → `product title`.
fn humanize(role: &str) -> String {
    split_words(role).join(" ")
}

/// Feedback lines from the found/partial/missing buckets, closed by an
/// encouragement band on the mean of the structure and visual scores.
pub fn build_feedback(report: &StructureReport, visual_score: u8) -> Vec<String> {
    let mut feedback = Vec::new();

    let found: Vec<String> = report
        .with_confidence(Confidence::High)
        .map(|m| humanize(&m.role))
        .collect();
    let partial: Vec<String> = report
        .with_confidence(Confidence::Medium)
        .map(|m| humanize(&m.role))
        .collect();
    let missing: Vec<String> = report
        .with_confidence(Confidence::Missing)
        .filter(|m| m.counted)
        .map(|m| humanize(&m.role))
        .collect();

    if !found.is_empty() {
        feedback.push(format!("Found: {}.", found.join(", ")));
    }
    if !partial.is_empty() {
        feedback.push(format!(
            "Partially matched: {}. Check the tags and class names used for these.",
            partial.join(", ")
        ));
    }
    if !missing.is_empty() {
        feedback.push(format!("Missing: {}.", missing.join(", ")));
    }

    let mean = (report.score as u32 + visual_score as u32) / 2;
    let band = if mean >= 90 {
        "Excellent work! Your page closely matches the expected design."
    } else if mean >= 75 {
        "Great job! A few details are left to polish."
    } else if mean >= 50 {
        "Good progress. Keep refining the layout and content."
    } else {
        "Keep going! Compare your page with the expected design and try again."
    };
    feedback.push(band.to_string());

    feedback
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalogue() -> RoleCatalogue {
        RoleCatalogue::builtin().unwrap()
    }

    fn spec(name: &str) -> RoleSpec {
        catalogue()
            .roles()
            .iter()
            .find(|r| r.name == name)
            .cloned()
            .unwrap()
    }

    const EXPECTED: &str =
        r#"<h1 class="title">Wireless Headphones</h1><span class="price">$99.99</span>"#;

    #[test]
    fn score_element_accumulates_evidence() {
        let price = ElementFacts::new("span")
            .with_classes(&["price"])
            .with_text("$99.99");
        let (score, reasons) = score_element(&spec("productPrice"), &price);
        assert_eq!(score, TAG_POINTS + CLASS_POINTS + TEXT_POINTS);
        assert_eq!(reasons, vec!["<span>", "class 'price'", "text"]);
    }

    #[test]
    fn class_pattern_fuzzy_word_match() {
        // "tittle" shares the char set of "title"
        let facts = ElementFacts::new("div").with_classes(&["card-tittle"]);
        let (score, _) = score_element(&spec("productTitle"), &facts);
        assert_eq!(score, CLASS_POINTS);

        let facts = ElementFacts::new("div").with_classes(&["unrelated"]);
        let (score, _) = score_element(&spec("productTitle"), &facts);
        assert_eq!(score, 0);
    }

    #[test]
    fn attributes_add_one_point_each() {
        let img = ElementFacts::new("img").with_attributes(&["src", "alt", "width"]);
        let (score, _) = score_element(&spec("productImage"), &img);
        assert_eq!(score, TAG_POINTS + 2 * ATTRIBUTE_POINTS);
    }

    #[test]
    fn classification_bands() {
        assert_eq!(classify(0), Confidence::Missing);
        assert_eq!(classify(1), Confidence::Missing);
        assert_eq!(classify(2), Confidence::Medium);
        assert_eq!(classify(3), Confidence::Medium);
        assert_eq!(classify(4), Confidence::High);
        assert_eq!(classify(9), Confidence::High);
    }

    #[test]
    fn locate_keeps_best_element() {
        let elements = vec![
            ElementFacts::new("p").with_text("Only $5.00 today"),
            ElementFacts::new("span")
                .with_classes(&["price"])
                .with_text("$5.00"),
        ];
        let matches = catalogue().locate(&elements);
        let price = matches.iter().find(|m| m.role == "productPrice").unwrap();
        assert_eq!(price.confidence, Confidence::High);
        assert!(price.evidence.starts_with("span.price"), "{}", price.evidence);
    }

    #[test]
    fn verbatim_candidate_finds_title_and_price() {
        let expected = CodeTriple::html(EXPECTED);
        let report = catalogue().evaluate(&expected, &expected, 70);

        let title = report.role("productTitle").unwrap();
        assert_eq!(title.confidence, Confidence::High);
        assert!(title.score >= FOUND_SCORE);
        let price = report.role("productPrice").unwrap();
        assert_eq!(price.confidence, Confidence::High);
        assert!(price.score >= FOUND_SCORE);

        assert_eq!(report.total_roles, 2);
        assert_eq!(report.score, 100);
        assert!(report.passed);
    }

    #[test]
    fn missing_price_lowers_structure_score() {
        let expected = CodeTriple::html(EXPECTED);
        let candidate = CodeTriple::html(r#"<h1 class="title">Wireless Headphones</h1>"#);
        let report = catalogue().evaluate(&candidate, &expected, 70);

        assert_eq!(
            report.role("productPrice").unwrap().confidence,
            Confidence::Missing
        );
        assert_eq!(report.score, 50);
        assert!(!report.passed);
    }

    #[test]
    fn partial_match_earns_half_credit() {
        let expected = CodeTriple::html(EXPECTED);
        // Heading tag with no telling class; price only as bare text in a div
        let candidate =
            CodeTriple::html(r#"<h2>Wireless Headphones</h2><div><i>$99.99</i></div>"#);
        let report = catalogue().evaluate(&candidate, &expected, 70);
        assert_eq!(
            report.role("productTitle").unwrap().confidence,
            Confidence::Medium
        );
        assert_eq!(
            report.role("productPrice").unwrap().confidence,
            Confidence::Medium
        );
        assert_eq!(report.score, 50);
    }

    #[test]
    fn optional_roles_do_not_count() {
        let expected = CodeTriple::html(
            r#"<div class="card"><h1 class="title">X</h1><span class="price">$1.00</span></div>"#,
        );
        let report = catalogue().evaluate(&expected, &expected, 70);
        let card = report.role("productCard").unwrap();
        assert_eq!(card.confidence, Confidence::High);
        assert!(!card.counted);
        assert_eq!(report.total_roles, 2);
    }

    #[test]
    fn expected_without_roles_counts_every_required_role() {
        let expected = CodeTriple::html("<div></div>");
        let report = catalogue().evaluate(&expected, &expected, 70);
        assert_eq!(report.total_roles, 4);
        assert_eq!(report.score, 0);
    }

    #[test]
    fn feedback_buckets_and_bands() {
        let expected = CodeTriple::html(EXPECTED);
        let candidate = CodeTriple::html(r#"<h1 class="title">Wireless Headphones</h1>"#);
        let report = catalogue().evaluate(&candidate, &expected, 70);
        let feedback = build_feedback(&report, 100);
        assert!(feedback.iter().any(|f| f == "Found: product title."));
        assert!(feedback.iter().any(|f| f == "Missing: product price."));
        // mean of 50 and 100
        assert!(feedback.last().unwrap().starts_with("Great job"));

        let feedback = build_feedback(&report, 0);
        assert!(feedback.last().unwrap().starts_with("Keep going"));
    }

    #[test]
    fn invalid_text_pattern_is_an_error() {
        assert!(RoleSpec::new("broken", true).text(&["(unclosed"]).is_err());
    }
}
