//! Structural content checker.
//!
//! Requirements are mined once from the expected solution and then checked
//! against the candidate. Each requirement yields a `0..=100` score; the
//! overall score is the weight-normalized blend of those scores.

use tracing::debug;

use crate::dom::{Dom, ImageRef};
use crate::model::CodeTriple;
use crate::results::{
    clamp_score, ContentReport, Requirement, RequirementData, RequirementKind, RequirementResult,
    PASS_GATE,
};
use crate::similarity::{normalize_text, similarity};

/// CSS properties worth checking for, matched as substrings.
pub const IMPORTANT_CSS_PROPERTIES: &[&str] = &[
    "border-radius",
    "box-shadow",
    "background",
    "width",
    "height",
    "padding",
    "margin",
    "display",
    "flex",
    "grid",
    "color",
    "font",
];

const MAX_REQUIRED_TEXTS: usize = 5;
pub const MIN_TEXT_LEN: usize = 3;
pub const MAX_TEXT_LEN: usize = 99;
const TEXT_SIMILARITY_CUTOFF: f64 = 0.7;

const TEXT_WEIGHT: u32 = 30;
const STRUCTURE_WEIGHT: u32 = 20;
const IMAGES_WEIGHT: u32 = 15;
const CSS_WEIGHT: u32 = 20;
const CLASSES_WEIGHT: u32 = 15;

impl RequirementKind {
    /// Minimum satisfied ratio for the requirement to pass.
    pub fn pass_ratio(self) -> f64 {
        match self {
            RequirementKind::TextContent => 0.6,
            RequirementKind::HtmlStructure => 0.7,
            RequirementKind::Images => 0.5,
            RequirementKind::CssProperties => 0.5,
            // Class names are the least reliable signal
            RequirementKind::ClassNames => 0.3,
        }
    }
}

/// Mine the scored requirements from an expected solution.
pub fn extract_requirements(expected: &CodeTriple) -> Vec<Requirement> {
    let dom = Dom::parse(&expected.html);
    let mut requirements = Vec::with_capacity(5);

    let texts: Vec<String> = dom
        .text_nodes()
        .iter()
        .map(|t| normalize_text(t))
        .filter(|t| (MIN_TEXT_LEN..=MAX_TEXT_LEN).contains(&t.chars().count()))
        .take(MAX_REQUIRED_TEXTS)
        .collect();
    requirements.push(Requirement {
        kind: RequirementKind::TextContent,
        description: format!("{} key text snippet(s)", texts.len()),
        required: RequirementData::Texts(texts),
        weight: TEXT_WEIGHT,
    });

    let counts = dom.tag_counts();
    requirements.push(Requirement {
        kind: RequirementKind::HtmlStructure,
        description: format!("{} distinct element type(s)", counts.len()),
        required: RequirementData::TagCounts(counts),
        weight: STRUCTURE_WEIGHT,
    });

    let images = dom.images();
    if !images.is_empty() {
        requirements.push(Requirement {
            kind: RequirementKind::Images,
            description: format!("{} image(s)", images.len()),
            required: RequirementData::Images(images),
            weight: IMAGES_WEIGHT,
        });
    }

    let css = expected.css.to_lowercase();
    let properties: Vec<String> = IMPORTANT_CSS_PROPERTIES
        .iter()
        .filter(|p| css.contains(*p))
        .map(|p| p.to_string())
        .collect();
    requirements.push(Requirement {
        kind: RequirementKind::CssProperties,
        description: format!("{} styling propert(ies)", properties.len()),
        required: RequirementData::CssProperties(properties),
        weight: CSS_WEIGHT,
    });

    let classes = dom.class_names();
    requirements.push(Requirement {
        kind: RequirementKind::ClassNames,
        description: format!("{} class name(s)", classes.len()),
        required: RequirementData::ClassNames(classes),
        weight: CLASSES_WEIGHT,
    });

    requirements
}

/// Candidate-side view computed once per check.
struct CandidateView {
    texts: Vec<String>,
    counts: std::collections::BTreeMap<String, u32>,
    images: Vec<ImageRef>,
    css: String,
    classes: Vec<String>,
}

impl CandidateView {
    fn new(candidate: &CodeTriple) -> Self {
        let dom = Dom::parse(&candidate.html);
        Self {
            texts: dom
                .text_nodes()
                .iter()
                .map(|t| normalize_text(t))
                .filter(|t| t.chars().count() >= MIN_TEXT_LEN)
                .collect(),
            counts: dom.tag_counts(),
            images: dom.images(),
            css: candidate.css.to_lowercase(),
            classes: dom.class_names(),
        }
    }
}

/// Check a candidate against previously extracted requirements.
pub fn check_requirements(candidate: &CodeTriple, requirements: &[Requirement]) -> ContentReport {
    let view = CandidateView::new(candidate);

    let results: Vec<RequirementResult> = requirements
        .iter()
        .map(|req| check_one(&view, req))
        .collect();

    let total_weight: u32 = results.iter().map(|r| r.weight).sum();
    let score = if total_weight == 0 {
        0
    } else {
        let weighted: f64 = results
            .iter()
            .map(|r| r.score as f64 / 100.0 * r.weight as f64)
            .sum();
        clamp_score(weighted / total_weight as f64 * 100.0)
    };

    debug!(score, requirements = results.len(), "content check complete");

    ContentReport {
        score,
        passed: score >= PASS_GATE,
        requirements: results,
    }
}

/// Extract requirements from `expected` and check `candidate` against them.
pub fn evaluate_content(candidate: &CodeTriple, expected: &CodeTriple) -> ContentReport {
    let requirements = extract_requirements(expected);
    check_requirements(candidate, &requirements)
}

fn check_one(view: &CandidateView, req: &Requirement) -> RequirementResult {
    let (matched, missing) = match &req.required {
        RequirementData::Texts(texts) => partition(texts, |t| text_found(&view.texts, t)),
        RequirementData::TagCounts(counts) => {
            let (m, x) = partition_iter(counts.iter(), |(tag, need)| {
                view.counts.get(*tag).copied().unwrap_or(0) >= **need
            });
            (
                m.into_iter().map(|(t, n)| format!("<{t}> x{n}")).collect(),
                x.into_iter()
                    .map(|(t, n)| {
                        let have = view.counts.get(t).copied().unwrap_or(0);
                        format!("<{t}> x{n} (found {have})")
                    })
                    .collect(),
            )
        }
        RequirementData::Images(images) => {
            let (m, x) = partition_iter(images.iter(), |img| image_found(&view.images, img));
            (
                m.into_iter().map(describe_image).collect(),
                x.into_iter().map(describe_image).collect(),
            )
        }
        RequirementData::CssProperties(props) => {
            partition(props, |p| view.css.contains(&p.to_lowercase()))
        }
        RequirementData::ClassNames(classes) => {
            partition(classes, |c| view.classes.iter().any(|have| have == c))
        }
    };

    let required = matched.len() + missing.len();
    let ratio = if required == 0 {
        1.0
    } else {
        matched.len() as f64 / required as f64
    };
    let passed = ratio >= req.kind.pass_ratio();
    let details = match req.kind {
        RequirementKind::TextContent => {
            format!("Matched {}/{} required text snippet(s)", matched.len(), required)
        }
        RequirementKind::HtmlStructure => format!(
            "{}/{} element type(s) present in sufficient number",
            matched.len(),
            required
        ),
        RequirementKind::Images => format!("{}/{} image(s) found", matched.len(), required),
        RequirementKind::CssProperties => {
            format!("{}/{} styling propert(ies) used", matched.len(), required)
        }
        RequirementKind::ClassNames => {
            format!("{}/{} class name(s) used", matched.len(), required)
        }
    };

    RequirementResult {
        kind: req.kind,
        passed,
        score: clamp_score(ratio * 100.0),
        weight: req.weight,
        details,
        matched,
        missing,
    }
}

fn partition(items: &[String], found: impl Fn(&String) -> bool) -> (Vec<String>, Vec<String>) {
    let (m, x) = partition_iter(items.iter(), |s| found(*s));
    (
        m.into_iter().cloned().collect(),
        x.into_iter().cloned().collect(),
    )
}

fn partition_iter<T>(items: impl Iterator<Item = T>, found: impl Fn(&T) -> bool) -> (Vec<T>, Vec<T>) {
    items.partition(|item| found(item))
}

/// A required snippet is found when a candidate text node contains it, is
/// contained by it, or is close enough by edit distance.
fn text_found(candidate_texts: &[String], required: &str) -> bool {
    candidate_texts.iter().any(|text| {
        text.contains(required)
            || required.contains(text.as_str())
            || similarity(text, required) > TEXT_SIMILARITY_CUTOFF
    })
}

fn image_found(candidate_images: &[ImageRef], required: &ImageRef) -> bool {
    candidate_images.iter().any(|img| {
        let src_match = !required.src.is_empty()
            && !img.src.is_empty()
            && (img.src.contains(&required.src) || required.src.contains(&img.src));
        let alt_match = !required.alt.is_empty() && img.alt.eq_ignore_ascii_case(&required.alt);
        src_match || alt_match
    })
}

fn describe_image(img: &ImageRef) -> String {
    if img.alt.is_empty() {
        img.src.clone()
    } else {
        format!("{} ({})", img.src, img.alt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPECTED_HTML: &str =
        r#"<h1 class="title">Wireless Headphones</h1><span class="price">$99.99</span>"#;

    fn expected() -> CodeTriple {
        CodeTriple::new(
            EXPECTED_HTML,
            ".title { color: #222; font-size: 2rem; } .price { padding: 4px; }",
            "",
        )
    }

    #[test]
    fn extracts_requirements_from_expected() {
        let reqs = extract_requirements(&expected());
        let kinds: Vec<RequirementKind> = reqs.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![
                RequirementKind::TextContent,
                RequirementKind::HtmlStructure,
                RequirementKind::CssProperties,
                RequirementKind::ClassNames,
            ],
            "no images in the expected solution, so no image requirement"
        );
        assert_eq!(
            reqs[0].required,
            RequirementData::Texts(vec!["wireless headphones".into(), "$99.99".into()])
        );
        match &reqs[2].required {
            RequirementData::CssProperties(props) => {
                assert!(props.contains(&"color".to_string()));
                assert!(props.contains(&"font".to_string()));
                assert!(props.contains(&"padding".to_string()));
                assert!(!props.contains(&"grid".to_string()));
            }
            other => panic!("unexpected data {other:?}"),
        }
    }

    #[test]
    fn text_requirements_are_limited_and_length_filtered() {
        let html = "<p>ab</p><p>one</p><p>two</p><p>three</p><p>four</p><p>five</p><p>six</p>";
        let reqs = extract_requirements(&CodeTriple::html(html));
        assert_eq!(
            reqs[0].required,
            RequirementData::Texts(vec![
                "one".into(),
                "two".into(),
                "three".into(),
                "four".into(),
                "five".into()
            ])
        );
        let long = "x".repeat(100);
        let reqs = extract_requirements(&CodeTriple::html(format!("<p>{long}</p>")));
        assert_eq!(reqs[0].required, RequirementData::Texts(vec![]));
    }

    #[test]
    fn verbatim_candidate_scores_full_marks() {
        let report = evaluate_content(&expected(), &expected());
        assert_eq!(report.score, 100);
        assert!(report.passed);
        let text = report.requirement(RequirementKind::TextContent).unwrap();
        assert_eq!(text.score, 100);
        assert!(text.passed);
        assert_eq!(text.matched, vec!["wireless headphones", "$99.99"]);
    }

    #[test]
    fn no_required_text_reports_zero_matches() {
        let candidate = CodeTriple::html("<div><p>Something unrelated entirely</p></div>");
        let report = evaluate_content(&candidate, &expected());
        let text = report.requirement(RequirementKind::TextContent).unwrap();
        assert_eq!(text.score, 0);
        assert!(!text.passed);
        assert!(text.details.starts_with("Matched 0/2"), "{}", text.details);
    }

    #[test]
    fn fuzzy_text_match() {
        let candidate = CodeTriple::html("<h1>Wireless Headphone</h1><span>$99.98</span>");
        let report = evaluate_content(&candidate, &expected());
        let text = report.requirement(RequirementKind::TextContent).unwrap();
        assert_eq!(text.score, 100);
    }

    #[test]
    fn missing_price_span_fails_structure_and_classes() {
        let candidate = CodeTriple::html(r#"<h1 class="title">Wireless Headphones</h1>"#);
        let report = evaluate_content(&candidate, &expected());

        let structure = report.requirement(RequirementKind::HtmlStructure).unwrap();
        assert!(structure.missing.iter().any(|m| m.starts_with("<span>")));
        assert_eq!(structure.score, 50);
        assert!(!structure.passed);

        let classes = report.requirement(RequirementKind::ClassNames).unwrap();
        assert_eq!(classes.missing, vec!["price"]);
        assert_eq!(classes.score, 50);
        assert!(classes.passed, "class names pass at 30%");
    }

    #[test]
    fn image_matching_by_src_or_alt() {
        let expected = CodeTriple::html(r#"<img src="img/shoe.png" alt="Red Shoe"><img src="a.png" alt="Logo">"#);
        let candidate = CodeTriple::html(
            r#"<img src="https://cdn.example.com/img/shoe.png"><img src="other.png" alt="logo">"#,
        );
        let report = evaluate_content(&candidate, &expected);
        let images = report.requirement(RequirementKind::Images).unwrap();
        assert_eq!(images.score, 100);
        assert!(images.passed);
    }

    fn tag_counts(tags: &[&str]) -> Requirement {
        Requirement {
            kind: RequirementKind::HtmlStructure,
            description: String::new(),
            required: RequirementData::TagCounts(tags.iter().map(|t| (t.to_string(), 1)).collect()),
            weight: STRUCTURE_WEIGHT,
        }
    }

    const TEN_TAGS: [&str; 10] = [
        "article", "button", "div", "h1", "h2", "h3", "nav", "section", "span", "ul",
    ];

    #[test]
    fn structure_passes_at_seven_of_ten_tags() {
        let candidate = CodeTriple::html(
            "<article></article><button></button><div></div><h1></h1><h2></h2><h3></h3><nav></nav>",
        );
        let report = check_requirements(&candidate, &[tag_counts(&TEN_TAGS)]);
        let structure = &report.requirements[0];
        assert_eq!(structure.matched.len(), 7);
        assert_eq!(structure.score, 70);
        assert!(structure.passed);
    }

    #[test]
    fn structure_fails_at_six_of_ten_tags() {
        let candidate = CodeTriple::html(
            "<article></article><button></button><div></div><h1></h1><h2></h2><h3></h3>",
        );
        let report = check_requirements(&candidate, &[tag_counts(&TEN_TAGS)]);
        let structure = &report.requirements[0];
        assert_eq!(structure.matched.len(), 6);
        assert_eq!(structure.score, 60);
        assert!(!structure.passed);
        assert!(structure.missing.contains(&"<nav> x1 (found 0)".to_string()));
    }

    #[test]
    fn images_pass_at_half_matched() {
        let expected = CodeTriple::html(r#"<img src="a.png" alt="Front"><img src="b.png" alt="Back">"#);
        let candidate = CodeTriple::html(r#"<img src="a.png">"#);
        let report = evaluate_content(&candidate, &expected);
        let images = report.requirement(RequirementKind::Images).unwrap();
        assert_eq!(images.score, 50);
        assert!(images.passed);
        assert_eq!(images.missing, vec!["b.png (Back)"]);
    }

    #[test]
    fn css_properties_case_insensitive() {
        let expected = CodeTriple::new("<div></div>", "div { Display: flex; border-radius: 4px }", "");
        let candidate = CodeTriple::new("<div></div>", "DIV { DISPLAY: FLEX; }", "");
        let report = evaluate_content(&candidate, &expected);
        let css = report.requirement(RequirementKind::CssProperties).unwrap();
        // display + flex present, border-radius missing
        assert_eq!(css.missing, vec!["border-radius"]);
        assert_eq!(css.score, 67);
        assert!(css.passed);
    }

    #[test]
    fn empty_requirement_lists_pass() {
        let report = evaluate_content(&CodeTriple::html("<div></div>"), &CodeTriple::html("<div></div>"));
        let text = report.requirement(RequirementKind::TextContent).unwrap();
        assert_eq!(text.score, 100);
        assert!(text.passed);
        assert_eq!(report.score, 100);
    }

    #[test]
    fn overall_is_weight_normalized() {
        let candidate = CodeTriple::html("<section></section>");
        let report = evaluate_content(&candidate, &expected());
        let manual: f64 = report
            .requirements
            .iter()
            .map(|r| r.score as f64 / 100.0 * r.weight as f64)
            .sum::<f64>()
            / report.requirements.iter().map(|r| r.weight as f64).sum::<f64>()
            * 100.0;
        assert_eq!(report.score, clamp_score(manual));
        assert!(!report.passed);
    }

    #[test]
    fn content_check_is_deterministic() {
        let candidate = CodeTriple::html("<h1>Wireless</h1><p>$99</p>");
        let a = evaluate_content(&candidate, &expected());
        let b = evaluate_content(&candidate, &expected());
        assert_eq!(a, b);
    }
}
