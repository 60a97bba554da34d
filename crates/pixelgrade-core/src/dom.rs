//! Thin DOM view over `scraper` used by the content checker and role matcher.
//!
//! Everything here looks only at the `<body>` subtree; the synthetic
//! `html`/`head`/`body` elements the parser inserts are not reported.

use std::collections::BTreeMap;

use scraper::{ElementRef, Html};

use crate::similarity::normalize_text;

/// Elements whose text content is never visible page copy.
const NON_CONTENT_TAGS: &[&str] = &["script", "style", "noscript", "template"];

/// Flattened description of one element, independent of the DOM tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementFacts {
    /// Lower-case tag name.
    pub tag: String,
    /// Class names in source order.
    pub classes: Vec<String>,
    /// Names of attributes present on the element.
    pub attributes: Vec<String>,
    /// Normalized descendant text.
    pub text: String,
}

impl ElementFacts {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_lowercase(),
            ..Default::default()
        }
    }

    pub fn with_classes(mut self, classes: &[&str]) -> Self {
        self.classes = classes.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_attributes(mut self, attributes: &[&str]) -> Self {
        self.attributes = attributes.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = normalize_text(text);
        self
    }

    /// Short human-readable locator such as `span.price`.
    pub fn locator(&self) -> String {
        if self.classes.is_empty() {
            self.tag.clone()
        } else {
            format!("{}.{}", self.tag, self.classes.join("."))
        }
    }
}

/// An `<img>` reference found in a document.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ImageRef {
    pub src: String,
    pub alt: String,
}

/// A parsed HTML document.
pub struct Dom {
    html: Html,
}

impl Dom {
    /// Parse a document or fragment. Parsing is lenient and never fails.
    pub fn parse(source: &str) -> Self {
        Self {
            html: Html::parse_document(source),
        }
    }

    fn body(&self) -> Option<ElementRef<'_>> {
        self.html
            .root_element()
            .descendants()
            .filter_map(ElementRef::wrap)
            .find(|el| el.value().name() == "body")
    }

    /// All elements below `<body>`, in document order.
    pub fn elements(&self) -> impl Iterator<Item = ElementRef<'_>> {
        self.body()
            .into_iter()
            .flat_map(|body| body.descendants().skip(1).filter_map(ElementRef::wrap))
    }

    /// Trimmed, non-empty visible text nodes in document order.
    pub fn text_nodes(&self) -> Vec<String> {
        let Some(body) = self.body() else {
            return Vec::new();
        };
        body.descendants()
            .filter_map(|node| {
                let text = node.value().as_text()?;
                let parent = node.parent().and_then(ElementRef::wrap)?;
                if NON_CONTENT_TAGS.contains(&parent.value().name()) {
                    return None;
                }
                let trimmed = text.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            })
            .collect()
    }

    /// Number of elements per tag name.
    pub fn tag_counts(&self) -> BTreeMap<String, u32> {
        let mut counts = BTreeMap::new();
        for el in self.elements() {
            *counts.entry(el.value().name().to_string()).or_insert(0) += 1;
        }
        counts
    }

    /// All `<img>` elements as `{src, alt}` pairs.
    pub fn images(&self) -> Vec<ImageRef> {
        self.elements()
            .filter(|el| el.value().name() == "img")
            .map(|el| ImageRef {
                src: el.value().attr("src").unwrap_or_default().to_string(),
                alt: el.value().attr("alt").unwrap_or_default().to_string(),
            })
            .collect()
    }

    /// Distinct class names in first-seen order.
    pub fn class_names(&self) -> Vec<String> {
        let mut seen = Vec::<String>::new();
        for el in self.elements() {
            for class in el.value().classes() {
                if !seen.iter().any(|c| c == class) {
                    seen.push(class.to_string());
                }
            }
        }
        seen
    }

    /// Flattened facts for every element, in document order.
    pub fn facts(&self) -> Vec<ElementFacts> {
        self.elements()
            .filter(|el| !NON_CONTENT_TAGS.contains(&el.value().name()))
            .map(|el| {
                let value = el.value();
                ElementFacts {
                    tag: value.name().to_string(),
                    classes: value.classes().map(str::to_string).collect(),
                    attributes: value.attrs().map(|(name, _)| name.to_string()).collect(),
                    text: normalize_text(&el.text().collect::<Vec<_>>().join(" ")),
                }
            })
            .collect()
    }
}
