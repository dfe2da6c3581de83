use anyhow::{anyhow, Result};
use std::collections::BTreeSet;

use super::result::Detection;

/// Class names considered by default (COCO labels).
pub const DEFAULT_ALLOWED_CLASSES: &[&str] = &[
    "person",
    "backpack",
    "handbag",
    "laptop",
    "bottle",
    "cup",
    "book",
    "cell phone",
    "suitcase",
];

pub const DEFAULT_PERSON_CLASS: &str = "person";

/// Detector confidence floor applied before assignment.
pub const DEFAULT_MIN_CONFIDENCE: f32 = 0.25;

/// Allow-list of detection classes plus a confidence floor.
///
/// One class is designated the person class; it is counted separately from
/// every other allowed class ("items").
#[derive(Clone, Debug, PartialEq)]
pub struct ClassFilter {
    allowed: BTreeSet<String>,
    person_class: String,
    min_confidence: f32,
}

impl ClassFilter {
    pub fn new<I, S>(allowed: I, person_class: &str, min_confidence: f32) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let allowed: BTreeSet<String> = allowed
            .into_iter()
            .map(Into::into)
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect();
        if allowed.is_empty() {
            return Err(anyhow!("class allow-list must not be empty"));
        }
        if !(0.0..=1.0).contains(&min_confidence) {
            return Err(anyhow!(
                "min confidence must be within 0..=1 (got {})",
                min_confidence
            ));
        }
        let person_class = person_class.trim();
        if person_class.is_empty() {
            return Err(anyhow!("person class must not be empty"));
        }
        Ok(Self {
            allowed,
            person_class: person_class.to_string(),
            min_confidence,
        })
    }

    pub fn person_class(&self) -> &str {
        &self.person_class
    }

    pub fn min_confidence(&self) -> f32 {
        self.min_confidence
    }

    pub fn allowed(&self) -> impl Iterator<Item = &str> {
        self.allowed.iter().map(String::as_str)
    }

    /// Allowed classes other than the person class, sorted.
    pub fn item_classes(&self) -> impl Iterator<Item = &str> {
        let person = self.person_class.as_str();
        self.allowed().filter(move |name| *name != person)
    }

    pub fn is_person(&self, class_name: &str) -> bool {
        class_name == self.person_class
    }

    pub fn accepts(&self, det: &Detection) -> bool {
        self.allowed.contains(&det.class_name) && det.confidence >= self.min_confidence
    }
}

impl Default for ClassFilter {
    fn default() -> Self {
        Self {
            allowed: DEFAULT_ALLOWED_CLASSES
                .iter()
                .map(|name| name.to_string())
                .collect(),
            person_class: DEFAULT_PERSON_CLASS.to_string(),
            min_confidence: DEFAULT_MIN_CONFIDENCE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BBox;

    fn det(class: &str, conf: f32) -> Detection {
        Detection::new(class, conf, BBox::new(0.0, 0.0, 1.0, 1.0))
    }

    #[test]
    fn default_filter_accepts_allow_listed_classes() {
        let filter = ClassFilter::default();
        assert!(filter.accepts(&det("person", 0.9)));
        assert!(filter.accepts(&det("cell phone", 0.25)));
        assert!(!filter.accepts(&det("dog", 0.9)));
        assert!(!filter.accepts(&det("person", 0.1)));
        assert!(!filter.accepts(&det("person", f32::NAN)));
    }

    #[test]
    fn item_classes_exclude_person_and_are_sorted() {
        let filter = ClassFilter::default();
        let items: Vec<&str> = filter.item_classes().collect();
        assert_eq!(
            items,
            vec![
                "backpack",
                "book",
                "bottle",
                "cell phone",
                "cup",
                "handbag",
                "laptop",
                "suitcase"
            ]
        );
    }

    #[test]
    fn new_validates_inputs() {
        assert!(ClassFilter::new(Vec::<String>::new(), "person", 0.5).is_err());
        assert!(ClassFilter::new(["  "], "person", 0.5).is_err());
        assert!(ClassFilter::new(["person"], "person", 1.5).is_err());
        assert!(ClassFilter::new(["person"], "", 0.5).is_err());
        let filter = ClassFilter::new([" person ", "cup"], "person", 0.0).expect("filter");
        assert!(filter.accepts(&det("person", 0.0)));
        assert!(filter.is_person("person"));
        assert_eq!(filter.item_classes().collect::<Vec<_>>(), vec!["cup"]);
    }
}
