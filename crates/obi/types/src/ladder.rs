//! The belt ladder: an ordered, immutable sequence of grade labels.
//!
//! The ladder is the single source of truth for legal progression. Both the
//! enrollment default ("next grade up") and the promotion regression guard
//! go through it, so the two can never disagree.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use thiserror::Error;

/// A grade label on the belt ladder (e.g. "Cinturón Verde", "1º Dan").
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GradeLabel(pub String);

impl GradeLabel {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for GradeLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for GradeLabel {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Ordered, duplicate-free sequence of grade labels.
///
/// Index position defines seniority. Lookups are trimmed and
/// case-insensitive; the canonical label stored in the ladder is what gets
/// returned and persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "Vec<GradeLabel>", try_from = "Vec<GradeLabel>")]
pub struct BeltLadder {
    grades: Vec<GradeLabel>,
}

// Deserialization goes through `new` so an empty or duplicated ladder can
// never enter the system from serialized config.
impl TryFrom<Vec<GradeLabel>> for BeltLadder {
    type Error = LadderError;

    fn try_from(grades: Vec<GradeLabel>) -> Result<Self, Self::Error> {
        Self::new(grades)
    }
}

impl From<BeltLadder> for Vec<GradeLabel> {
    fn from(ladder: BeltLadder) -> Self {
        ladder.grades
    }
}

impl BeltLadder {
    /// Build a ladder from an ordered list of labels.
    ///
    /// Rejects empty ladders and duplicate labels (compared trimmed,
    /// case-insensitively).
    pub fn new(grades: Vec<GradeLabel>) -> Result<Self, LadderError> {
        if grades.is_empty() {
            return Err(LadderError::Empty);
        }
        let mut seen = std::collections::HashSet::new();
        for grade in &grades {
            if !seen.insert(normalize(grade.as_str())) {
                return Err(LadderError::DuplicateGrade(grade.as_str().to_string()));
            }
        }
        Ok(Self { grades })
    }

    /// The standard karate ladder: colored belts, then numbered Dan grades.
    pub fn standard() -> Self {
        let colored = [
            "Cinturón Blanco",
            "Cinturón Amarillo",
            "Cinturón Naranja",
            "Cinturón Verde",
            "Cinturón Azul",
            "Cinturón Marrón",
            "Cinturón Negro",
        ];
        let mut grades: Vec<GradeLabel> = colored.iter().map(|g| GradeLabel::from(*g)).collect();
        for dan in 1..=10u8 {
            grades.push(GradeLabel::new(format!("{dan}º Dan")));
        }
        Self { grades }
    }

    /// Ordered view of all grades, most junior first.
    pub fn grades(&self) -> &[GradeLabel] {
        &self.grades
    }

    /// Index of a grade on the ladder (0 = most junior).
    pub fn position(&self, grade: &str) -> Result<usize, LadderError> {
        let wanted = normalize(grade);
        self.grades
            .iter()
            .position(|g| normalize(g.as_str()) == wanted)
            .ok_or_else(|| LadderError::UnknownGrade(grade.trim().to_string()))
    }

    /// The grade immediately above `current`.
    ///
    /// The top grade is a ceiling: asking for the grade above it returns the
    /// top grade itself, unchanged.
    pub fn next_grade(&self, current: &str) -> Result<GradeLabel, LadderError> {
        let index = self.position(current)?;
        let next = self.grades.get(index + 1).unwrap_or(&self.grades[index]);
        Ok(next.clone())
    }

    /// Compare two grades by seniority.
    pub fn compare(&self, a: &str, b: &str) -> Result<Ordering, LadderError> {
        Ok(self.position(a)?.cmp(&self.position(b)?))
    }

    /// The most junior grade; the default for newly registered students.
    pub fn first(&self) -> &GradeLabel {
        &self.grades[0]
    }

    /// The ceiling grade.
    pub fn last(&self) -> &GradeLabel {
        &self.grades[self.grades.len() - 1]
    }
}

impl Default for BeltLadder {
    fn default() -> Self {
        Self::standard()
    }
}

fn normalize(label: &str) -> String {
    label.trim().to_lowercase()
}

/// Belt-ladder errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LadderError {
    #[error("grade '{0}' is not on the belt ladder")]
    UnknownGrade(String),

    #[error("duplicate grade '{0}' in ladder definition")]
    DuplicateGrade(String),

    #[error("a belt ladder must contain at least one grade")]
    Empty,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn next_grade_walks_the_ladder_in_order() {
        let ladder = BeltLadder::standard();
        assert_eq!(
            ladder.next_grade("Cinturón Amarillo").unwrap().as_str(),
            "Cinturón Naranja"
        );
        assert_eq!(
            ladder.next_grade("Cinturón Negro").unwrap().as_str(),
            "1º Dan"
        );
    }

    #[test]
    fn next_grade_lookup_is_trimmed_and_case_insensitive() {
        let ladder = BeltLadder::standard();
        assert_eq!(
            ladder.next_grade("  cinturón verde ").unwrap().as_str(),
            "Cinturón Azul"
        );
    }

    #[test]
    fn next_grade_of_the_top_grade_is_the_top_grade() {
        let ladder = BeltLadder::standard();
        let top = ladder.last().clone();
        assert_eq!(ladder.next_grade(top.as_str()).unwrap(), top);
    }

    #[test]
    fn unknown_grades_are_rejected() {
        let ladder = BeltLadder::standard();
        assert_eq!(
            ladder.next_grade("Cinturón Morado"),
            Err(LadderError::UnknownGrade("Cinturón Morado".to_string()))
        );
    }

    #[test]
    fn duplicate_labels_are_rejected_at_construction() {
        let result = BeltLadder::new(vec![
            GradeLabel::from("Blanco"),
            GradeLabel::from(" blanco "),
        ]);
        assert!(matches!(result, Err(LadderError::DuplicateGrade(_))));
    }

    #[test]
    fn empty_ladders_are_rejected() {
        assert_eq!(BeltLadder::new(vec![]), Err(LadderError::Empty));
    }

    #[test]
    fn deserialization_validates_like_the_constructor() {
        assert!(serde_json::from_str::<BeltLadder>("[]").is_err());
        assert!(serde_json::from_str::<BeltLadder>(r#"["Blanco", " blanco "]"#).is_err());

        let ladder: BeltLadder = serde_json::from_str(r#"["Blanco", "Negro"]"#).unwrap();
        assert_eq!(ladder.first().as_str(), "Blanco");
        assert_eq!(ladder.last().as_str(), "Negro");
        let json = serde_json::to_string(&ladder).unwrap();
        assert_eq!(serde_json::from_str::<BeltLadder>(&json).unwrap(), ladder);
    }

    #[test]
    fn compare_follows_index_order() {
        let ladder = BeltLadder::standard();
        assert_eq!(
            ladder.compare("Cinturón Blanco", "Cinturón Negro").unwrap(),
            Ordering::Less
        );
        assert_eq!(
            ladder.compare("3º Dan", "1º Dan").unwrap(),
            Ordering::Greater
        );
    }

    proptest! {
        #[test]
        fn property_next_grade_is_the_immediate_successor(index in 0usize..16) {
            let ladder = BeltLadder::standard();
            let grades = ladder.grades();
            prop_assume!(index + 1 < grades.len());
            let next = ladder.next_grade(grades[index].as_str()).unwrap();
            prop_assert_eq!(next, grades[index + 1].clone());
        }
    }
}
