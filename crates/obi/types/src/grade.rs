//! The fixed ordinal letter-grade set used to score exam components.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A letter grade from the fixed ordinal set.
///
/// The set is closed: {A+, A, A-, B+, B, B-, C+, C, C-, D, E, F}. Anything
/// outside it is rejected at parse time with [`GradeParseError`]. Variants
/// are declared best-first so the derived `Ord` matches seniority.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LetterGrade {
    #[serde(rename = "A+")]
    APlus,
    #[serde(rename = "A")]
    A,
    #[serde(rename = "A-")]
    AMinus,
    #[serde(rename = "B+")]
    BPlus,
    #[serde(rename = "B")]
    B,
    #[serde(rename = "B-")]
    BMinus,
    #[serde(rename = "C+")]
    CPlus,
    #[serde(rename = "C")]
    C,
    #[serde(rename = "C-")]
    CMinus,
    #[serde(rename = "D")]
    D,
    #[serde(rename = "E")]
    E,
    #[serde(rename = "F")]
    F,
}

impl LetterGrade {
    /// All grades, best-first.
    pub const ALL: [LetterGrade; 12] = [
        LetterGrade::APlus,
        LetterGrade::A,
        LetterGrade::AMinus,
        LetterGrade::BPlus,
        LetterGrade::B,
        LetterGrade::BMinus,
        LetterGrade::CPlus,
        LetterGrade::C,
        LetterGrade::CMinus,
        LetterGrade::D,
        LetterGrade::E,
        LetterGrade::F,
    ];

    /// True for C- or better. D, E and F are failing grades.
    pub fn is_passing(self) -> bool {
        self <= LetterGrade::CMinus
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LetterGrade::APlus => "A+",
            LetterGrade::A => "A",
            LetterGrade::AMinus => "A-",
            LetterGrade::BPlus => "B+",
            LetterGrade::B => "B",
            LetterGrade::BMinus => "B-",
            LetterGrade::CPlus => "C+",
            LetterGrade::C => "C",
            LetterGrade::CMinus => "C-",
            LetterGrade::D => "D",
            LetterGrade::E => "E",
            LetterGrade::F => "F",
        }
    }
}

impl std::fmt::Display for LetterGrade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for LetterGrade {
    type Err = GradeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|grade| grade.as_str() == normalized)
            .ok_or_else(|| GradeParseError::OutsideSet(s.trim().to_string()))
    }
}

/// Error returned when a value is outside the fixed ordinal grade set.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GradeParseError {
    #[error("grade '{0}' is outside the fixed set A+..F")]
    OutsideSet(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn passing_boundary_is_c_minus() {
        for grade in LetterGrade::ALL {
            let expected = !matches!(grade, LetterGrade::D | LetterGrade::E | LetterGrade::F);
            assert_eq!(grade.is_passing(), expected, "grade {grade}");
        }
    }

    #[test]
    fn parse_accepts_exact_set_case_insensitively() {
        assert_eq!(LetterGrade::from_str(" a+ "), Ok(LetterGrade::APlus));
        assert_eq!(LetterGrade::from_str("b-"), Ok(LetterGrade::BMinus));
        assert_eq!(LetterGrade::from_str("F"), Ok(LetterGrade::F));
    }

    #[test]
    fn parse_rejects_values_outside_the_set() {
        for bad in ["G", "A++", "", "10", "aprobado"] {
            assert!(LetterGrade::from_str(bad).is_err(), "{bad:?} should fail");
        }
    }

    #[test]
    fn display_round_trips_through_from_str() {
        for grade in LetterGrade::ALL {
            assert_eq!(LetterGrade::from_str(grade.as_str()), Ok(grade));
        }
    }

    #[test]
    fn ordering_matches_seniority() {
        assert!(LetterGrade::APlus < LetterGrade::A);
        assert!(LetterGrade::CMinus < LetterGrade::D);
    }

    #[test]
    fn serde_uses_the_display_symbols() {
        let json = serde_json::to_string(&LetterGrade::AMinus).unwrap();
        assert_eq!(json, "\"A-\"");
        let back: LetterGrade = serde_json::from_str("\"C+\"").unwrap();
        assert_eq!(back, LetterGrade::CPlus);
    }
}
