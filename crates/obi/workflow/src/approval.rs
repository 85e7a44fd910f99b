//! Approval policy: pure mapping from a final grade to approved/rejected.

use obi_types::LetterGrade;

/// True iff `final_grade` is approving: A+ through C-.
///
/// D, E and F reject. Pure; no I/O. Out-of-set inputs cannot occur here —
/// they are rejected at parse time by [`LetterGrade`]'s `FromStr`.
pub fn is_approved(final_grade: LetterGrade) -> bool {
    final_grade.is_passing()
}

#[cfg(test)]
mod tests {
    use super::*;
    use obi_types::LetterGrade;

    #[test]
    fn approval_set_is_a_plus_through_c_minus() {
        let approving = [
            LetterGrade::APlus,
            LetterGrade::A,
            LetterGrade::AMinus,
            LetterGrade::BPlus,
            LetterGrade::B,
            LetterGrade::BMinus,
            LetterGrade::CPlus,
            LetterGrade::C,
            LetterGrade::CMinus,
        ];
        for grade in approving {
            assert!(is_approved(grade), "{grade} should approve");
        }
        for grade in [LetterGrade::D, LetterGrade::E, LetterGrade::F] {
            assert!(!is_approved(grade), "{grade} should reject");
        }
    }
}
