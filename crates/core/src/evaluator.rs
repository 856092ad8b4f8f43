use thiserror::Error;

use crate::model::QuizQuestion;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum EvaluateError {
    #[error("cannot evaluate an empty question set")]
    NoQuestions,

    #[error("expected {expected} answers, got {got}")]
    AnswerCountMismatch { expected: usize, got: usize },
}

//
// ─── PASS THRESHOLD ────────────────────────────────────────────────────────────
//

/// Minimum score for a quiz attempt to count as passed (inclusive).
///
/// This is the single source of truth for the threshold; no other call site
/// may hardcode it.
pub const PASS_THRESHOLD: u8 = 80;

//
// ─── OUTCOME ───────────────────────────────────────────────────────────────────
//

/// Result of scoring one quiz attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuizOutcome {
    pub score: u8,
    pub passed: bool,
    pub correct: usize,
    pub total: usize,
}

//
// ─── EVALUATOR ─────────────────────────────────────────────────────────────────
//

/// Scores a set of answered questions against the pass threshold.
///
/// `answers[i]` is the selected option index for `questions[i]`; `None` is
/// the "no selection" sentinel and counts as incorrect, as does any
/// out-of-range selection. Pure function, no side effects.
///
/// Score is `round(100 * correct / total)` with half-up rounding.
///
/// # Errors
///
/// Returns `EvaluateError::NoQuestions` for an empty question set and
/// `EvaluateError::AnswerCountMismatch` when the answer list length differs
/// from the question list length.
pub fn evaluate(
    questions: &[QuizQuestion],
    answers: &[Option<usize>],
) -> Result<QuizOutcome, EvaluateError> {
    if questions.is_empty() {
        return Err(EvaluateError::NoQuestions);
    }
    if answers.len() != questions.len() {
        return Err(EvaluateError::AnswerCountMismatch {
            expected: questions.len(),
            got: answers.len(),
        });
    }

    let correct = questions
        .iter()
        .zip(answers)
        .filter(|(question, answer)| question.is_correct(**answer))
        .count();
    let total = questions.len();

    // integer round-half-up of 100 * correct / total
    let score = ((200 * correct + total) / (2 * total)) as u8;

    Ok(QuizOutcome {
        score,
        passed: score >= PASS_THRESHOLD,
        correct,
        total,
    })
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    fn question(correct: usize) -> QuizQuestion {
        QuizQuestion::new("Q", vec!["a".into(), "b".into(), "c".into()], correct).unwrap()
    }

    #[test]
    fn all_correct_scores_100() {
        let questions = vec![question(1), question(0)];
        let outcome = evaluate(&questions, &[Some(1), Some(0)]).unwrap();
        assert_eq!(outcome.score, 100);
        assert!(outcome.passed);
        assert_eq!(outcome.correct, 2);
    }

    #[test]
    fn half_correct_scores_50_and_fails() {
        let questions = vec![question(1), question(0)];
        let outcome = evaluate(&questions, &[Some(0), Some(0)]).unwrap();
        assert_eq!(outcome.score, 50);
        assert!(!outcome.passed);
    }

    #[test]
    fn no_selection_counts_as_incorrect() {
        let questions = vec![question(0), question(0)];
        let outcome = evaluate(&questions, &[Some(0), None]).unwrap();
        assert_eq!(outcome.score, 50);
        assert_eq!(outcome.correct, 1);
    }

    #[test]
    fn out_of_range_selection_counts_as_incorrect() {
        let questions = vec![question(0)];
        let outcome = evaluate(&questions, &[Some(9)]).unwrap();
        assert_eq!(outcome.score, 0);
        assert!(!outcome.passed);
    }

    #[test]
    fn threshold_is_inclusive() {
        // 4 of 5 correct = 80 exactly
        let questions = vec![
            question(0),
            question(0),
            question(0),
            question(0),
            question(0),
        ];
        let outcome =
            evaluate(&questions, &[Some(0), Some(0), Some(0), Some(0), Some(1)]).unwrap();
        assert_eq!(outcome.score, 80);
        assert!(outcome.passed);
    }

    #[test]
    fn score_rounds_half_up() {
        // 1 of 8 correct = 12.5 -> 13
        let questions: Vec<_> = (0..8).map(|_| question(0)).collect();
        let mut answers = vec![Some(1); 8];
        answers[0] = Some(0);
        let outcome = evaluate(&questions, &answers).unwrap();
        assert_eq!(outcome.score, 13);

        // 2 of 3 correct = 66.67 -> 67
        let questions = vec![question(0), question(0), question(0)];
        let outcome = evaluate(&questions, &[Some(0), Some(0), None]).unwrap();
        assert_eq!(outcome.score, 67);
    }

    #[test]
    fn empty_question_set_is_invalid() {
        let err = evaluate(&[], &[]).unwrap_err();
        assert_eq!(err, EvaluateError::NoQuestions);
    }

    #[test]
    fn answer_count_mismatch_is_invalid() {
        let questions = vec![question(0)];
        let err = evaluate(&questions, &[Some(0), Some(1)]).unwrap_err();
        assert_eq!(
            err,
            EvaluateError::AnswerCountMismatch {
                expected: 1,
                got: 2
            }
        );
    }

    #[test]
    fn evaluation_is_deterministic() {
        let questions = vec![question(2), question(1)];
        let answers = [Some(2), Some(0)];
        let first = evaluate(&questions, &answers).unwrap();
        let second = evaluate(&questions, &answers).unwrap();
        assert_eq!(first, second);
    }
}
