use time::OffsetDateTime;

use crate::core::errors::{EngineError, EngineResult};
use crate::db::types::SubmissionStatus;
use crate::schemas::assessment::Question;
use crate::schemas::submission::{percentage_of, AnswerRecord, Submission};
use crate::services::answer_evaluator::{self, classify_manual_score, ShortAnswerMatcher};
use crate::services::question_catalog::QuestionSet;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Totals {
    pub obtained_points: f64,
    pub total_points: f64,
    pub percentage: f64,
    pub pending: usize,
}

/// Sums awarded points over the question set; pending and foreign records add nothing.
pub fn totals(questions: &QuestionSet, answers: &[AnswerRecord]) -> Totals {
    let mut obtained_points = 0.0;
    let mut pending = 0;
    for question in questions.questions() {
        match answers.iter().find(|record| record.question_id == question.id) {
            Some(record) if record.is_pending() => pending += 1,
            Some(record) => obtained_points += record.awarded_points.unwrap_or(0.0),
            None => {}
        }
    }
    let total_points = questions.total_points();
    let obtained_points = obtained_points.min(total_points);

    Totals {
        obtained_points,
        total_points,
        percentage: percentage_of(obtained_points, total_points),
        pending,
    }
}

/// Evaluates a SUBMITTED attempt, producing one record per question in question order.
///
/// Submissions already past evaluation are returned unchanged, so calling this twice
/// is harmless.
pub fn evaluate_all(
    questions: &QuestionSet,
    submission: &Submission,
    passing_points: f64,
    matcher: &dyn ShortAnswerMatcher,
    now: OffsetDateTime,
) -> EngineResult<Submission> {
    if submission.assessment_id != questions.assessment_id() {
        return Err(EngineError::Validation(format!(
            "submission {} belongs to assessment {}, not {}",
            submission.id,
            submission.assessment_id,
            questions.assessment_id()
        )));
    }
    match submission.status {
        SubmissionStatus::Submitted => {}
        SubmissionStatus::InProgress => {
            return Err(EngineError::Validation(format!(
                "submission {} must be finalized before evaluation",
                submission.id
            )));
        }
        SubmissionStatus::AutoGradedPendingReview | SubmissionStatus::Graded => {
            return Ok(submission.clone());
        }
    }

    for stray in submission.answers.iter().filter(|record| !questions.contains(&record.question_id)) {
        tracing::warn!(
            submission_id = %submission.id,
            question_id = %stray.question_id,
            "Dropping answer for a question outside the assessment"
        );
    }

    let answers = questions
        .questions()
        .iter()
        .map(|question| evaluate_record(question, submission.answer(&question.id), matcher))
        .collect();

    let mut evaluated = submission.clone();
    evaluated.answers = answers;
    aggregate(&mut evaluated, questions, passing_points, now);
    Ok(evaluated)
}

fn evaluate_record(
    question: &Question,
    existing: Option<&AnswerRecord>,
    matcher: &dyn ShortAnswerMatcher,
) -> AnswerRecord {
    let value = existing.and_then(|record| record.value.clone());
    let evaluation = answer_evaluator::evaluate(question, value.as_ref(), matcher);
    AnswerRecord {
        value,
        awarded_points: evaluation.awarded_points,
        correctness: Some(evaluation.correctness),
        ..AnswerRecord::unanswered(question.id.clone())
    }
}

/// Recomputes totals and moves the submission to GRADED or AUTO_GRADED_PENDING_REVIEW.
/// `passed` is only decided once nothing is pending.
pub fn aggregate(
    submission: &mut Submission,
    questions: &QuestionSet,
    passing_points: f64,
    now: OffsetDateTime,
) {
    let totals = totals(questions, &submission.answers);
    submission.obtained_points = totals.obtained_points;
    submission.total_points = totals.total_points;
    submission.percentage = totals.percentage;

    if totals.pending > 0 {
        submission.status = SubmissionStatus::AutoGradedPendingReview;
        submission.provisional = true;
        submission.passed = None;
        submission.graded_at = None;
    } else {
        submission.status = SubmissionStatus::Graded;
        submission.provisional = false;
        submission.passed = Some(totals.obtained_points >= passing_points);
        submission.graded_at = Some(now);
    }
}

/// A grader's decision on one pending answer.
#[derive(Debug, Clone, PartialEq)]
pub struct ManualScore<'a> {
    pub points: f64,
    pub feedback: Option<&'a str>,
    pub grader_id: &'a str,
}

/// Applies a manual score to a pending answer and re-aggregates. Scores outside
/// `0..=question.points` are rejected, never clamped.
pub fn apply_manual_score(
    submission: &Submission,
    questions: &QuestionSet,
    question_id: &str,
    score: &ManualScore<'_>,
    passing_points: f64,
    now: OffsetDateTime,
) -> EngineResult<Submission> {
    let question =
        questions.get(question_id).ok_or_else(|| EngineError::not_found("question", question_id))?;

    let not_pending = || EngineError::NotPending { question_id: question_id.to_string() };
    if submission.status != SubmissionStatus::AutoGradedPendingReview {
        return Err(not_pending());
    }
    if !submission.answer(question_id).is_some_and(AnswerRecord::is_pending) {
        return Err(not_pending());
    }
    if !score.points.is_finite() || score.points < 0.0 || score.points > question.points {
        return Err(EngineError::InvalidScore {
            question_id: question_id.to_string(),
            points: score.points,
            max_points: question.points,
        });
    }

    let mut updated = submission.clone();
    let record = updated.answer_mut(question_id).ok_or_else(not_pending)?;
    record.awarded_points = Some(score.points);
    record.correctness = Some(classify_manual_score(score.points, question.points));
    record.feedback = score.feedback.map(str::to_string);
    record.graded_by = Some(score.grader_id.to_string());
    record.graded_at = Some(now);

    aggregate(&mut updated, questions, passing_points, now);
    Ok(updated)
}
