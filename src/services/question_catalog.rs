use crate::core::errors::EngineResult;
use crate::schemas::assessment::Question;
use crate::services::engine::{map_store_error, GradingEngine};

/// Ordered snapshot of one assessment's questions, taken once per operation.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionSet {
    assessment_id: String,
    questions: Vec<Question>,
}

impl QuestionSet {
    pub fn new(assessment_id: impl Into<String>, mut questions: Vec<Question>) -> Self {
        let assessment_id = assessment_id.into();
        questions.retain(|question| question.assessment_id == assessment_id);
        questions.sort_by(|a, b| a.order_index.cmp(&b.order_index).then_with(|| a.id.cmp(&b.id)));
        Self { assessment_id, questions }
    }

    pub fn assessment_id(&self) -> &str {
        &self.assessment_id
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn get(&self, question_id: &str) -> Option<&Question> {
        self.questions.iter().find(|question| question.id == question_id)
    }

    pub fn contains(&self, question_id: &str) -> bool {
        self.get(question_id).is_some()
    }

    /// Sum of question points; the denominator for every percentage.
    pub fn total_points(&self) -> f64 {
        self.questions.iter().map(|question| question.points).sum()
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

impl GradingEngine {
    /// Ordered questions of an assessment. Unknown assessments are `NotFound`;
    /// an assessment without questions yields an empty set.
    pub async fn questions_for(&self, assessment_id: &str) -> EngineResult<QuestionSet> {
        self.load_assessment(assessment_id).await?;
        let questions = self
            .question_store()
            .list_by_assessment(assessment_id)
            .await
            .map_err(|err| map_store_error(err, "assessment", assessment_id))?;
        Ok(QuestionSet::new(assessment_id, questions))
    }
}
