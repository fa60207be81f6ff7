pub mod answer_evaluator;
pub mod attempt_tracker;
pub mod engine;
pub mod manual_grading;
pub mod notifications;
pub mod question_catalog;
pub mod result_visibility;
pub mod submission_aggregator;
pub mod submission_finalize;
