pub mod assessment;
pub mod submission;
pub mod view;
