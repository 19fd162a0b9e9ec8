pub mod admin;
pub mod learner;
