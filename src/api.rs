pub mod admin;
pub mod learner;

mod helper;
