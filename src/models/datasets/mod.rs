pub mod actions;
pub mod operations;
pub mod traces;
