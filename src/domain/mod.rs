pub mod generation;
pub mod job;
pub mod script;
pub mod speech;
