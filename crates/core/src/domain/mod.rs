pub mod actor;
pub mod bid;
pub mod job;
pub mod tender;
