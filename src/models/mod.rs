pub mod analysis;
pub mod asset;
pub mod audit;
pub mod job;
pub mod report;
