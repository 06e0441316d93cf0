pub mod encryption;
pub mod image_store;
pub mod job_manager;
pub mod normalize;
pub mod preprocess;
pub mod queue;
pub mod vision;
