pub mod config;
pub mod errors;
pub mod model;
pub mod normalize;
pub mod probe;
pub mod recorder;
pub mod report;
pub mod scheduler;
pub mod storage;
