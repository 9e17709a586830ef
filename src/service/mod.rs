pub mod classifier;
pub mod control;
pub mod guidance;
pub mod monitor;
pub mod pipeline;
pub mod processor;
pub mod scheduler;
pub mod synthetic;

pub use pipeline::AlertPipeline;
