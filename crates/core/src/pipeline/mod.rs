pub mod infrastructure;
pub mod pipeline_executor;
pub mod pipeline_logger;
pub mod recognition_handle;
pub mod recognition_pipeline;
