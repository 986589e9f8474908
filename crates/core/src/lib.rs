pub mod attendance;
pub mod detection;
pub mod liveness;
pub mod notification;
pub mod pipeline;
pub mod recognition;
pub mod shared;
pub mod tracking;
pub mod video;
