pub mod blink_detector;
pub mod liveness_engine;
pub mod liveness_verdict;
pub mod spoof_scorer;
