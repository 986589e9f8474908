pub mod min_size_detector;
pub mod replay_detector;
