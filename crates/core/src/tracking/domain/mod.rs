pub mod centroid_tracker;
pub mod track;
