pub mod detection;
pub mod eye_landmarks;
pub mod face_detector;
