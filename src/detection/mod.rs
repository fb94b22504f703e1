// src/detection/mod.rs

mod models;

// Re-export public APIs
pub use models::{classify_face, detect_faces, Classifier, Detector};
