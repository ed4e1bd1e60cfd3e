pub mod cascade_face_gate;
pub mod haar_cascade;
pub mod onnx_classifier;
#[cfg(feature = "opencv")]
pub mod opencv_face_gate;
pub mod rect_grouping;
pub mod traits;
