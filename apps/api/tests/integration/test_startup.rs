use super::helpers::test_config;
use inference_api::bootstrap::build_state;
use inference_api::infrastructure::ml::cascade_face_gate::FaceGateParams;
use std::path::PathBuf;

#[test]
fn missing_model_checkpoint_aborts_startup() {
    let mut config = test_config();
    config.model_path = PathBuf::from("/definitely/not/here/classifier.onnx");

    let err = build_state(config).err().expect("startup must fail");
    let chain = format!("{:#}", err);
    assert!(chain.contains("Classifier model could not be loaded"));
    assert!(chain.contains("not found"));
}

#[test]
fn invalid_configuration_is_rejected() {
    let err = inference_api::config::Config::from_source(|key| match key {
        "FACE_SCALE_FACTOR" => Some("0.9".to_string()),
        _ => None,
    })
    .unwrap_err();
    assert!(err.to_string().contains("FACE_SCALE_FACTOR"));
}

#[test]
fn missing_face_cascade_is_a_startup_error() {
    let err = inference_api::bootstrap::load_face_gate(
        std::path::Path::new("/definitely/not/here/cascade.xml"),
        FaceGateParams::default(),
    )
    .err()
    .expect("loading must fail");
    assert!(format!("{:#}", err).contains("not found"));
}

#[test]
fn oversized_face_scan_is_rejected() {
    let err = inference_api::config::Config::from_source(|key| match key {
        "FACE_SCAN_MAX_SIDE" => Some("100000".to_string()),
        _ => None,
    })
    .unwrap_err();
    assert!(err.to_string().contains("FACE_SCAN_MAX_SIDE"));
}
