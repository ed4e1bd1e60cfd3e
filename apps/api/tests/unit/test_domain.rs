use inference_api::domain::detection::{
    Confidence, DetectionError, DetectionOutcome, FailureKind, ImagePayload, Label,
};
use std::time::Duration;

#[test]
fn label_wire_names_are_stable() {
    assert_eq!(Label::DrugUser.as_str(), "drug_user");
    assert_eq!(Label::NotUser.as_str(), "not_user");
    assert_eq!(serde_json::to_string(&Label::NotUser).unwrap(), "\"not_user\"");
}

#[test]
fn confidence_rejects_values_outside_unit_interval() {
    assert!(Confidence::new(0.0).is_ok());
    assert!(Confidence::new(1.0).is_ok());
    assert!(Confidence::new(1.0001).is_err());
    assert!(Confidence::new(-0.1).is_err());
    assert!(Confidence::new(f64::NAN).is_err());
}

#[test]
fn no_face_has_zero_confidence_and_no_label() {
    let outcome = DetectionOutcome::NoFace;
    assert_eq!(outcome.confidence(), Confidence::ZERO);
    assert_eq!(outcome.label(), None);
    assert!(!outcome.is_verdict());
}

#[test]
fn payload_with_unsupported_extension_is_an_input_format_error() {
    let payload = ImagePayload::new(&b"GIF89a........"[..], Some("clip.gif".into()));
    let err = payload.check_declared_format().unwrap_err();
    assert_eq!(err.kind(), FailureKind::InputFormat);
}

#[test]
fn payload_of_text_is_a_decode_error() {
    let payload = ImagePayload::new(&b"just some words"[..], Some("photo.jpeg".into()));
    assert!(payload.check_declared_format().is_ok());
    assert!(matches!(payload.decode(), Err(DetectionError::Decode(_))));
}

#[test]
fn deadline_failure_maps_to_timeout_outcome() {
    let outcome = DetectionOutcome::from(DetectionError::DeadlineExceeded(Duration::from_secs(30)));
    match outcome {
        DetectionOutcome::Failure { kind, message } => {
            assert_eq!(kind, FailureKind::Timeout);
            assert!(message.contains("too long"));
        }
        other => panic!("expected failure, got {:?}", other),
    }
}
