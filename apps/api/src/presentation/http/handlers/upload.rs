use crate::{
    domain::detection::ImagePayload,
    presentation::http::{errors::AppError, responses::UploadResponse, state::AppState},
};
use axum::{
    Json,
    extract::{Multipart, State},
};

/// Multipart form field carrying the image.
pub const FILE_FIELD: &str = "file";

/// `POST /upload`: one image in, one verdict out.
pub async fn upload_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut payload = None;

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let filename = field.file_name().map(str::to_owned);
        let bytes = field.bytes().await?;
        payload = Some(ImagePayload::new(bytes, filename));
        break;
    }

    let payload = payload
        .ok_or_else(|| AppError::BadRequest(format!("Missing '{}' field", FILE_FIELD)))?;

    tracing::info!(
        filename = ?payload.filename(),
        bytes = payload.len(),
        "Received upload"
    );

    let outcome = state.classify.execute(payload).await;
    Ok(Json(UploadResponse::try_from(outcome)?))
}
