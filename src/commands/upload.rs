use axum::extract::{Multipart, Path, State};
use axum::Json;
use uuid::Uuid;

use super::AppState;
use crate::doc_processor::UploadedDocument;
use crate::error::ApiError;
use crate::view::UploadView;

/// `POST /api/sessions/:id/upload` with a single multipart `file` field.
pub async fn upload(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<Json<UploadView>, ApiError> {
    let session = state.session(&id).await?;

    let mut document = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or("document").to_string();
        let bytes = field.bytes().await?;
        document = Some(UploadedDocument {
            filename,
            bytes: bytes.to_vec(),
        });
        break;
    }
    let document = document.ok_or_else(|| ApiError::BadRequest("No file provided.".into()))?;

    // Held across extraction so this session handles one interaction at a time.
    let mut session = session.lock().await;
    let view = state.processor.process(document).await;
    session.record_upload(&view);

    tracing::info!(
        session = %id,
        filename = %view.filename,
        kind = ?view.kind,
        extracted = view.extracted_text.is_some(),
        "Upload handled"
    );

    Ok(Json(view))
}
