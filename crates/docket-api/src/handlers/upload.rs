//! Dataset upload handler.
//!
//! The staged file is fully written and synced before the announcement is published, and
//! the response is only sent after both. Any rejection after staging removes the file.

use std::sync::Arc;

use axum::{
    extract::{Multipart, State},
    response::IntoResponse,
    Json,
};
use docket_core::constants::UPLOAD_FIELD;
use docket_core::{AppError, FormData, PathMessage, UploadId};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{ErrorResponse, HttpAppError};
use crate::staging::{
    multipart_error, read_text_field, stage_field, StagedFile, MAX_TEXT_FIELD_BYTES,
};
use crate::state::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct UploadResponse {
    pub message: String,
    /// Name of the staged file
    pub file_name: String,
    pub file_size: u64,
    pub file_path: String,
    pub upload_id: UploadId,
}

/// Text fields that may accompany the file.
#[derive(Debug, Default)]
struct UploadFields {
    name: Option<String>,
    form_data: FormData,
    user_name: String,
    user_id: String,
}

impl UploadFields {
    fn set(&mut self, field: &str, value: String) -> Result<(), AppError> {
        match field {
            "name" => {
                let value = value.trim();
                if !value.is_empty() {
                    self.name = Some(value.to_string());
                }
            }
            "formData" => {
                if !value.trim().is_empty() {
                    self.form_data = serde_json::from_str(&value).map_err(|e| {
                        AppError::InvalidInput(format!("formData must be a JSON object: {}", e))
                    })?;
                }
            }
            "userName" => self.user_name = value.trim().to_string(),
            "userId" => {
                let value = value.trim();
                if !value.is_empty() {
                    Uuid::parse_str(value).map_err(|_| {
                        AppError::InvalidInput("userId must be a valid UUID".to_string())
                    })?;
                }
                self.user_id = value.to_string();
            }
            other => tracing::debug!(field = other, "Ignoring unknown multipart field"),
        }
        Ok(())
    }
}

/// Upload a dataset file
#[utoipa::path(
    post,
    path = "/api/v1/extkafka/upload",
    tag = "uploads",
    request_body(content = inline(Object), content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "File staged and announced", body = UploadResponse),
        (status = 400, description = "No file, file too large or invalid field", body = ErrorResponse),
        (status = 500, description = "Staging or broker failure", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, multipart), fields(upload_id = tracing::field::Empty))]
pub async fn upload_dataset(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<impl IntoResponse, HttpAppError> {
    let upload_id = UploadId::new();
    tracing::Span::current().record("upload_id", tracing::field::display(&upload_id));

    let (staged, fields) = receive(&state, multipart, &upload_id).await?;

    let file_path = staged.path.to_string_lossy().into_owned();
    let message = PathMessage {
        name: fields
            .name
            .unwrap_or_else(|| default_name(&staged)),
        uuid: upload_id,
        filepath: file_path.clone(),
        filesize: i64::try_from(staged.size).unwrap_or(i64::MAX),
        form_data: fields.form_data,
        user_name: fields.user_name,
        user_id: fields.user_id,
    };

    if let Err(e) = announce(&state, &message).await {
        staged.discard().await;
        return Err(e.into());
    }

    tracing::info!(
        file_path = %file_path,
        bytes = staged.size,
        topic = %state.config.path_topic,
        "Upload staged and announced"
    );

    Ok(Json(UploadResponse {
        message: "File uploaded successfully".to_string(),
        file_name: staged.file_name,
        file_size: staged.size,
        file_path,
        upload_id,
    }))
}

/// Reads every field, staging the file and collecting the rest. Cleans up the staged file
/// if anything after it is rejected.
async fn receive(
    state: &AppState,
    mut multipart: Multipart,
    upload_id: &UploadId,
) -> Result<(StagedFile, UploadFields), AppError> {
    let mut staged: Option<StagedFile> = None;
    let mut fields = UploadFields::default();

    let result = read_fields(state, &mut multipart, upload_id, &mut staged, &mut fields).await;

    match (result, staged) {
        (Ok(()), Some(staged)) => Ok((staged, fields)),
        (Ok(()), None) => Err(AppError::BadRequest("no file provided".to_string())),
        (Err(e), staged) => {
            if let Some(staged) = staged {
                staged.discard().await;
            }
            Err(e)
        }
    }
}

async fn read_fields(
    state: &AppState,
    multipart: &mut Multipart,
    upload_id: &UploadId,
    staged: &mut Option<StagedFile>,
    fields: &mut UploadFields,
) -> Result<(), AppError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let field_name = field.name().unwrap_or_default().to_string();
        if field_name != UPLOAD_FIELD {
            let value = read_text_field(field, MAX_TEXT_FIELD_BYTES).await?;
            fields.set(&field_name, value)?;
            continue;
        }
        if staged.is_some() {
            return Err(AppError::BadRequest(
                "Multiple file fields are not allowed; send exactly one field named 'uploadFile'"
                    .to_string(),
            ));
        }
        *staged = Some(
            stage_field(
                field,
                &state.config.staging_dir,
                upload_id,
                state.config.max_upload_size_bytes,
            )
            .await?,
        );
    }
    Ok(())
}

async fn announce(state: &AppState, message: &PathMessage) -> Result<(), AppError> {
    let payload = message.to_bytes()?;
    state
        .broker
        .publish(&state.config.path_topic, &message.uuid.message_key(), &payload)
        .await
        .map_err(|e| AppError::Broker(e.to_string()))
}

fn default_name(staged: &StagedFile) -> String {
    if staged.original_name.is_empty() {
        staged.file_name.clone()
    } else {
        staged.original_name.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn form_data_and_user_fields_are_parsed() {
        let mut fields = UploadFields::default();
        fields
            .set("formData", json!({"type": 2, "title": "cats"}).to_string())
            .unwrap();
        fields
            .set("userId", " 5a0c1f7e-9d4b-4b8e-a7c2-1d2e3f4a5b6c ".to_string())
            .unwrap();
        fields.set("name", "  ".to_string()).unwrap();

        assert!(fields.form_data.form_type.is_dataset());
        assert_eq!(fields.user_id, "5a0c1f7e-9d4b-4b8e-a7c2-1d2e3f4a5b6c");
        assert!(fields.name.is_none());
    }

    #[test]
    fn invalid_fields_are_rejected() {
        let mut fields = UploadFields::default();
        assert!(matches!(
            fields.set("userId", "not-a-uuid".to_string()),
            Err(AppError::InvalidInput(_))
        ));
        assert!(matches!(
            fields.set("formData", "[1, 2]".to_string()),
            Err(AppError::InvalidInput(_))
        ));
    }
}
