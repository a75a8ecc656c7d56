use actix_multipart::Multipart;
use actix_web::{post, web, HttpResponse};
use futures_util::StreamExt;
use std::sync::Arc;
use tracing::info;
use voxrelay_common::TranscribeError;
use voxrelay_stt::StagedUpload;

use crate::state::AppState;
use crate::types::ErrorResponse;

/// Accept a multipart upload (field `file`) and return its transcript
///
/// The file is streamed chunk by chunk into the request workspace; only the
/// first `file` field is used.
#[post("/transcribe")]
pub async fn transcribe(
    mut payload: Multipart,
    state: web::Data<Arc<AppState>>,
) -> actix_web::Result<HttpResponse> {
    let mut staged: Option<StagedUpload> = None;

    while let Some(field) = payload.next().await {
        let mut field = field?;
        let content_disposition = field.content_disposition();

        if content_disposition.get_name() != Some("file") || staged.is_some() {
            continue;
        }

        let filename = content_disposition
            .get_filename()
            .unwrap_or("unknown")
            .to_string();

        let mut upload = match state.pipeline.begin(&filename).await {
            Ok(upload) => upload,
            Err(e) => return Ok(ErrorResponse::respond(&e)),
        };

        while let Some(chunk) = field.next().await {
            let data = match chunk {
                Ok(data) => data,
                Err(e) => {
                    upload.discard().await;
                    return Err(e.into());
                }
            };
            if let Err(e) = upload.write_chunk(&data).await {
                upload.discard().await;
                return Ok(ErrorResponse::respond(&e));
            }
        }

        info!("Received upload {} ({} bytes)", filename, upload.bytes_written());
        staged = Some(upload);
    }

    let Some(upload) = staged else {
        return Ok(ErrorResponse::respond(&TranscribeError::validation(
            "no file uploaded in field 'file'",
        )));
    };

    match state.pipeline.run_staged(upload).await {
        Ok(transcript) => Ok(HttpResponse::Ok().json(transcript)),
        Err(e) => Ok(ErrorResponse::respond(&e)),
    }
}
