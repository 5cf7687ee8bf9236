//! Case classification endpoints.
//!
//! Prediction is CPU-bound and synchronous, so each case runs on the
//! blocking pool. Bulk cases are processed in order and fail independently.

use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use serde_json::Value;

use crate::api::error::ApiError;
use crate::api::types::{request_content, ApiContext, BulkItem, CaseContent};
use crate::pipeline::{build_record, NlpRecord};

/// `POST /process_text` — `{ "content": { "case", "dates", "footer"? } }`.
pub async fn process_text(
    State(ctx): State<ApiContext>,
    body: Bytes,
) -> Result<Json<NlpRecord>, ApiError> {
    let content = CaseContent::from_value(request_content(&body)?)?;
    let record = run_case(&ctx, content).await?;
    Ok(Json(record))
}

/// `POST /process_bulk` — `{ "content": [ {...}, ... ] }`. Each element of
/// the response is a record or the error body for that case.
pub async fn process_bulk(
    State(ctx): State<ApiContext>,
    body: Bytes,
) -> Result<Json<Vec<BulkItem>>, ApiError> {
    let Value::Array(items) = request_content(&body)? else {
        return Err(ApiError::BadRequest(
            "Content in input must be a list of objects".into(),
        ));
    };

    tracing::info!(cases = items.len(), "Bulk prediction request");

    let mut results = Vec::with_capacity(items.len());
    for item in items {
        let outcome = match CaseContent::from_value(item) {
            Ok(content) => run_case(&ctx, content).await,
            Err(e) => Err(e),
        };
        results.push(BulkItem::from(outcome));
    }
    Ok(Json(results))
}

async fn run_case(ctx: &ApiContext, content: CaseContent) -> Result<NlpRecord, ApiError> {
    let pipeline = ctx.pipeline.clone();
    tokio::task::spawn_blocking(move || -> Result<NlpRecord, ApiError> {
        let result = pipeline.predict(&content.case, &content.dates)?;
        Ok(build_record(
            pipeline.name(),
            &content.case,
            &result,
            &content.footer,
        ))
    })
    .await
    .map_err(|e| ApiError::Internal(format!("prediction task failed: {e}")))?
}
