//! `POST /feedback` (spec §3 "Feedback Event"): records a click, reference,
//! or expansion signal against a context item.

use axum::{extract::State, Extension, Json};
use serde::Deserialize;
use serde_json::Value;

use crate::{
    error::{Error, Result},
    memory::consolidator::apply_feedback,
    repository::{ApiKeyRecord, UsageField},
    responses::Envelope,
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub thread_id: String,
    pub item_id: String,
    pub kind: String,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

fn usage_field(kind: &str) -> Result<UsageField> {
    match kind {
        "click" => Ok(UsageField::Clicks),
        "reference" => Ok(UsageField::References),
        "expansion" => Ok(UsageField::Expansions),
        other => Err(Error::Validation(format!("unknown feedback kind '{other}'"))),
    }
}

pub async fn feedback(
    State(state): State<AppState>,
    Extension(api_key): Extension<ApiKeyRecord>,
    Json(request): Json<FeedbackRequest>,
) -> Result<Json<Envelope<Value>>> {
    let field = usage_field(&request.kind)?;
    apply_feedback(&state, &api_key.workspace, &request.item_id, field).await?;

    Ok(Json(Envelope::ok(serde_json::json!({
        "thread_id": request.thread_id,
        "item_id": request.item_id,
        "recorded": true,
    }))))
}
