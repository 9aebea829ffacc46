//! Ledger node HTTP API: what requesters use to create requests and read
//! responses. The relay itself never goes through here.

use crate::error::AppError;
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use oracle_ledger::{AccountId, Receipt, Request, RequestId};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReq {
    pub requester: String,
    pub method: String,
    pub api_endpoint: String,
    #[serde(default)]
    pub parameters: String,
}

#[derive(Debug, Deserialize)]
pub struct FulfillReq {
    pub origin: String,
    pub response: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadOnlyReq {
    pub requester: String,
    pub configuration_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Created {
    pub request_id: RequestId,
    pub sequence: u64,
    pub tx_hash: String,
}

impl Created {
    fn new(request_id: RequestId, receipt: Receipt) -> Self {
        Self {
            request_id,
            sequence: receipt.sequence,
            tx_hash: receipt.tx_hash,
        }
    }
}

/// Public view of a request: `response` only appears once fulfilled.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestView {
    pub request_id: RequestId,
    pub requester: AccountId,
    pub method: String,
    pub api_endpoint: String,
    pub parameters: String,
    pub fulfilled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
}

impl From<Request> for RequestView {
    fn from(r: Request) -> Self {
        let response = r.response().map(str::to_string);
        Self {
            request_id: r.request_id,
            requester: r.requester,
            method: r.method,
            api_endpoint: r.api_endpoint,
            parameters: r.parameters,
            fulfilled: r.fulfilled,
            response,
        }
    }
}

fn account(raw: &str, field: &str) -> Result<AccountId, AppError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(AppError::bad_request(format!("{field} must not be empty")));
    }
    Ok(AccountId::new(raw))
}

pub async fn create_request(
    State(state): State<AppState>,
    Json(req): Json<CreateReq>,
) -> Result<impl IntoResponse, AppError> {
    let requester = account(&req.requester, "requester")?;
    let (id, receipt) = state
        .ledger
        .create_request(&requester, &req.method, &req.api_endpoint, &req.parameters)
        .await?;
    Ok((StatusCode::CREATED, Json(Created::new(id, receipt))))
}

pub async fn get_request(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<RequestView>, AppError> {
    let id = RequestId(id);
    state
        .ledger
        .request(id)
        .await
        .map(|r| Json(r.into()))
        .ok_or_else(|| AppError::not_found(&format!("request {id}")))
}

pub async fn get_response(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<impl IntoResponse, AppError> {
    let id = RequestId(id);
    let response = state.ledger.get_response(id).await?;
    Ok(Json(json!({ "requestId": id, "response": response })))
}

pub async fn fulfill_request(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(req): Json<FulfillReq>,
) -> Result<impl IntoResponse, AppError> {
    let origin = account(&req.origin, "origin")?;
    let receipt = state
        .ledger
        .fulfill_request(&origin, RequestId(id), &req.response)
        .await?;
    Ok(Json(json!({ "sequence": receipt.sequence, "txHash": receipt.tx_hash })))
}

pub async fn start_read_only_mode(
    State(state): State<AppState>,
    Json(req): Json<ReadOnlyReq>,
) -> Result<impl IntoResponse, AppError> {
    let requester = account(&req.requester, "requester")?;
    let configuration_id = configuration_id(&req.configuration_id)?;
    let (id, receipt) = state
        .ledger
        .trigger_start_read_only_mode(&requester, configuration_id)
        .await?;
    Ok((StatusCode::CREATED, Json(Created::new(id, receipt))))
}

pub async fn exit_read_only_mode(
    State(state): State<AppState>,
    Json(req): Json<ReadOnlyReq>,
) -> Result<impl IntoResponse, AppError> {
    let requester = account(&req.requester, "requester")?;
    let configuration_id = configuration_id(&req.configuration_id)?;
    let (id, receipt) = state
        .ledger
        .trigger_exit_read_only_mode(&requester, configuration_id)
        .await?;
    Ok((StatusCode::CREATED, Json(Created::new(id, receipt))))
}

fn configuration_id(raw: &str) -> Result<&str, AppError> {
    let raw = raw.trim();
    if raw.is_empty() || raw.contains('/') {
        return Err(AppError::bad_request(
            "configurationId must be non-empty and contain no '/'",
        ));
    }
    Ok(raw)
}

pub async fn tip(State(state): State<AppState>) -> impl IntoResponse {
    let (sequence, tx_hash) = state.ledger.tip().await;
    Json(json!({ "sequence": sequence, "txHash": tx_hash }))
}
