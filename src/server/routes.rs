//! HTTP route handlers.
//!
//! Request and response bodies use the camelCase field names the web
//! front end expects. State is shared via `Arc<ServerState>`.

use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

use crate::engine::{StopReason, TradingService};
use crate::notify::telegram::{TelegramNotifier, TelegramUpdate};
use crate::types::{Asset, Balances, DeployParams, EngineError};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct ServerState {
    pub service: Arc<TradingService>,
    pub telegram: Arc<TelegramNotifier>,
}

impl ServerState {
    pub fn new(service: Arc<TradingService>, telegram: Arc<TelegramNotifier>) -> Self {
        Self { service, telegram }
    }
}

pub type AppState = Arc<ServerState>;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Engine error rendered as `{success: false, error}`.
#[derive(Debug)]
pub struct ApiError(pub EngineError);

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            EngineError::Validation(_) | EngineError::InsufficientBalance { .. } => {
                StatusCode::BAD_REQUEST
            }
            EngineError::Execution(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(json!({ "success": false, "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

/// JSON body extractor whose failures render as `ApiError` (400).
///
/// The content type is not checked and an empty body reads as the
/// request type's default, so a bare POST reaches the handler's own
/// validation.
#[derive(Debug)]
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned + Default,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state).await.map_err(|e| {
            ApiError(EngineError::Validation(format!("Invalid request body: {e}")))
        })?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self(T::default()));
        }
        serde_json::from_slice(&bytes).map(Self).map_err(|e| {
            ApiError(EngineError::Validation(format!("Invalid request body: {e}")))
        })
    }
}

fn missing_credentials() -> ApiError {
    ApiError(EngineError::Validation(
        "Missing required parameters: uid and password".to_string(),
    ))
}

/// Accept a JSON number or a numeric string.
fn parse_amount(field: &str, value: &Value) -> Result<f64, EngineError> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(v) if v.is_finite() && v >= 0.0 => Ok(v),
        _ => Err(EngineError::Validation(format!(
            "Invalid {field}: must be a non-negative number"
        ))),
    }
}

fn parse_optional_amount(field: &str, value: &Option<Value>) -> Result<Option<f64>, EngineError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(v) => parse_amount(field, v).map(Some),
    }
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RootResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub balances: Balances,
    pub current_price: f64,
    pub last_price_update: String,
    pub agent_status: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SetSwapRequest {
    #[serde(default, alias = "assetA")]
    pub sui: Option<Value>,
    #[serde(default, alias = "assetB")]
    pub usdc: Option<Value>,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BalancesResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
    pub balances: Balances,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PairResponse {
    pub success: bool,
    pub sui: f64,
    pub usdc: f64,
    pub current_price: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapRequest {
    #[serde(default)]
    pub from_coin: Option<String>,
    #[serde(default)]
    pub to_coin: Option<String>,
    #[serde(default)]
    pub amount: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapResponse {
    pub success: bool,
    pub tx_hash: String,
    pub amount_in: String,
    pub amount_out: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct AgentRequest {
    #[serde(default)]
    pub uid: Option<Value>,
    #[serde(default)]
    pub password: Option<Value>,
    #[serde(default)]
    pub profit: Option<Value>,
    #[serde(default)]
    pub loss: Option<Value>,
    #[serde(default)]
    pub risk: Option<Value>,
}

impl AgentRequest {
    /// uid and password are required but never checked against anything.
    /// Any non-empty value counts, whatever its JSON type.
    fn has_credentials(&self) -> bool {
        let present = |v: &Option<Value>| match v {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
            Some(Value::String(s)) => !s.is_empty(),
            Some(Value::Array(_) | Value::Object(_)) => true,
        };
        present(&self.uid) && present(&self.password)
    }
}

#[derive(Debug, Serialize)]
pub struct AgentResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelegramStatusResponse {
    pub success: bool,
    pub enabled: bool,
    pub log_level: crate::notify::telegram::LogLevel,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /
pub async fn root(State(state): State<AppState>) -> Json<RootResponse> {
    let snapshot = state.service.oracle().snapshot().await;
    Json(RootResponse {
        status: "ok",
        message: "DeFAI trading agent server is running",
        balances: state.service.balances().await,
        current_price: snapshot.price,
        last_price_update: snapshot.last_updated.to_rfc3339(),
        agent_status: state.service.status().await.to_string(),
    })
}

/// POST /set_swap
pub async fn set_swap(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<SetSwapRequest>,
) -> Result<Json<BalancesResponse>, ApiError> {
    let sui = parse_optional_amount("SUI balance", &req.sui)?;
    let usdc = parse_optional_amount("USDC balance", &req.usdc)?;
    let balances = state.service.set_balances(sui, usdc).await?;
    info!(address = ?req.address, %balances, "Balances set via API");
    Ok(Json(BalancesResponse {
        success: true,
        message: Some("Balances updated successfully"),
        balances,
    }))
}

/// POST /check-balances
pub async fn check_balances(State(state): State<AppState>) -> Json<BalancesResponse> {
    Json(BalancesResponse {
        success: true,
        message: None,
        balances: state.service.balances().await,
    })
}

/// POST /fetch_pair and /api/wallet/fetch_pair
///
/// Answers with the cached price; a stale price triggers a background
/// refresh that this response does not wait for.
pub async fn fetch_pair(State(state): State<AppState>) -> Json<PairResponse> {
    let oracle = state.service.oracle();
    if oracle.refresh_if_stale().await {
        info!("Price is stale, refreshing in background");
    }
    let balances = state.service.balances().await;
    Json(PairResponse {
        success: true,
        sui: balances.sui,
        usdc: balances.usdc,
        current_price: oracle.price().await,
    })
}

/// POST /swap
pub async fn swap(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<SwapRequest>,
) -> Result<Json<SwapResponse>, ApiError> {
    let (Some(from), Some(to)) = (req.from_coin.as_deref(), req.to_coin.as_deref()) else {
        return Err(ApiError(EngineError::Validation(
            "Missing required parameters: fromCoin and toCoin".to_string(),
        )));
    };
    let from: Asset = from.parse()?;
    let to: Asset = to.parse()?;
    let amount = parse_optional_amount("amount", &req.amount)?;

    let receipt = state.service.swap(from, to, amount).await.map_err(|e| {
        warn!(error = %e, "Swap rejected");
        e
    })?;

    Ok(Json(SwapResponse {
        success: true,
        tx_hash: receipt.tx_hash,
        amount_in: receipt.amount_in.to_string(),
        amount_out: receipt.amount_out.to_string(),
    }))
}

/// POST /deploy
pub async fn deploy(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<AgentRequest>,
) -> Result<Json<AgentResponse>, ApiError> {
    if !req.has_credentials() {
        return Err(missing_credentials());
    }
    let params = DeployParams {
        profit: req.profit,
        loss: req.loss,
        risk: req.risk,
    };
    state.service.deploy(params).await;
    Ok(Json(AgentResponse {
        status: "success",
        message: Some("Agent deployed successfully"),
        log: None,
    }))
}

/// POST /stop_execution
pub async fn stop_execution(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<AgentRequest>,
) -> Result<Json<AgentResponse>, ApiError> {
    if !req.has_credentials() {
        return Err(missing_credentials());
    }
    state.service.stop(StopReason::UserRequest).await;
    Ok(Json(AgentResponse {
        status: "success",
        message: Some("Agent stopped successfully"),
        log: None,
    }))
}

/// POST /fetch_logs
pub async fn fetch_logs(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<AgentRequest>,
) -> Result<Json<AgentResponse>, ApiError> {
    if !req.has_credentials() {
        return Err(missing_credentials());
    }
    Ok(Json(AgentResponse {
        status: "success",
        message: None,
        log: Some(state.service.logs().await),
    }))
}

/// POST /api/telegram/configure
pub async fn telegram_configure(
    State(state): State<AppState>,
    ApiJson(update): ApiJson<TelegramUpdate>,
) -> Json<Value> {
    let enabled = state.telegram.configure(&update);
    Json(json!({ "success": true, "enabled": enabled }))
}

/// GET /api/telegram/status
pub async fn telegram_status(State(state): State<AppState>) -> Json<TelegramStatusResponse> {
    let status = state.telegram.status();
    Json(TelegramStatusResponse {
        success: true,
        enabled: status.enabled,
        log_level: status.log_level,
    })
}

/// POST /api/telegram/test
pub async fn telegram_test(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    if !state.telegram.is_enabled() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "success": false, "error": "Telegram notifications are not configured" })),
        );
    }

    let text = "🧪 <b>Test Message</b>\n\nTelegram notifications are working.";
    if state.telegram.send_message(text).await {
        (
            StatusCode::OK,
            Json(json!({ "success": true, "message": "Test message sent successfully" })),
        )
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "success": false, "error": "Failed to send test message" })),
        )
    }
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_amount_accepts_numbers_and_strings() {
        assert_eq!(parse_amount("x", &json!(1.5)).unwrap(), 1.5);
        assert_eq!(parse_amount("x", &json!("2.25")).unwrap(), 2.25);
        assert_eq!(parse_amount("x", &json!(0)).unwrap(), 0.0);
    }

    #[test]
    fn test_parse_amount_rejects_garbage() {
        assert!(parse_amount("x", &json!(-1)).is_err());
        assert!(parse_amount("x", &json!("abc")).is_err());
        assert!(parse_amount("x", &json!(true)).is_err());
        assert!(parse_amount("x", &json!("NaN")).is_err());
    }

    #[test]
    fn test_optional_amount_null_is_none() {
        assert_eq!(parse_optional_amount("x", &None).unwrap(), None);
        assert_eq!(parse_optional_amount("x", &Some(Value::Null)).unwrap(), None);
    }

    #[test]
    fn test_set_swap_aliases() {
        let req: SetSwapRequest = serde_json::from_str(r#"{"assetA": 10, "assetB": "5"}"#).unwrap();
        assert_eq!(req.sui, Some(json!(10)));
        assert_eq!(req.usdc, Some(json!("5")));
    }

    #[test]
    fn test_agent_request_credentials() {
        let req: AgentRequest = serde_json::from_str(r#"{"uid":"u","password":"p"}"#).unwrap();
        assert!(req.has_credentials());
        let req: AgentRequest = serde_json::from_str(r#"{"uid":"u","password":""}"#).unwrap();
        assert!(!req.has_credentials());
        let req: AgentRequest = serde_json::from_str(r#"{"uid":123,"password":"p"}"#).unwrap();
        assert!(req.has_credentials());
        let req: AgentRequest = serde_json::from_str(r#"{"uid":0,"password":null}"#).unwrap();
        assert!(!req.has_credentials());
    }

    #[test]
    fn test_api_error_status_codes() {
        let resp = ApiError(EngineError::Validation("bad".into())).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let resp = ApiError(EngineError::Execution("boom".into())).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
