//! Administrative endpoints under `/gozzmock/`.
//!
//! These manage the expectation store at runtime. Every failure, including a
//! wrong method, answers 500 with the fixed diagnostic body.

use crate::config::{Expectation, ExpectationRemove, Headers};
use crate::dispatcher::DispatchResult;
use crate::error::{DecodeError, MockError};
use crate::store::ExpectationStore;
use std::collections::BTreeMap;
use tracing::{debug, error, info};

/// Body of the status endpoint.
pub const STATUS_BODY: &str = "gozzmock status is OK";

/// Admin endpoints, resolved from the request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminRoute {
    /// Any method: liveness check
    Status,
    /// POST: add or replace one expectation
    AddExpectation,
    /// POST: remove one expectation by key
    RemoveExpectation,
    /// GET: list expectations in priority order
    GetExpectations,
}

impl AdminRoute {
    /// Resolve a request path (without query) to an admin route.
    pub fn parse(path: &str) -> Option<Self> {
        match path {
            "/gozzmock/status" => Some(AdminRoute::Status),
            "/gozzmock/add_expectation" => Some(AdminRoute::AddExpectation),
            "/gozzmock/remove_expectation" => Some(AdminRoute::RemoveExpectation),
            "/gozzmock/get_expectations" => Some(AdminRoute::GetExpectations),
            _ => None,
        }
    }

    fn allowed_method(self) -> Option<&'static str> {
        match self {
            AdminRoute::Status => None,
            AdminRoute::AddExpectation | AdminRoute::RemoveExpectation => Some("POST"),
            AdminRoute::GetExpectations => Some("GET"),
        }
    }
}

/// Handle an admin request.
pub async fn handle(
    route: AdminRoute,
    method: &str,
    body: &[u8],
    store: &ExpectationStore,
) -> DispatchResult {
    debug!(?route, method, "Admin request");

    if let Some(allowed) = route.allowed_method() {
        if method != allowed {
            error!(?route, method, "Wrong method");
            return DispatchResult::internal_error();
        }
    }

    let result = match route {
        AdminRoute::Status => Ok(text(STATUS_BODY.to_string())),
        AdminRoute::AddExpectation => add(body, store).await,
        AdminRoute::RemoveExpectation => remove(body, store).await,
        AdminRoute::GetExpectations => list(store).await,
    };

    result.unwrap_or_else(|err| {
        error!(?route, error = %err, "Admin request failed");
        DispatchResult::internal_error()
    })
}

async fn add(body: &[u8], store: &ExpectationStore) -> Result<DispatchResult, MockError> {
    let exp = Expectation::from_json(body)?;
    exp.validate()?;

    let key = exp.key.clone();
    store.add(exp).await;
    info!(key = %key, "Expectation added");

    Ok(text(format!("Expectation with key '{key}' was added")))
}

async fn remove(body: &[u8], store: &ExpectationStore) -> Result<DispatchResult, MockError> {
    let request: ExpectationRemove =
        serde_json::from_slice(body).map_err(DecodeError::from)?;

    let existed = store.remove(&request.key).await;
    info!(key = %request.key, existed, "Expectation removed");

    Ok(text(format!(
        "Expectation with key '{}' was removed",
        request.key
    )))
}

async fn list(store: &ExpectationStore) -> Result<DispatchResult, MockError> {
    let listing = render_listing(&store.snapshot_ordered().await)?;
    let headers = Headers::from([("Content-Type".to_string(), "application/json".to_string())]);
    Ok(DispatchResult::new(200, listing).with_headers(headers))
}

/// Render expectations as a JSON object keyed by their position.
pub fn render_listing(ordered: &[Expectation]) -> Result<String, MockError> {
    let keyed: BTreeMap<String, &Expectation> = ordered
        .iter()
        .enumerate()
        .map(|(i, exp)| (i.to_string(), exp))
        .collect();
    let listing = serde_json::to_string(&keyed).map_err(DecodeError::from)?;
    Ok(listing)
}

fn text(body: String) -> DispatchResult {
    let headers = Headers::from([(
        "Content-Type".to_string(),
        "text/plain; charset=utf-8".to_string(),
    )]);
    DispatchResult::new(200, body).with_headers(headers)
}
