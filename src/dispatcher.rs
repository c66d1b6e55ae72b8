//! Expectation dispatch.
//!
//! Selects the highest-priority expectation matching a request and runs its
//! action: a canned or templated response, or a forward to another host.

use crate::config::{Expectation, ForwardAction, Headers, RequestFilter, ResponseAction};
use crate::error::EvalError;
use crate::matcher;
use crate::store::ExpectationStore;
use crate::template::TemplateEvaluator;
use crate::transport::{HttpTransport, OutboundRequest};
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Body returned when no expectation matches. Callers depend on this text.
pub const NO_MATCH_BODY: &str = "No expectations in gozzmock for request!";

/// Body returned for decode and transport failures.
pub const ERROR_BODY: &str = "Gozzmock. Something went wrong";

/// A response produced by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchResult {
    pub status: u16,
    pub headers: Headers,
    pub body: Bytes,
}

impl DispatchResult {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: body.into(),
        }
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    /// 501 with the fixed no-match body.
    pub fn no_match() -> Self {
        Self::new(501, NO_MATCH_BODY)
    }

    /// 500 with the fixed diagnostic body.
    pub fn internal_error() -> Self {
        Self::new(500, ERROR_BODY)
    }

    /// Body as text, for logging and tests.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Result of dispatching one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// An expectation matched and its action ran.
    Matched { key: String, result: DispatchResult },
    /// Nothing matched.
    NoMatch,
}

impl Outcome {
    /// Key of the expectation that handled the request, if any.
    pub fn matched_key(&self) -> Option<&str> {
        match self {
            Outcome::Matched { key, .. } => Some(key),
            Outcome::NoMatch => None,
        }
    }

    /// The response to send back.
    pub fn into_result(self) -> DispatchResult {
        match self {
            Outcome::Matched { result, .. } => result,
            Outcome::NoMatch => DispatchResult::no_match(),
        }
    }
}

/// Routes requests through the stored expectations.
pub struct Dispatcher {
    store: Arc<ExpectationStore>,
    evaluator: Arc<dyn TemplateEvaluator>,
    transport: Arc<dyn HttpTransport>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<ExpectationStore>,
        evaluator: Arc<dyn TemplateEvaluator>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            store,
            evaluator,
            transport,
        }
    }

    /// The store this dispatcher reads from.
    pub fn store(&self) -> &Arc<ExpectationStore> {
        &self.store
    }

    /// Dispatch a normalized incoming request.
    pub async fn apply(&self, incoming: &RequestFilter) -> Outcome {
        let snapshot = self.store.snapshot_ordered().await;

        let Some(exp) = matcher::find_match(&snapshot, incoming) else {
            warn!(
                method = %incoming.method,
                path = %incoming.path,
                "{}", NO_MATCH_BODY
            );
            return Outcome::NoMatch;
        };

        info!(
            key = %exp.key,
            method = %incoming.method,
            path = %incoming.path,
            "Request matched expectation"
        );

        let result = self.execute(exp, incoming).await;
        Outcome::Matched {
            key: exp.key.clone(),
            result,
        }
    }

    async fn execute(&self, exp: &Expectation, incoming: &RequestFilter) -> DispatchResult {
        if let Some(delay) = exp.delay_duration() {
            info!(key = %exp.key, delay_secs = exp.delay, "Delaying response");
            tokio::time::sleep(delay).await;
        }

        if let Some(response) = &exp.response {
            debug!(key = %exp.key, "Applying response expectation");
            return self.respond(&exp.key, response, incoming).await;
        }

        if let Some(forward) = &exp.forward {
            debug!(key = %exp.key, host = %forward.host, "Applying forward expectation");
            return self.forward(&exp.key, forward, incoming).await;
        }

        debug!(key = %exp.key, "Expectation has no action");
        DispatchResult::new(200, Bytes::new())
    }

    async fn respond(
        &self,
        key: &str,
        response: &ResponseAction,
        incoming: &RequestFilter,
    ) -> DispatchResult {
        let headers = response.headers.clone().unwrap_or_default();

        let body = match &response.jstemplate {
            Some(source) => match self.evaluate(source, incoming).await {
                Ok(rendered) => rendered,
                Err(err) => {
                    error!(key, error = %err, "Template evaluation failed");
                    return DispatchResult::new(500, err.to_string());
                }
            },
            None => response.body.clone(),
        };

        DispatchResult::new(response.httpcode, body).with_headers(headers)
    }

    async fn evaluate(&self, source: &str, incoming: &RequestFilter) -> Result<String, EvalError> {
        let evaluator = Arc::clone(&self.evaluator);
        let source = source.to_string();
        let request = incoming.clone();

        tokio::task::spawn_blocking(move || evaluator.evaluate(&source, &request))
            .await
            .map_err(|e| EvalError::Execution(format!("template task failed: {e}")))?
    }

    async fn forward(
        &self,
        key: &str,
        forward: &ForwardAction,
        incoming: &RequestFilter,
    ) -> DispatchResult {
        let outbound = build_outbound_request(incoming, forward);
        info!(key, method = %outbound.method, url = %outbound.url, "Forwarding request");

        match self.transport.send(outbound).await {
            Ok(response) => DispatchResult::new(response.status, response.body)
                .with_headers(response.headers),
            Err(err) => {
                error!(key, error = %err, "Forward failed");
                DispatchResult::internal_error()
            }
        }
    }
}

/// Build the upstream request for a forward action.
///
/// The incoming headers are copied first (except `Host`), then the forward's
/// headers overwrite same-named ones. A forward header named `Host` sets the
/// outbound host identity instead of becoming a header.
pub fn build_outbound_request(incoming: &RequestFilter, forward: &ForwardAction) -> OutboundRequest {
    let mut headers = Headers::new();
    let mut host = None;

    if let Some(incoming_headers) = &incoming.headers {
        for (name, value) in incoming_headers {
            if !name.eq_ignore_ascii_case("host") {
                set_header(&mut headers, name, value);
            }
        }
    }

    if let Some(forward_headers) = &forward.headers {
        for (name, value) in forward_headers {
            if name.eq_ignore_ascii_case("host") {
                debug!(host = %value, "Overriding outbound host");
                host = Some(value.clone());
            } else {
                set_header(&mut headers, name, value);
            }
        }
    }

    OutboundRequest {
        method: incoming.method.clone(),
        url: format!("{}://{}{}", forward.scheme, forward.host, incoming.path),
        host,
        headers,
        body: incoming.body_bytes(),
    }
}

/// Insert a header, replacing any existing one regardless of name case.
fn set_header(headers: &mut Headers, name: &str, value: &str) {
    headers.retain(|existing, _| !existing.eq_ignore_ascii_case(name));
    headers.insert(name.to_string(), value.to_string());
}
