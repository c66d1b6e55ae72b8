//! Template engines for dynamic responses.
//!
//! A response may carry a base64-encoded template instead of a literal body.
//! The dispatcher hands it to a [`TemplateEvaluator`] together with the
//! incoming request; the evaluator's output becomes the response body.
//!
//! Two engines are provided:
//!
//! - [`JsTemplateEvaluator`] runs the template as JavaScript in a fresh Boa
//!   context with the request bound to the global `request`. The completion
//!   value of the script, converted to a string, is the body.
//! - [`HandlebarsEvaluator`] renders the template with Handlebars against the
//!   request fields.

use crate::config::{Headers, RequestFilter};
use crate::error::EvalError;
use base64::Engine as _;
use boa_engine::{js_string, Context, JsObject, JsValue, Source};
use handlebars::{Handlebars, RenderErrorReason};
use regex::RegexBuilder;
use serde::Serialize;

/// Produces a response body from a template and the current request.
///
/// Implementations must not keep state between calls.
pub trait TemplateEvaluator: Send + Sync {
    /// Evaluate a base64-encoded template against `request`.
    fn evaluate(&self, source: &str, request: &RequestFilter) -> Result<String, EvalError>;
}

/// Decode a base64 template source into text.
pub fn decode_source(encoded: &str) -> Result<String, EvalError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| EvalError::InvalidEncoding(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| EvalError::InvalidEncoding(e.to_string()))
}

/// JavaScript templates executed with Boa.
///
/// The `request` global exposes `method`, `path`, `body` and `headers`, plus
/// the capitalized `Method`, `Path`, `Body` and `Headers` spellings older
/// templates use.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsTemplateEvaluator;

impl JsTemplateEvaluator {
    pub fn new() -> Self {
        Self
    }
}

impl TemplateEvaluator for JsTemplateEvaluator {
    fn evaluate(&self, source: &str, request: &RequestFilter) -> Result<String, EvalError> {
        let script = decode_source(source)?;

        // A fresh context per call: nothing survives between requests.
        let mut context = Context::default();
        let request_obj = create_request_object(&mut context, request)?;

        let global = context.global_object();
        global
            .set(js_string!("request"), request_obj, false, &mut context)
            .map_err(|e| EvalError::Execution(format!("failed to bind request: {e}")))?;

        let value = context
            .eval(Source::from_bytes(script.as_bytes()))
            .map_err(|e| EvalError::Execution(e.to_string()))?;

        value
            .to_string(&mut context)
            .map(|s| s.to_std_string_escaped())
            .map_err(|e| EvalError::Execution(e.to_string()))
    }
}

fn create_request_object(
    context: &mut Context,
    request: &RequestFilter,
) -> Result<JsObject, EvalError> {
    let obj = JsObject::with_object_proto(context.intrinsics());

    let headers_obj = JsObject::with_object_proto(context.intrinsics());
    if let Some(headers) = &request.headers {
        for (name, value) in headers {
            set_property(&headers_obj, name, js_string_value(value), context)?;
        }
    }
    let headers_value: JsValue = headers_obj.into();

    for (name, value) in [
        ("method", js_string_value(&request.method)),
        ("path", js_string_value(&request.path)),
        ("body", js_string_value(&request.body)),
        ("headers", headers_value),
    ] {
        set_property(&obj, name, value.clone(), context)?;
        set_property(&obj, &capitalize(name), value, context)?;
    }

    Ok(obj)
}

fn js_string_value(value: &str) -> JsValue {
    JsValue::from(js_string!(value.to_string()))
}

fn set_property(
    obj: &JsObject,
    name: &str,
    value: JsValue,
    context: &mut Context,
) -> Result<(), EvalError> {
    obj.set(js_string!(name.to_string()), value, false, context)
        .map(|_| ())
        .map_err(|e| EvalError::Execution(format!("failed to set {name}: {e}")))
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Handlebars templates.
///
/// Templates see `method`, `path`, `body`, `headers` and, when the body is
/// JSON, `json`.
pub struct HandlebarsEvaluator {
    handlebars: Handlebars<'static>,
}

/// Context for Handlebars rendering.
#[derive(Debug, Serialize)]
struct TemplateContext<'a> {
    method: &'a str,
    path: &'a str,
    body: &'a str,
    headers: Headers,
    #[serde(skip_serializing_if = "Option::is_none")]
    json: Option<serde_json::Value>,
}

impl HandlebarsEvaluator {
    /// Create an evaluator with the custom helpers registered.
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();

        handlebars.register_helper("regexLocator", Box::new(regex_locator_helper));
        handlebars.register_helper("uuid", Box::new(uuid_helper));
        handlebars.register_helper("now", Box::new(now_helper));
        handlebars.register_helper("split", Box::new(split_helper));
        handlebars.register_helper("default", Box::new(default_helper));
        handlebars.register_helper("upper", Box::new(upper_helper));
        handlebars.register_helper("lower", Box::new(lower_helper));

        // Bodies are not HTML
        handlebars.register_escape_fn(handlebars::no_escape);

        Self { handlebars }
    }
}

impl Default for HandlebarsEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateEvaluator for HandlebarsEvaluator {
    fn evaluate(&self, source: &str, request: &RequestFilter) -> Result<String, EvalError> {
        let template = decode_source(source)?;

        let ctx = TemplateContext {
            method: &request.method,
            path: &request.path,
            body: &request.body,
            headers: request.headers.clone().unwrap_or_default(),
            json: serde_json::from_str(&request.body).ok(),
        };

        self.handlebars
            .render_template(&template, &ctx)
            .map_err(|e| EvalError::Execution(e.to_string()))
    }
}

// Custom Handlebars helpers

/// `{{regexLocator pattern [separator]}}`: every match of `pattern` in the
/// request body, first capture group when the pattern has one.
fn regex_locator_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    ctx: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    let pattern = h.param(0).and_then(|v| v.value().as_str()).unwrap_or("");
    let separator = h.param(1).and_then(|v| v.value().as_str()).unwrap_or(",");
    let body = ctx.data().get("body").and_then(|v| v.as_str()).unwrap_or("");

    let regex = RegexBuilder::new(pattern)
        .multi_line(true)
        .build()
        .map_err(|e| RenderErrorReason::Other(format!("regexLocator: {e}")))?;

    let found: Vec<&str> = regex
        .captures_iter(body)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(0)))
        .map(|m| m.as_str())
        .collect();

    out.write(&found.join(separator))?;
    Ok(())
}

fn uuid_helper(
    _: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let uuid = format!(
        "{:08x}-{:04x}-4{:03x}-{:04x}-{:012x}",
        rng.gen::<u32>(),
        rng.gen::<u16>(),
        rng.gen::<u16>() & 0x0fff,
        (rng.gen::<u16>() & 0x3fff) | 0x8000,
        rng.gen::<u64>() & 0xffffffffffff,
    );
    out.write(&uuid)?;
    Ok(())
}

fn now_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    use chrono::Utc;

    let format = h
        .param(0)
        .and_then(|v| v.value().as_str())
        .unwrap_or("%Y-%m-%dT%H:%M:%S%.3fZ");

    out.write(&Utc::now().format(format).to_string())?;
    Ok(())
}

/// `{{split value separator index}}`
fn split_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    let value = h.param(0).and_then(|v| v.value().as_str()).unwrap_or("");
    let separator = h.param(1).and_then(|v| v.value().as_str()).unwrap_or(",");
    let index = h.param(2).and_then(|v| v.value().as_u64()).unwrap_or(0) as usize;

    if let Some(part) = value.split(separator).nth(index) {
        out.write(part)?;
    }
    Ok(())
}

fn default_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    let value = h.param(0).map(|v| v.value());
    let default = h.param(1).and_then(|v| v.value().as_str()).unwrap_or("");

    match value {
        Some(v) if !v.is_null() => {
            if let Some(s) = v.as_str() {
                if !s.is_empty() {
                    out.write(s)?;
                    return Ok(());
                }
            } else {
                out.write(&v.to_string())?;
                return Ok(());
            }
        }
        _ => {}
    }

    out.write(default)?;
    Ok(())
}

fn upper_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    let value = h.param(0).and_then(|v| v.value().as_str()).unwrap_or("");
    out.write(&value.to_uppercase())?;
    Ok(())
}

fn lower_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    let value = h.param(0).and_then(|v| v.value().as_str()).unwrap_or("");
    out.write(&value.to_lowercase())?;
    Ok(())
}
