//! gozzmock
//!
//! An HTTP test double. Clients register expectations describing which
//! requests to intercept and what to do with them; every other request the
//! server receives is matched against those expectations.
//!
//! # Features
//!
//! - **Request Matching**: Match by method, path, body, and headers (regex or substring)
//! - **Priorities**: The highest-priority matching expectation wins
//! - **Canned Responses**: Fixed status, headers, and body
//! - **Templates**: Base64-encoded JavaScript (or Handlebars) producing the body
//! - **Forwarding**: Proxy the request to another host
//! - **Delays**: Hold a matched request for a number of seconds
//! - **Runtime Admin**: Add, remove, and list expectations over HTTP
//!
//! # Example Expectation
//!
//! ```json
//! {
//!   "key": "hello",
//!   "request": { "method": "GET", "path": "/hello" },
//!   "response": {
//!     "httpcode": 200,
//!     "headers": { "Content-Type": "text/plain" },
//!     "body": "Hello, World!"
//!   },
//!   "priority": 1
//! }
//! ```

pub mod admin;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod matcher;
pub mod server;
pub mod store;
pub mod template;
pub mod transport;

pub use config::{Expectation, ForwardAction, Headers, RequestFilter, ResponseAction};
pub use dispatcher::{DispatchResult, Dispatcher, Outcome};
pub use error::{DecodeError, EvalError, MockError, TransportError, ValidationError};
pub use server::MockServer;
pub use store::ExpectationStore;
pub use template::{HandlebarsEvaluator, JsTemplateEvaluator, TemplateEvaluator};
pub use transport::{HttpTransport, ReqwestTransport};
