//! Request matching logic.
//!
//! Decides whether a normalized incoming request satisfies an expectation's
//! filter. Everything here is a pure function of its inputs.

use crate::config::{Expectation, Headers, RequestFilter};
use regex::RegexBuilder;
use tracing::debug;

/// Find the first expectation whose filter accepts `incoming`.
///
/// `expectations` must already be ordered by priority, highest first.
pub fn find_match<'a>(
    expectations: &'a [Expectation],
    incoming: &RequestFilter,
) -> Option<&'a Expectation> {
    expectations.iter().find(|exp| {
        let matched = matches(incoming, exp.request.as_ref());
        if !matched {
            debug!(key = %exp.key, "Expectation skipped");
        }
        matched
    })
}

/// Check a request against a filter. An absent filter matches everything.
pub fn matches(incoming: &RequestFilter, filter: Option<&RequestFilter>) -> bool {
    let Some(filter) = filter else {
        return true;
    };

    if !filter.method.is_empty() && filter.method != incoming.method {
        debug!(
            method = %incoming.method,
            expected = %filter.method,
            "No match: method differs"
        );
        return false;
    }

    if !text_matches(&incoming.path, &filter.path) {
        debug!(path = %incoming.path, filter = %filter.path, "No match: path");
        return false;
    }

    if !text_matches(&incoming.body, &filter.body) {
        debug!(filter = %filter.body, "No match: body");
        return false;
    }

    if let Some(expected) = &filter.headers {
        if !headers_match(incoming.headers.as_ref(), expected) {
            return false;
        }
    }

    true
}

/// Match `candidate` against `pattern`.
///
/// The pattern is tried as a regex with `.` matching newlines; a pattern that
/// does not compile is treated as a literal substring. An empty pattern
/// matches anything.
pub fn text_matches(candidate: &str, pattern: &str) -> bool {
    if pattern.is_empty() {
        return true;
    }

    match RegexBuilder::new(pattern).dot_matches_new_line(true).build() {
        Ok(regex) => regex.is_match(candidate),
        Err(_) => candidate.contains(pattern),
    }
}

/// Case-insensitive header lookup.
pub fn find_header<'a>(headers: &'a Headers, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

fn headers_match(incoming: Option<&Headers>, expected: &Headers) -> bool {
    if expected.is_empty() {
        return true;
    }

    let Some(incoming) = incoming else {
        debug!("No match: request carries no headers");
        return false;
    };

    for (name, pattern) in expected {
        match find_header(incoming, name) {
            Some(value) if text_matches(value, pattern) => {}
            Some(value) => {
                debug!(header = %name, value, filter = %pattern, "No match: header value");
                return false;
            }
            None => {
                debug!(header = %name, "No match: header missing");
                return false;
            }
        }
    }

    true
}
