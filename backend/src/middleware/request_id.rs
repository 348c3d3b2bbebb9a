use axum::{
    extract::Request,
    http::{header::HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

const REQUEST_ID_HEADER: &str = "x-request-id";
const CORRELATION_ID_HEADER: &str = "x-correlation-id";
const MAX_ID_LEN: usize = 128;

/// Identifier threaded through a request so lifecycle and capture log lines
/// can be correlated with the caller's own tracing.
#[derive(Clone, Debug)]
pub struct RequestId(pub String);

/// Inbound ids are caller-controlled; anything oversized or non-printable is
/// discarded rather than echoed back.
fn accept_inbound(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= MAX_ID_LEN
        && value.bytes().all(|b| b.is_ascii_graphic())
}

pub async fn request_id(mut req: Request, next: Next) -> Response {
    let header_name = HeaderName::from_static(REQUEST_ID_HEADER);

    let id = req
        .headers()
        .get(&header_name)
        .or_else(|| {
            req.headers()
                .get(HeaderName::from_static(CORRELATION_ID_HEADER))
        })
        .and_then(|v| v.to_str().ok())
        .filter(|v| accept_inbound(v))
        .map(|v| v.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let request_id = RequestId(id.clone());
    req.extensions_mut().insert(request_id.clone());

    let mut response = next.run(req).await;

    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(header_name, value);
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_inbound_ids_are_kept() {
        assert!(accept_inbound("req-1234"));
        assert!(accept_inbound(&Uuid::new_v4().to_string()));
    }

    #[test]
    fn oversized_or_unprintable_ids_are_discarded() {
        assert!(!accept_inbound(""));
        assert!(!accept_inbound(&"x".repeat(MAX_ID_LEN + 1)));
        assert!(!accept_inbound("has space"));
        assert!(!accept_inbound("tab\there"));
    }
}
