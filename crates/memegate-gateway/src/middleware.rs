use actix_web::http::header::AUTHORIZATION;
use actix_web::HttpRequest;
use memegate::{Admission, AdmissionGuard, Rejection};
use std::future::Future;

use crate::error::GatewayError;
use crate::metrics::ADMISSIONS_TOTAL;

/// Response header carrying the balance left after an admitted call.
/// Lowercase so it can double as a static `HeaderName`.
pub const CREDITS_REMAINING_HEADER: &str = "x-credits-remaining";

/// Extract the presented token from the Authorization header.
/// Accepts `Bearer <token>` as well as a bare token.
pub fn presented_token(req: &HttpRequest) -> Option<&str> {
    let value = req.headers().get(AUTHORIZATION)?.to_str().ok()?.trim();
    let token = match value.get(..7) {
        Some(prefix) if prefix.eq_ignore_ascii_case("bearer ") => value[7..].trim(),
        _ => value,
    };
    (!token.is_empty()).then_some(token)
}

/// Compare two secrets without short-circuiting on the first differing byte.
/// Comparing SHA-256 digests keeps the work independent of either length.
fn secrets_match(presented: &str, expected: &str) -> bool {
    use sha2::{Digest, Sha256};
    let presented = Sha256::digest(presented.as_bytes());
    let expected = Sha256::digest(expected.as_bytes());
    presented
        .iter()
        .zip(expected.iter())
        .fold(0u8, |diff, (a, b)| diff | (a ^ b))
        == 0
}

/// Check an operator bearer token. `None` means the route is open.
pub fn bearer_matches(req: &HttpRequest, expected: Option<&str>) -> bool {
    match expected {
        None => true,
        Some(expected) => presented_token(req)
            .map(|token| secrets_match(token, expected))
            .unwrap_or(false),
    }
}

fn outcome_label(rejection: &Rejection) -> &'static str {
    match rejection {
        Rejection::Unauthenticated => "unauthenticated",
        Rejection::InsufficientCredit => "insufficient_credit",
        Rejection::ChargeFailed(_) => "charge_failed",
    }
}

/// Charge one credit for the request, then run the metered operation.
///
/// The operation only runs after the charge has committed. Its output is
/// returned untouched together with the admission.
pub async fn metered<F, Fut, T>(
    req: &HttpRequest,
    guard: &AdmissionGuard,
    op: F,
) -> Result<(Admission, T), GatewayError>
where
    F: FnOnce(Admission) -> Fut,
    Fut: Future<Output = T>,
{
    let outcome = guard
        .forward(presented_token(req), |admission| async move {
            let output = op(admission).await;
            (admission, output)
        })
        .await;

    let label = match &outcome {
        Ok(_) => "admitted",
        Err(rejection) => outcome_label(rejection),
    };
    ADMISSIONS_TOTAL.with_label_values(&[label]).inc();

    outcome.map_err(GatewayError::from)
}
