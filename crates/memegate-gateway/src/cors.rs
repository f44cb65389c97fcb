use actix_cors::Cors;
use actix_web::http::header::{self, HeaderName};

use crate::middleware::CREDITS_REMAINING_HEADER;

/// CORS for browser callers. An `*` entry admits every origin, otherwise the
/// request origin must match one entry exactly.
pub fn build_cors(allowed_origins: &[String]) -> Cors {
    let any_origin = allowed_origins.iter().any(|o| o == "*");
    let origins = allowed_origins.to_vec();

    Cors::default()
        .allowed_origin_fn(move |origin, _| {
            any_origin
                || origin
                    .to_str()
                    .map(|origin| origins.iter().any(|o| o == origin))
                    .unwrap_or(false)
        })
        .allowed_methods(vec!["GET", "POST", "OPTIONS"])
        .allowed_headers(vec![header::AUTHORIZATION, header::ACCEPT, header::CONTENT_TYPE])
        .expose_headers(vec![HeaderName::from_static(CREDITS_REMAINING_HEADER)])
        .max_age(3600)
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, web, App, HttpResponse};

    #[actix_rt::test]
    async fn test_listed_origin_sees_credit_header() {
        let app = test::init_service(
            App::new()
                .wrap(build_cors(&["https://memes.example".to_string()]))
                .route("/", web::get().to(|| async { HttpResponse::Ok().finish() })),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/")
            .insert_header(("Origin", "https://memes.example"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(
            resp.headers().get("access-control-allow-origin").unwrap(),
            "https://memes.example"
        );
        assert!(resp
            .headers()
            .get("access-control-expose-headers")
            .unwrap()
            .to_str()
            .unwrap()
            .contains(CREDITS_REMAINING_HEADER));
    }
}
