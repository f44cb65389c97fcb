use actix_web::{web, HttpRequest, HttpResponse};

use crate::error::GatewayError;
use crate::middleware::{metered, CREDITS_REMAINING_HEADER};
use crate::state::AppState;
use crate::upstream::{MemeSource, UpstreamError};

/// Query parameters for `/memes`. Missing values are passed upstream as empty strings,
/// so a malformed request still reaches the guard and is charged.
#[derive(Debug, Default, serde::Deserialize)]
pub struct MemeQuery {
    #[serde(default)]
    pub lat: String,
    #[serde(default)]
    pub lon: String,
    #[serde(default)]
    pub query: String,
}

#[derive(Debug, PartialEq, Eq, serde::Serialize)]
pub struct MemeResponse {
    pub url: String,
    pub location: String,
    pub query: String,
}

/// The metered operation: place name for the coordinates, then a meme for
/// `"{query} {place}"`.
pub async fn lookup_meme(
    source: &dyn MemeSource,
    params: &MemeQuery,
) -> Result<MemeResponse, UpstreamError> {
    let location = source.resolve_location(&params.lat, &params.lon).await?;
    let combined = format!("{} {}", params.query, location);
    let url = source.search_media(&combined).await?;

    Ok(MemeResponse {
        url,
        location,
        query: params.query.clone(),
    })
}

/// GET /memes?lat=..&lon=..&query=.. - Metered meme lookup
pub async fn memes(
    req: HttpRequest,
    query: web::Query<MemeQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, GatewayError> {
    let params = query.into_inner();
    let source = state.memes.clone();

    let (admission, result) = metered(&req, &state.guard, |_| async move {
        lookup_meme(source.as_ref(), &params).await
    })
    .await?;
    let meme = result?;

    Ok(HttpResponse::Ok()
        .insert_header((CREDITS_REMAINING_HEADER, admission.remaining.to_string()))
        .json(meme))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/memes", web::get().to(memes));
}
