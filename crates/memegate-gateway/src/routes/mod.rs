use actix_web::web;

pub mod health;
pub mod memes;
pub mod tokens;
pub mod usage;

/// Mount every gateway route.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.configure(health::configure)
        .configure(tokens::configure)
        .configure(usage::configure)
        .configure(memes::configure);
}
