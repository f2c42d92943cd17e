pub mod auth;
pub mod courses;
pub mod engagement;
pub mod health;
pub mod shared;
pub mod videos;

use actix_web::web;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .configure(auth::configure)
            .configure(courses::configure)
            .configure(videos::configure)
            .configure(engagement::configure)
            .configure(health::configure),
    );
}
