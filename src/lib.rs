//! Tumor diagnosis classifiers: an offline training pipeline and an HTTP
//! inference service for the fitted model.

pub mod classifier;
pub mod config;
pub mod error;
pub mod handlers;
pub mod inference;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod training;

use actix_cors::Cors;
use actix_web::body::MessageBody;
use actix_web::dev::{Service, ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::middleware::Logger;
use actix_web::{web, App};
use inference::LoadedModel;
use std::time::Instant;

/// The inference application: routes, request metrics, access log and CORS.
pub fn app(
    model: web::Data<LoadedModel>,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse<impl MessageBody>,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    let cors = Cors::default()
        .allow_any_origin()
        .allow_any_method()
        .allow_any_header();

    App::new()
        .wrap_fn(|req, srv| {
            let started = Instant::now();
            let method = req.method().to_string();
            let fut = srv.call(req);
            async move {
                let res = fut.await?;
                let handler = res
                    .request()
                    .match_pattern()
                    .unwrap_or_else(|| "none".to_string());
                metrics::observe_request(
                    &method,
                    &handler,
                    res.status().as_u16(),
                    started.elapsed(),
                );
                Ok(res)
            }
        })
        .wrap(Logger::new("\"%r\" %s %Dms"))
        .wrap(cors)
        .app_data(model)
        .configure(handlers::configure)
        .default_service(web::to(handlers::not_found))
}
