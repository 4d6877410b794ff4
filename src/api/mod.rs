pub mod admin;
pub mod doctor;
pub mod health;
pub mod swagger;
pub mod user;

use actix_web::dev::HttpServiceFactory;
use actix_web::{web, HttpResponse, ResponseError};

use crate::database::ClinicStore;
use crate::middleware::AuthMiddleware;
use crate::services::auth_service::Role;
use crate::services::image_service::ImageHost;
use crate::utils::AppError;

pub type Store = web::Data<dyn ClinicStore>;
pub type Images = web::Data<dyn ImageHost>;

/// Logs a rejected request and renders the `{success: false, message}` body.
pub(crate) fn reject(route: &str, e: AppError) -> HttpResponse {
    log::warn!("❌ {} failed: {}", route, e);
    e.error_response()
}

/// Unreadable JSON bodies get the same `{success: false, message}` body as
/// every other rejected request.
pub(crate) fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, req| {
        log::warn!("❌ {} {} rejected: {}", req.method(), req.path(), err);
        AppError::Validation(format!("Invalid request body: {}", err)).into()
    })
}

/// One route behind a `role` bearer token. Unknown paths next to it still 404.
pub(crate) fn guarded(path: &str, role: Role, route: actix_web::Route) -> impl HttpServiceFactory {
    web::resource(path).wrap(AuthMiddleware::new(role)).route(route)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use super::*;
    use crate::config::AppConfig;
    use crate::database::memory::MemoryStore;
    use crate::services::image_service::testing::FakeImageHost;

    /// App data backed by in-memory collaborators.
    pub struct TestState {
        pub store: Arc<MemoryStore>,
        pub store_data: Store,
        pub images_data: Images,
        pub config: web::Data<AppConfig>,
    }

    impl TestState {
        pub fn new() -> Self {
            let store = Arc::new(MemoryStore::new());
            let store_data: Store = web::Data::from(store.clone() as Arc<dyn ClinicStore>);
            let images_data: Images = web::Data::from(Arc::new(FakeImageHost::default()) as Arc<dyn ImageHost>);
            TestState {
                store,
                store_data,
                images_data,
                config: web::Data::new(AppConfig::for_tests()),
            }
        }
    }
}
