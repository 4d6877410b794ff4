use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header,
    web, Error, HttpMessage,
};
use futures::future::LocalBoxFuture;
use std::future::{ready, Ready};

use crate::config::AppConfig;
use crate::services::auth_service::{self, Claims, Role};
use crate::utils::AppError;

/// Requires a bearer token for `role`. Verified claims are inserted into the
/// request extensions for handlers (`web::ReqData<Claims>`).
pub struct AuthMiddleware {
    role: Role,
}

impl AuthMiddleware {
    pub fn new(role: Role) -> Self {
        AuthMiddleware { role }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = AuthMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthMiddlewareService { service, role: self.role }))
    }
}

pub struct AuthMiddlewareService<S> {
    service: S,
    role: Role,
}

fn bearer_token(req: &ServiceRequest) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn authenticate(req: &ServiceRequest, role: Role) -> Result<Claims, AppError> {
    let config = req
        .app_data::<web::Data<AppConfig>>()
        .ok_or_else(|| AppError::Configuration("AppConfig is not registered".into()))?;

    let token = bearer_token(req)
        .ok_or_else(|| AppError::Unauthorized("No authentication token provided".into()))?;

    let claims = auth_service::verify_token(&config.jwt_secret, token)?;

    let admin_ok = role != Role::Admin || claims.email.as_deref() == Some(config.admin_email.as_str());
    if claims.role != role || !admin_ok {
        return Err(AppError::Unauthorized("Not authorized".into()));
    }

    Ok(claims)
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        match authenticate(&req, self.role) {
            Ok(claims) => {
                req.extensions_mut().insert(claims);
                let fut = self.service.call(req);
                Box::pin(fut)
            }
            Err(e) => {
                log::warn!("🔒 {} {} rejected: {}", req.method(), req.path(), e);
                Box::pin(async move { Err(e.into()) })
            }
        }
    }
}
