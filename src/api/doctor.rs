use actix_web::{web, HttpResponse};
use serde_json::json;

use super::{guarded, json_config, reject, Store};
use crate::config::AppConfig;
use crate::models::{AppointmentResponse, DoctorProfileUpdate};
use crate::services::auth_service::{Claims, LoginRequest, Role, TokenResponse};
use crate::services::booking_service::AppointmentIdRequest;
use crate::services::doctor_service;

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/doctor")
            .app_data(json_config())
            .route("/list", web::get().to(list))
            .route("/login", web::post().to(login))
            .service(guarded("/profile", Role::Doctor, web::get().to(profile)))
            .service(guarded("/profile/update", Role::Doctor, web::put().to(update_profile)))
            .service(guarded("/profile/availability", Role::Doctor, web::put().to(toggle_availability)))
            .service(guarded("/appointments", Role::Doctor, web::get().to(appointments)))
            .service(guarded("/appointments/mark-completed", Role::Doctor, web::put().to(mark_completed))),
    );
}

#[utoipa::path(
    get,
    path = "/api/doctor/list",
    tag = "Doctor",
    responses((status = 200, description = "Public doctor listing (no email, no password)"))
)]
pub async fn list(store: Store) -> HttpResponse {
    match doctor_service::list_doctors(store.get_ref()).await {
        Ok(doctors) => HttpResponse::Ok().json(json!({ "success": true, "doctors": doctors })),
        Err(e) => reject("doctor list", e),
    }
}

#[utoipa::path(
    post,
    path = "/api/doctor/login",
    tag = "Doctor",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = TokenResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(store: Store, config: web::Data<AppConfig>, request: web::Json<LoginRequest>) -> HttpResponse {
    log::info!("🔐 POST /api/doctor/login - email: {}", request.email.as_deref().unwrap_or("N/A"));

    match doctor_service::login(store.get_ref(), &config.jwt_secret, &request).await {
        Ok(token) => HttpResponse::Ok().json(TokenResponse { success: true, token }),
        Err(e) => reject("doctor login", e),
    }
}

pub async fn profile(store: Store, claims: web::ReqData<Claims>) -> HttpResponse {
    let result = async {
        let doctor_id = claims.subject_id()?;
        doctor_service::profile(store.get_ref(), &doctor_id).await
    }
    .await;

    match result {
        Ok(profile) => HttpResponse::Ok().json(json!({ "success": true, "profileData": profile })),
        Err(e) => reject("doctor profile", e),
    }
}

#[utoipa::path(
    put,
    path = "/api/doctor/profile/update",
    tag = "Doctor",
    request_body = DoctorProfileUpdate,
    responses(
        (status = 200, description = "Profile updated"),
        (status = 400, description = "Invalid field value")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_profile(
    store: Store,
    claims: web::ReqData<Claims>,
    update: web::Json<DoctorProfileUpdate>,
) -> HttpResponse {
    log::info!("🩺 PUT /api/doctor/profile/update - doctor: {}", claims.sub);

    let result = async {
        let doctor_id = claims.subject_id()?;
        doctor_service::update_profile(store.get_ref(), &doctor_id, &update).await
    }
    .await;

    match result {
        Ok(profile) => HttpResponse::Ok().json(json!({
            "success": true,
            "message": "Profile Updated",
            "profileData": profile,
        })),
        Err(e) => reject("doctor profile update", e),
    }
}

pub async fn toggle_availability(store: Store, claims: web::ReqData<Claims>) -> HttpResponse {
    let result = async {
        let doctor_id = claims.subject_id()?;
        doctor_service::toggle_availability(store.get_ref(), &doctor_id).await
    }
    .await;

    match result {
        Ok(available) => HttpResponse::Ok().json(json!({
            "success": true,
            "message": "Availability Changed",
            "available": available,
        })),
        Err(e) => reject("doctor availability", e),
    }
}

pub async fn appointments(store: Store, claims: web::ReqData<Claims>) -> HttpResponse {
    let result = async {
        let doctor_id = claims.subject_id()?;
        doctor_service::appointments(store.get_ref(), &doctor_id).await
    }
    .await;

    match result {
        Ok(appointments) => {
            let appointments: Vec<AppointmentResponse> =
                appointments.into_iter().map(AppointmentResponse::from).collect();
            HttpResponse::Ok().json(json!({ "success": true, "appointments": appointments }))
        }
        Err(e) => reject("doctor appointments", e),
    }
}

#[utoipa::path(
    put,
    path = "/api/doctor/appointments/mark-completed",
    tag = "Doctor",
    request_body = AppointmentIdRequest,
    responses(
        (status = 200, description = "Completed, or `success: false` when already completed/cancelled"),
        (status = 404, description = "Not one of this doctor's appointments")
    ),
    security(("bearer_auth" = []))
)]
pub async fn mark_completed(
    store: Store,
    claims: web::ReqData<Claims>,
    request: web::Json<AppointmentIdRequest>,
) -> HttpResponse {
    log::info!("✔️  PUT /api/doctor/appointments/mark-completed - doctor: {}, appointment: {:?}", claims.sub, request.appointment_id);

    let result = async {
        let doctor_id = claims.subject_id()?;
        let appointment_id = request.id()?;
        doctor_service::mark_completed(store.get_ref(), &doctor_id, &appointment_id).await
    }
    .await;

    match result {
        Ok(appointment) => HttpResponse::Ok().json(json!({
            "success": true,
            "message": "Appointment Completed",
            "appointment": AppointmentResponse::from(appointment),
        })),
        Err(e) => reject("mark-completed", e),
    }
}
