use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use super::{guarded, json_config, reject, Images, Store};
use crate::config::AppConfig;
use crate::models::AppointmentResponse;
use crate::services::admin_service;
use crate::services::auth_service::{self, LoginRequest, Role, TokenResponse};
use crate::services::booking_service::parse_object_id;
use crate::utils::multipart::collect_form;

#[derive(Debug, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChangeAvailabilityRequest {
    pub doc_id: Option<String>,
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/admin")
            .app_data(json_config())
            .route("/login", web::post().to(login))
            .service(guarded("/add-doctor", Role::Admin, web::post().to(add_doctor)))
            .service(guarded("/all-doctors", Role::Admin, web::get().to(all_doctors)))
            .service(guarded("/change-availability", Role::Admin, web::post().to(change_availability)))
            .service(guarded("/appointments", Role::Admin, web::get().to(appointments)))
            .service(guarded("/patients-count", Role::Admin, web::get().to(patients_count))),
    );
}

#[utoipa::path(
    post,
    path = "/api/admin/login",
    tag = "Admin",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = TokenResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(config: web::Data<AppConfig>, request: web::Json<LoginRequest>) -> HttpResponse {
    log::info!("🔐 POST /api/admin/login");

    match auth_service::login_admin(&config.jwt_secret, &config.admin_email, &config.admin_password, &request) {
        Ok(token) => HttpResponse::Ok().json(TokenResponse { success: true, token }),
        Err(e) => reject("admin login", e),
    }
}

/// Multipart: name, email, password, speciality, degree, experience, about,
/// fees, address (JSON) and the `image` file.
pub async fn add_doctor(store: Store, images: Images, payload: Multipart) -> HttpResponse {
    log::info!("🩺 POST /api/admin/add-doctor");

    let result = async {
        let form = collect_form(payload, "image").await?;
        admin_service::add_doctor(store.get_ref(), images.get_ref(), form).await
    }
    .await;

    match result {
        Ok(id) => HttpResponse::Ok().json(json!({
            "success": true,
            "message": "Doctor Added",
            "doctorId": id.to_hex(),
        })),
        Err(e) => reject("add-doctor", e),
    }
}

pub async fn all_doctors(store: Store) -> HttpResponse {
    match admin_service::all_doctors(store.get_ref()).await {
        Ok(doctors) => HttpResponse::Ok().json(json!({ "success": true, "doctors": doctors })),
        Err(e) => reject("all-doctors", e),
    }
}

#[utoipa::path(
    post,
    path = "/api/admin/change-availability",
    tag = "Admin",
    request_body = ChangeAvailabilityRequest,
    responses(
        (status = 200, description = "Availability flipped"),
        (status = 404, description = "Doctor not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn change_availability(store: Store, request: web::Json<ChangeAvailabilityRequest>) -> HttpResponse {
    log::info!("🔁 POST /api/admin/change-availability - doctor: {:?}", request.doc_id);

    let result = async {
        let doctor_id = parse_object_id(request.doc_id.as_deref(), "doctor")?;
        admin_service::change_availability(store.get_ref(), &doctor_id).await
    }
    .await;

    match result {
        Ok(available) => HttpResponse::Ok().json(json!({
            "success": true,
            "message": "Availability Changed",
            "available": available,
        })),
        Err(e) => reject("change-availability", e),
    }
}

pub async fn appointments(store: Store) -> HttpResponse {
    match admin_service::all_appointments(store.get_ref()).await {
        Ok(appointments) => {
            let appointments: Vec<AppointmentResponse> =
                appointments.into_iter().map(AppointmentResponse::from).collect();
            HttpResponse::Ok().json(json!({ "success": true, "appointments": appointments }))
        }
        Err(e) => reject("admin appointments", e),
    }
}

pub async fn patients_count(store: Store) -> HttpResponse {
    match admin_service::patients_count(store.get_ref()).await {
        Ok(count) => HttpResponse::Ok().json(json!({ "success": true, "count": count })),
        Err(e) => reject("patients-count", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::TestState;
    use crate::database::ClinicStore;
    use crate::services::doctor_service::tests::sample_doctor;
    use actix_web::{http::header, http::StatusCode, test, App};
    use serde_json::Value;

    #[actix_rt::test]
    async fn test_admin_flow() {
        let state = TestState::new();
        let doctor_id = state.store.insert_doctor(&sample_doctor("doc@example.com", "hash")).await.unwrap();
        let app = test::init_service(
            App::new()
                .app_data(state.store_data.clone())
                .app_data(state.images_data.clone())
                .app_data(state.config.clone())
                .configure(routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/admin/login")
            .set_json(json!({ "email": "admin@prescripto.test", "password": "wrong" }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::post()
            .uri("/api/admin/login")
            .set_json(json!({ "email": "admin@prescripto.test", "password": "Admin#2024" }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        let auth = (header::AUTHORIZATION, format!("Bearer {}", body["token"].as_str().unwrap()));

        let req = test::TestRequest::get().uri("/api/admin/all-doctors").insert_header(auth.clone()).to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["doctors"][0]["email"], "doc@example.com");
        assert!(body["doctors"][0].get("password").is_none());

        let req = test::TestRequest::post()
            .uri("/api/admin/change-availability")
            .insert_header(auth.clone())
            .set_json(json!({ "docId": doctor_id.to_hex() }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["available"], false);
        assert!(!state.store.doctor(&doctor_id).available);

        let req = test::TestRequest::get().uri("/api/admin/patients-count").insert_header(auth).to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["count"], 0);
    }
}
