use actix_multipart::Multipart;
use actix_web::{http::header, web, HttpResponse};
use chrono::Local;
use serde_json::json;

use super::{guarded, json_config, reject, Images, Store};
use crate::config::AppConfig;
use crate::models::AppointmentResponse;
use crate::services::auth_service::{Claims, LoginRequest, Role, TokenResponse};
use crate::services::booking_service::{self, AppointmentIdRequest, BookAppointmentRequest};
use crate::services::payment_service::{self, CallbackOutcome, PayuCallback};
use crate::services::user_service::{self, RegisterRequest};
use crate::utils::multipart::collect_form;

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/user")
            .app_data(json_config())
            .route("/register", web::post().to(register))
            .route("/login", web::post().to(login))
            .route("/payu-callback", web::post().to(payu_callback))
            .service(guarded("/get-profile", Role::User, web::get().to(get_profile)))
            .service(guarded("/update-profile", Role::User, web::post().to(update_profile)))
            .service(guarded("/book-appointment", Role::User, web::post().to(book_appointment)))
            .service(guarded("/my-appointments", Role::User, web::get().to(my_appointments)))
            .service(guarded("/cancel-appointment", Role::User, web::post().to(cancel_appointment)))
            .service(guarded("/payu-payment-initiate", Role::User, web::post().to(payu_payment_initiate))),
    );
}

#[utoipa::path(
    post,
    path = "/api/user/register",
    tag = "User",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "Account created, or `success: false` when the email is taken"),
        (status = 400, description = "Missing or invalid fields")
    )
)]
pub async fn register(store: Store, config: web::Data<AppConfig>, request: web::Json<RegisterRequest>) -> HttpResponse {
    let email = request.email.as_deref().unwrap_or("N/A");
    log::info!("📝 POST /api/user/register - email: {}", email);

    match user_service::register(store.get_ref(), &config.jwt_secret, &request).await {
        Ok(token) => HttpResponse::Ok().json(TokenResponse { success: true, token }),
        Err(e) => reject("register", e),
    }
}

#[utoipa::path(
    post,
    path = "/api/user/login",
    tag = "User",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = TokenResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(store: Store, config: web::Data<AppConfig>, request: web::Json<LoginRequest>) -> HttpResponse {
    log::info!("🔐 POST /api/user/login - email: {}", request.email.as_deref().unwrap_or("N/A"));

    match user_service::login(store.get_ref(), &config.jwt_secret, &request).await {
        Ok(token) => HttpResponse::Ok().json(TokenResponse { success: true, token }),
        Err(e) => reject("user login", e),
    }
}

#[utoipa::path(
    get,
    path = "/api/user/get-profile",
    tag = "User",
    responses((status = 200, description = "Profile of the current user")),
    security(("bearer_auth" = []))
)]
pub async fn get_profile(store: Store, claims: web::ReqData<Claims>) -> HttpResponse {
    let result = async {
        let user_id = claims.subject_id()?;
        user_service::get_profile(store.get_ref(), &user_id).await
    }
    .await;

    match result {
        Ok(profile) => HttpResponse::Ok().json(json!({ "success": true, "userData": profile })),
        Err(e) => reject("get-profile", e),
    }
}

/// Multipart: name, phone, address (JSON), dob, gender, optional image.
pub async fn update_profile(
    store: Store,
    images: Images,
    claims: web::ReqData<Claims>,
    payload: Multipart,
) -> HttpResponse {
    log::info!("👤 POST /api/user/update-profile - user: {}", claims.sub);

    let result = async {
        let user_id = claims.subject_id()?;
        let form = collect_form(payload, "image").await?;
        user_service::update_profile(store.get_ref(), images.get_ref(), &user_id, form).await
    }
    .await;

    match result {
        Ok(()) => HttpResponse::Ok().json(json!({ "success": true, "message": "Profile Updated" })),
        Err(e) => reject("update-profile", e),
    }
}

#[utoipa::path(
    post,
    path = "/api/user/book-appointment",
    tag = "User",
    request_body = BookAppointmentRequest,
    responses(
        (status = 200, description = "Booked, or `success: false` when the slot or doctor is unavailable"),
        (status = 400, description = "Malformed or past slot"),
        (status = 404, description = "Doctor not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn book_appointment(
    store: Store,
    claims: web::ReqData<Claims>,
    request: web::Json<BookAppointmentRequest>,
) -> HttpResponse {
    log::info!(
        "📅 POST /api/user/book-appointment - user: {}, doctor: {:?}, slot: {:?} {:?}",
        claims.sub, request.doc_id, request.slot_date, request.slot_time
    );
    let now = Local::now().naive_local();

    let result = async {
        let user_id = claims.subject_id()?;
        booking_service::book_appointment(store.get_ref(), &user_id, &request, now).await
    }
    .await;

    match result {
        Ok(appointment) => HttpResponse::Ok().json(json!({
            "success": true,
            "message": "Appointment Booked",
            "appointment": AppointmentResponse::from(appointment),
        })),
        Err(e) => reject("book-appointment", e),
    }
}

pub async fn my_appointments(store: Store, claims: web::ReqData<Claims>) -> HttpResponse {
    let result = async {
        let user_id = claims.subject_id()?;
        booking_service::my_appointments(store.get_ref(), &user_id).await
    }
    .await;

    match result {
        Ok(appointments) => {
            let appointments: Vec<AppointmentResponse> =
                appointments.into_iter().map(AppointmentResponse::from).collect();
            HttpResponse::Ok().json(json!({ "success": true, "appointments": appointments }))
        }
        Err(e) => reject("my-appointments", e),
    }
}

#[utoipa::path(
    post,
    path = "/api/user/cancel-appointment",
    tag = "User",
    request_body = AppointmentIdRequest,
    responses(
        (status = 200, description = "Cancelled, or `success: false` when already cancelled/completed"),
        (status = 403, description = "Appointment belongs to another user")
    ),
    security(("bearer_auth" = []))
)]
pub async fn cancel_appointment(
    store: Store,
    claims: web::ReqData<Claims>,
    request: web::Json<AppointmentIdRequest>,
) -> HttpResponse {
    log::info!("🗑️  POST /api/user/cancel-appointment - user: {}, appointment: {:?}", claims.sub, request.appointment_id);
    let now = Local::now().naive_local();

    let result = async {
        let user_id = claims.subject_id()?;
        let appointment_id = request.id()?;
        booking_service::cancel_appointment(store.get_ref(), &user_id, &appointment_id, now).await
    }
    .await;

    match result {
        Ok(_) => HttpResponse::Ok().json(json!({ "success": true, "message": "Appointment Cancelled" })),
        Err(e) => reject("cancel-appointment", e),
    }
}

#[utoipa::path(
    post,
    path = "/api/user/payu-payment-initiate",
    tag = "Payment",
    request_body = AppointmentIdRequest,
    responses(
        (status = 200, description = "Signed gateway parameters, or `success: false` when the appointment cannot be paid"),
        (status = 403, description = "Appointment belongs to another user")
    ),
    security(("bearer_auth" = []))
)]
pub async fn payu_payment_initiate(
    store: Store,
    config: web::Data<AppConfig>,
    claims: web::ReqData<Claims>,
    request: web::Json<AppointmentIdRequest>,
) -> HttpResponse {
    log::info!("💳 POST /api/user/payu-payment-initiate - user: {}, appointment: {:?}", claims.sub, request.appointment_id);

    let result = async {
        let user_id = claims.subject_id()?;
        let appointment_id = request.id()?;
        payment_service::initiate(store.get_ref(), &config, &user_id, &appointment_id).await
    }
    .await;

    match result {
        Ok(params) => HttpResponse::Ok().json(json!({
            "success": true,
            "message": "Payment initiation successful",
            "paymentParams": params,
        })),
        Err(e) => reject("payu-payment-initiate", e),
    }
}

/// Gateway postback. Always answers with a redirect to the frontend.
pub async fn payu_callback(
    store: Store,
    config: web::Data<AppConfig>,
    form: Result<web::Form<PayuCallback>, actix_web::Error>,
) -> HttpResponse {
    let outcome = match form {
        Ok(callback) => {
            log::info!("💳 POST /api/user/payu-callback - txn: {}, status: {}", callback.txnid, callback.status);
            payment_service::handle_callback(store.get_ref(), &config.payu, &callback)
                .await
                .unwrap_or_else(|e| {
                    log::error!("❌ PayU callback processing failed: {}", e);
                    CallbackOutcome::Rejected { reason: "ServerError" }
                })
        }
        Err(e) => {
            log::error!("❌ PayU callback with unreadable form: {}", e);
            CallbackOutcome::Rejected { reason: "ServerError" }
        }
    };

    HttpResponse::Found()
        .insert_header((header::LOCATION, outcome.redirect_url(&config.frontend_url)))
        .finish()
}
