use utoipa::OpenApi;
use utoipa::openapi::security::{SecurityScheme, HttpAuthScheme, HttpBuilder};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Clinic Booking Service API",
        version = "1.0.0",
        description = "Doctor appointment booking backend.\n\n**Authentication:** protected endpoints take a JWT Bearer token issued by the user, doctor or admin login.\n\n**Conflicts** (duplicate account, booked slot, already paid...) answer HTTP 200 with `success: false`.",
    ),
    paths(
        // Health
        crate::api::health::health_check,

        // User
        crate::api::user::register,
        crate::api::user::login,
        crate::api::user::get_profile,
        crate::api::user::book_appointment,
        crate::api::user::cancel_appointment,
        crate::api::user::payu_payment_initiate,

        // Doctor
        crate::api::doctor::list,
        crate::api::doctor::login,
        crate::api::doctor::update_profile,
        crate::api::doctor::mark_completed,

        // Admin
        crate::api::admin::login,
        crate::api::admin::change_availability,
    ),
    components(
        schemas(
            crate::api::health::HealthResponse,
            crate::services::auth_service::LoginRequest,
            crate::services::auth_service::TokenResponse,
            crate::services::user_service::RegisterRequest,
            crate::services::booking_service::BookAppointmentRequest,
            crate::services::booking_service::AppointmentIdRequest,
            crate::services::payment_service::PaymentParams,
            crate::models::DoctorProfileUpdate,
            crate::models::Address,
            crate::api::admin::ChangeAvailabilityRequest,
        )
    ),
    tags(
        (name = "Health", description = "Liveness and database connectivity."),
        (name = "User", description = "Patient accounts, booking and cancellation."),
        (name = "Payment", description = "PayU hosted checkout. The gateway callback always redirects to the frontend."),
        (name = "Doctor", description = "Doctor panel: profile, availability and appointments."),
        (name = "Admin", description = "Admin panel: doctors, appointments and dashboard counts."),
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some("Token from /api/user/login, /api/doctor/login or /api/admin/login"))
                        .build()
                ),
            );
        }
    }
}
