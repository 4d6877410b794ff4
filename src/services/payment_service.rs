//! PayU hosted-checkout bridge: signed checkout parameters out, signed
//! callback in.

use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};

use crate::config::{AppConfig, PayuConfig};
use crate::database::ClinicStore;
use crate::models::PaymentStatus;
use crate::utils::AppError;

const DEFAULT_PHONE: &str = "9999999999";

/// Parameters the frontend posts to the gateway.
#[derive(Debug, Serialize, Clone, utoipa::ToSchema)]
pub struct PaymentParams {
    pub key: String,
    pub txnid: String,
    pub amount: String,
    pub productinfo: String,
    pub firstname: String,
    pub email: String,
    pub phone: String,
    pub surl: String,
    pub furl: String,
    pub curl: String,
    pub hash: String,
    pub action: String,
    #[serde(rename = "appointmentId")]
    pub appointment_id: String,
}

/// Form fields posted back by the gateway. Unknown fields are ignored.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct PayuCallback {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub txnid: String,
    #[serde(default)]
    pub amount: String,
    #[serde(default)]
    pub productinfo: String,
    #[serde(default)]
    pub firstname: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub mihpayid: Option<String>,
    #[serde(default)]
    pub udf1: String,
    #[serde(default)]
    pub udf2: String,
    #[serde(default)]
    pub udf3: String,
    #[serde(default)]
    pub udf4: String,
    #[serde(default)]
    pub udf5: String,
    #[serde(default, rename = "additionalCharges")]
    pub additional_charges: Option<String>,
}

/// How a callback ends; every variant becomes a frontend redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    Paid { appointment_id: String },
    Failed { appointment_id: String },
    /// Any other gateway status, echoed back untouched.
    Other { status: String, appointment_id: String },
    Rejected { reason: &'static str },
}

impl CallbackOutcome {
    pub fn redirect_url(&self, frontend_url: &str) -> String {
        let base = format!("{}/my-appointments", frontend_url);
        match self {
            CallbackOutcome::Paid { appointment_id } => {
                format!("{}?payment_status=success&appointmentId={}", base, appointment_id)
            }
            CallbackOutcome::Failed { appointment_id } => {
                format!("{}?payment_status=failure&appointmentId={}", base, appointment_id)
            }
            CallbackOutcome::Other { status, appointment_id } => format!(
                "{}?payment_status={}&appointmentId={}",
                base,
                urlencoding::encode(status),
                appointment_id
            ),
            CallbackOutcome::Rejected { reason } => {
                format!("{}?payment_status=failure&message={}", base, reason)
            }
        }
    }
}

fn sha512_hex(input: &str) -> String {
    let mut hasher = Sha512::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// `key|txnid|amount|productinfo|firstname|email|udf1..udf5||||||salt`, udf fields empty.
pub fn request_hash_input(payu: &PayuConfig, txnid: &str, amount: &str, productinfo: &str, firstname: &str, email: &str) -> String {
    format!(
        "{}|{}|{}|{}|{}|{}|||||||||||{}",
        payu.merchant_key, txnid, amount, productinfo, firstname, email, payu.salt
    )
}

/// `[additionalCharges|]salt|status|udf10..udf6|udf5|udf4|udf3|udf2|udf1|email|firstname|productinfo|amount|txnid|key`
pub fn response_hash_input(payu: &PayuConfig, callback: &PayuCallback) -> String {
    let core = format!(
        "{}|{}||||||{}|{}|{}|{}|{}|{}|{}|{}|{}|{}|{}",
        payu.salt,
        callback.status,
        callback.udf5,
        callback.udf4,
        callback.udf3,
        callback.udf2,
        callback.udf1,
        callback.email,
        callback.firstname,
        callback.productinfo,
        callback.amount,
        callback.txnid,
        payu.merchant_key
    );

    match callback.additional_charges.as_deref().filter(|c| !c.is_empty()) {
        Some(charges) => format!("{}|{}", charges, core),
        None => core,
    }
}

fn new_txn_id() -> String {
    let bytes: [u8; 16] = rand::random();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn first_name(full_name: &str) -> String {
    full_name
        .split_whitespace()
        .next()
        .unwrap_or("User")
        .to_string()
}

pub async fn initiate(
    store: &dyn ClinicStore,
    config: &AppConfig,
    user_id: &ObjectId,
    appointment_id: &ObjectId,
) -> Result<PaymentParams, AppError> {
    let read = store
        .find_appointment(appointment_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Appointment not found".into()))?;
    let mut appointment = read.clone();

    if appointment.user_id != *user_id {
        return Err(AppError::Forbidden(
            "Unauthorized to process payment for this appointment.".into(),
        ));
    }
    if appointment.payment_status == PaymentStatus::Paid {
        return Err(AppError::Conflict("This appointment has already been paid.".into()));
    }
    if appointment.cancelled {
        return Err(AppError::Conflict("Cancelled appointments cannot be paid.".into()));
    }
    if appointment.is_completed {
        return Err(AppError::Conflict("Completed appointments cannot be paid.".into()));
    }

    let txnid = new_txn_id();
    let amount = format!("{:.2}", appointment.amount);
    let productinfo = format!("Appointment with Dr. {}", appointment.doc_data.name);
    let firstname = first_name(&appointment.user_data.name);
    let email = appointment.user_data.email.clone();
    let phone = match appointment.user_data.phone.trim() {
        p if p.is_empty() || p.chars().all(|c| c == '0') => DEFAULT_PHONE.to_string(),
        p => p.to_string(),
    };

    appointment.payu_txn_id = Some(txnid.clone());
    appointment.updated_at = chrono::Utc::now().timestamp_millis();
    if !store.save_appointment(&appointment, &read).await? {
        return Err(AppError::Conflict("Appointment was updated meanwhile, please retry".into()));
    }

    let hash = sha512_hex(&request_hash_input(&config.payu, &txnid, &amount, &productinfo, &firstname, &email));

    let frontend_return = |status: &str| format!("{}/my-appointments?payment_status={}", config.frontend_url, status);
    let (surl, furl) = match &config.backend_url {
        Some(backend) => {
            let callback = format!("{}/api/user/payu-callback", backend);
            (callback.clone(), callback)
        }
        None => (frontend_return("success"), frontend_return("failure")),
    };

    log::info!("💳 Payment initiated for appointment {} (txn {})", appointment_id, txnid);

    Ok(PaymentParams {
        key: config.payu.merchant_key.clone(),
        txnid,
        amount,
        productinfo,
        firstname,
        email,
        phone,
        surl,
        furl,
        curl: frontend_return("cancelled"),
        hash,
        action: config.payu.base_url.clone(),
        appointment_id: appointment_id.to_hex(),
    })
}

/// Verifies and applies a gateway callback. Only storage errors escape as
/// `Err`; the caller turns those into a `ServerError` redirect.
pub async fn handle_callback(store: &dyn ClinicStore, payu: &PayuConfig, callback: &PayuCallback) -> Result<CallbackOutcome, AppError> {
    let expected = sha512_hex(&response_hash_input(payu, callback));
    if !expected.eq_ignore_ascii_case(callback.hash.trim()) {
        log::error!(
            "❌ PayU callback hash mismatch for txn {}: expected {}, received {}",
            callback.txnid, expected, callback.hash
        );
        return Ok(CallbackOutcome::Rejected { reason: "HashMismatch" });
    }

    let Some(read) = store.find_appointment_by_txn(&callback.txnid).await? else {
        log::error!("❌ PayU callback: no appointment for txn {}", callback.txnid);
        return Ok(CallbackOutcome::Rejected { reason: "AppointmentNotFound" });
    };
    let mut appointment = read.clone();

    let appointment_id = appointment.id.map(|id| id.to_hex()).unwrap_or_default();

    let next = match callback.status.as_str() {
        "success" => PaymentStatus::Paid,
        "failure" => PaymentStatus::Failed,
        other => {
            log::info!("ℹ️  PayU status '{}' for appointment {}, record unchanged", other, appointment_id);
            return Ok(CallbackOutcome::Other { status: other.to_string(), appointment_id });
        }
    };

    if next == PaymentStatus::Paid && appointment.payment_status == PaymentStatus::Paid {
        return Ok(CallbackOutcome::Paid { appointment_id });
    }
    if !appointment.payment_status.can_transition_to(next) {
        log::warn!(
            "⚠️  PayU callback would move appointment {} from {} to {}",
            appointment_id, appointment.payment_status, next
        );
        return Ok(CallbackOutcome::Rejected { reason: "InvalidPaymentState" });
    }

    appointment.payment_status = next;
    if next == PaymentStatus::Paid {
        appointment.payu_payment_id = callback.mihpayid.clone();
    }
    appointment.updated_at = chrono::Utc::now().timestamp_millis();
    if !store.save_appointment(&appointment, &read).await? {
        // Lost a race: only a duplicate success may still report success.
        let now_paid = store
            .find_appointment_by_txn(&callback.txnid)
            .await?
            .is_some_and(|a| a.payment_status == PaymentStatus::Paid);
        if next == PaymentStatus::Paid && now_paid {
            return Ok(CallbackOutcome::Paid { appointment_id });
        }
        log::warn!("⚠️  PayU callback for appointment {} lost a concurrent update", appointment_id);
        return Ok(CallbackOutcome::Rejected { reason: "InvalidPaymentState" });
    }

    log::info!("✅ Appointment {} payment status now {}", appointment_id, next);

    Ok(match next {
        PaymentStatus::Paid => CallbackOutcome::Paid { appointment_id },
        _ => CallbackOutcome::Failed { appointment_id },
    })
}
