use hmac::{Hmac, Mac};
use sha2::Sha256;
use time::OffsetDateTime;

use super::dto::{Plan, VerifyPaymentRequest};
use crate::error::{AppError, AppResult};

type HmacSha256 = Hmac<Sha256>;

/// Checks `hex(HMAC-SHA256(secret, "<order_id>|<payment_id>"))` in constant time.
pub fn verify_signature(secret: &str, order_id: &str, payment_id: &str, signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(order_id.as_bytes());
    mac.update(b"|");
    mac.update(payment_id.as_bytes());
    mac.verify_slice(&expected).is_ok()
}

/// Renewals stack on top of time still left on the current subscription.
pub fn next_expiry(now: OffsetDateTime, current: Option<OffsetDateTime>, plan: Plan) -> OffsetDateTime {
    let base = match current {
        Some(exp) if exp > now => exp,
        _ => now,
    };
    base + plan.duration()
}

pub fn check_verify_request(req: &VerifyPaymentRequest) -> AppResult<()> {
    if req.razorpay_order_id.trim().is_empty()
        || req.razorpay_payment_id.trim().is_empty()
        || req.razorpay_signature.trim().is_empty()
    {
        return Err(AppError::bad_request(
            "razorpay_order_id, razorpay_payment_id and razorpay_signature are required",
        ));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) fn sign(secret: &str, order_id: &str, payment_id: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(format!("{order_id}|{payment_id}").as_bytes());
    hex::encode(mac.finalize().into_bytes())
}
