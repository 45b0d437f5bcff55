//! Wire types exchanged with the payment gateway.
//!
//! The gateway speaks plain JSON over HTTP:
//!
//! - `POST /payments` takes a [`PaymentRequest`] body and answers `204 No Content` on success.
//! - `GET /payments` answers `200 OK` with an array of [`PaymentRecord`].

use http::StatusCode;
use serde::{Deserialize, Serialize};

/// Body of a `POST /payments` request.
///
/// Built once per billable transaction and reused verbatim by every retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    /// Amount in integer currency units.
    pub amount: u64,
}

impl PaymentRequest {
    pub fn new(amount: u64) -> Self {
        Self { amount }
    }
}

/// One entry of the gateway's own payment ledger, as returned by `GET /payments`.
///
/// Read-only from our side; the gateway is authoritative. Missing fields decode to their
/// zero values, since reconciliation only counts records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub status: String,
}

/// What the gateway told us about a `POST /payments`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreatePaymentOutcome {
    /// The gateway answered `204 No Content`, its only unambiguous success signal.
    Accepted,
    /// Any other status. The payment may or may not have been recorded.
    Ambiguous { status: StatusCode },
}

impl CreatePaymentOutcome {
    pub fn from_status(status: StatusCode) -> Self {
        if status == StatusCode::NO_CONTENT {
            CreatePaymentOutcome::Accepted
        } else {
            CreatePaymentOutcome::Ambiguous { status }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_request_serializes_amount_only() {
        let body = serde_json::to_string(&PaymentRequest::new(600)).unwrap();
        assert_eq!(body, r#"{"amount":600}"#);
    }

    #[test]
    fn test_payment_records_deserialize_from_ledger_array() {
        let json = r#"[{"amount":500,"status":"success"},{"amount":600,"status":"failed"}]"#;
        let records: Vec<PaymentRecord> = serde_json::from_str(json).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].amount, 600);
        assert_eq!(records[1].status, "failed");
    }

    #[test]
    fn test_payment_record_fields_default_when_missing() {
        let records: Vec<PaymentRecord> =
            serde_json::from_str(r#"[{"amount":500},{"status":"success"},{}]"#).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].amount, 500);
        assert_eq!(records[0].status, "");
        assert_eq!(records[1].amount, 0);
        assert_eq!(records[2], PaymentRecord::default());
    }

    #[test]
    fn test_payment_record_rejects_wrong_types() {
        let result: Result<PaymentRecord, _> = serde_json::from_str(r#"{"amount":"lots"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_only_no_content_is_accepted() {
        assert_eq!(
            CreatePaymentOutcome::from_status(StatusCode::NO_CONTENT),
            CreatePaymentOutcome::Accepted
        );
        for status in [StatusCode::OK, StatusCode::CREATED, StatusCode::INTERNAL_SERVER_ERROR] {
            assert_eq!(
                CreatePaymentOutcome::from_status(status),
                CreatePaymentOutcome::Ambiguous { status }
            );
        }
    }
}
