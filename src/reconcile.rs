//! Cardinality reconciliation between the caller's billable transactions and the
//! gateway's payment ledger.
//!
//! The gateway exposes no per-transaction identifiers, so the number of entries on
//! each side is the only signal compared. Amounts and statuses are not inspected.

use crate::error::PaymentError;

/// Compares `billable` local transactions against `recorded` gateway payments.
///
/// Equal counts mean the ambiguous `POST /payments` is taken to have landed.
pub fn reconcile<T, R>(billable: &[T], recorded: &[R]) -> Result<(), PaymentError> {
    if billable.len() == recorded.len() {
        Ok(())
    } else {
        Err(PaymentError::ReconciliationMismatch {
            expected: billable.len(),
            actual: recorded.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PaymentRecord;

    fn records(amounts: &[i64]) -> Vec<PaymentRecord> {
        amounts
            .iter()
            .map(|amount| PaymentRecord {
                amount: *amount,
                status: "success".to_string(),
            })
            .collect()
    }

    #[test]
    fn test_equal_counts_reconcile() {
        assert!(reconcile(&["r1", "r2", "r3"], &records(&[500, 600, 700])).is_ok());
    }

    #[test]
    fn test_empty_sides_reconcile() {
        let none: [&str; 0] = [];
        assert!(reconcile(&none, &records(&[])).is_ok());
    }

    #[test]
    fn test_amounts_are_not_compared() {
        assert!(reconcile(&["r1"], &records(&[1])).is_ok());
    }

    #[test]
    fn test_missing_payment_is_a_mismatch() {
        let err = reconcile(&["r1", "r2", "r3"], &records(&[500, 600])).unwrap_err();
        assert!(matches!(
            err,
            PaymentError::ReconciliationMismatch {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[test]
    fn test_extra_payment_is_a_mismatch() {
        let err = reconcile(&["r1"], &records(&[500, 600])).unwrap_err();
        assert!(matches!(
            err,
            PaymentError::ReconciliationMismatch {
                expected: 1,
                actual: 2
            }
        ));
    }
}
