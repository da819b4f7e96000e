//! Payout Call Filtering
//!
//! Selects the transactions worth decoding: payout calls, optionally restricted to
//! one destination contract.

use crate::client::{Transaction, TransactionWrapper};

/// Input-type discriminant of a batch payout invocation
pub const PAYOUT_INPUT_TYPE: i64 = 1;

/// Destination and input-type filter applied before decoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionFilter {
    contract_id: Option<String>,
    input_type: i64,
}

impl TransactionFilter {
    /// Filter payout calls sent to `contract_id`, or to any destination when `None`
    pub fn new(contract_id: Option<String>) -> Self {
        Self {
            contract_id,
            input_type: PAYOUT_INPUT_TYPE,
        }
    }

    /// Filter payout calls regardless of destination
    pub fn any_destination() -> Self {
        Self::new(None)
    }

    /// Check the destination against the configured contract
    pub fn matches_destination(&self, tx: &Transaction) -> bool {
        match &self.contract_id {
            Some(expected) => tx.dest_id.as_deref() == Some(expected.as_str()),
            None => true,
        }
    }

    /// Check that the transaction is a payout call
    pub fn is_payout_call(&self, tx: &Transaction) -> bool {
        tx.input_type == Some(self.input_type)
    }

    /// Return the input payload if the transaction passes both checks
    pub fn select<'a>(&self, tx: &'a Transaction) -> Option<&'a str> {
        if !self.matches_destination(tx) || !self.is_payout_call(tx) {
            return None;
        }
        tx.input_hex.as_deref()
    }

    /// Apply [`select`](Self::select) to a fetched wrapper
    pub fn filter_wrapper<'a>(&self, wrapper: &'a TransactionWrapper) -> Option<(&'a Transaction, &'a str)> {
        let tx = wrapper.transaction.as_ref()?;
        self.select(tx).map(|payload| (tx, payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTRACT: &str = "EAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAVWRF";

    fn payout_tx(dest: &str) -> Transaction {
        Transaction {
            dest_id: Some(dest.to_string()),
            input_type: Some(PAYOUT_INPUT_TYPE),
            input_hex: Some("00".repeat(40)),
            tx_id: Some("tx".to_string()),
            ..Default::default()
        }
    }

    // ==================== destination tests ====================

    #[test]
    fn test_filter_accepts_contract_destination() {
        let filter = TransactionFilter::new(Some(CONTRACT.to_string()));
        assert!(filter.select(&payout_tx(CONTRACT)).is_some());
    }

    #[test]
    fn test_filter_rejects_other_destination() {
        let filter = TransactionFilter::new(Some(CONTRACT.to_string()));
        assert!(filter.select(&payout_tx("BAAAAAAAAAAAAAAAAAAAAAAAAAAA")).is_none());
    }

    #[test]
    fn test_filter_rejects_missing_destination() {
        let filter = TransactionFilter::new(Some(CONTRACT.to_string()));
        let tx = Transaction {
            dest_id: None,
            ..payout_tx(CONTRACT)
        };
        assert!(!filter.matches_destination(&tx));
    }

    #[test]
    fn test_unfiltered_accepts_any_destination() {
        let filter = TransactionFilter::any_destination();
        assert!(filter.select(&payout_tx("ANYTHING")).is_some());
    }

    // ==================== input type tests ====================

    #[test]
    fn test_filter_rejects_other_input_type() {
        let filter = TransactionFilter::any_destination();
        for input_type in [0, 2, 8, -1] {
            let tx = Transaction {
                input_type: Some(input_type),
                ..payout_tx(CONTRACT)
            };
            assert!(filter.select(&tx).is_none(), "input type {} should be filtered", input_type);
        }
    }

    #[test]
    fn test_filter_rejects_missing_input_type() {
        let filter = TransactionFilter::any_destination();
        let tx = Transaction {
            input_type: None,
            ..payout_tx(CONTRACT)
        };
        assert!(!filter.is_payout_call(&tx));
    }

    #[test]
    fn test_filter_requires_payload() {
        let filter = TransactionFilter::any_destination();
        let tx = Transaction {
            input_hex: None,
            ..payout_tx(CONTRACT)
        };
        assert!(filter.select(&tx).is_none());
    }

    // ==================== wrapper tests ====================

    #[test]
    fn test_filter_wrapper_without_transaction() {
        let filter = TransactionFilter::any_destination();
        assert!(filter.filter_wrapper(&TransactionWrapper::default()).is_none());
    }

    #[test]
    fn test_filter_wrapper_returns_payload() {
        let filter = TransactionFilter::new(Some(CONTRACT.to_string()));
        let wrapper = TransactionWrapper {
            transaction: Some(payout_tx(CONTRACT)),
            ..Default::default()
        };
        let (tx, payload) = filter.filter_wrapper(&wrapper).unwrap();
        assert_eq!(tx.tx_id.as_deref(), Some("tx"));
        assert_eq!(payload.len(), 80);
    }
}
