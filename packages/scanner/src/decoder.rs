//! Payout Payload Decoder
//!
//! Recovers (recipient, amount) pairs from the input payload of a payout call.
//! The payload carries no length prefix or type tag, so the layout is guessed from
//! the tail: a run of little-endian u64 amounts, preceded by one 32-byte recipient
//! per amount.
//!
//! The result is a candidate, not a proof: unrelated payloads can happen to match
//! the same shape.

use thiserror::Error;
use tracing::trace;

/// Exclusive upper bound of a plausible transfer amount
pub const MAX_PLAUSIBLE_AMOUNT: u64 = 1_000_000_000_000;

/// Width of an encoded amount
pub const AMOUNT_SIZE: usize = 8;

/// Width of a recipient identifier
pub const RECIPIENT_SIZE: usize = 32;

/// Reasons a payload yields no payouts
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Invalid hex payload: {0}")]
    InvalidHex(String),

    #[error("No plausible amounts at the end of the payload")]
    NoAmounts,

    #[error("Recipient block too short: need {needed} bytes, have {available}")]
    RecipientsTruncated { needed: usize, available: usize },
}

/// A recipient identifier paired with the amount it is paid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DecodedPayout {
    pub recipient: [u8; RECIPIENT_SIZE],
    pub amount: u64,
}

impl DecodedPayout {
    /// Lowercase hex of the recipient, without prefix
    pub fn recipient_hex(&self) -> String {
        hex::encode(self.recipient)
    }
}

/// Check whether a value can be a transfer amount
pub fn is_plausible_amount(value: u64) -> bool {
    value > 0 && value < MAX_PLAUSIBLE_AMOUNT
}

/// Parse a hex string to bytes (with or without 0x prefix)
pub fn hex_to_bytes(hex_str: &str) -> Result<Vec<u8>, DecodeError> {
    let hex_str = hex_str.strip_prefix("0x").unwrap_or(hex_str);
    hex::decode(hex_str).map_err(|e| DecodeError::InvalidHex(e.to_string()))
}

/// Scan backwards for the trailing run of plausible amounts
///
/// Returns the offset where the run starts and the amounts in payload order.
pub fn find_tail_amounts(raw: &[u8]) -> (usize, Vec<u64>) {
    let mut end = raw.len();
    let mut amounts = Vec::new();

    while end >= AMOUNT_SIZE {
        let mut chunk = [0u8; AMOUNT_SIZE];
        chunk.copy_from_slice(&raw[end - AMOUNT_SIZE..end]);
        let value = u64::from_le_bytes(chunk);
        if !is_plausible_amount(value) {
            break;
        }
        amounts.push(value);
        end -= AMOUNT_SIZE;
    }

    amounts.reverse();
    (end, amounts)
}

/// Decode a raw payload, reporting why nothing was found
pub fn try_decode_bytes(raw: &[u8]) -> Result<Vec<DecodedPayout>, DecodeError> {
    let (amounts_start, amounts) = find_tail_amounts(raw);
    if amounts.is_empty() {
        return Err(DecodeError::NoAmounts);
    }

    let needed = amounts.len() * RECIPIENT_SIZE;
    if amounts_start < needed {
        return Err(DecodeError::RecipientsTruncated {
            needed,
            available: amounts_start,
        });
    }

    let recipients = &raw[amounts_start - needed..amounts_start];
    let payouts = recipients
        .chunks_exact(RECIPIENT_SIZE)
        .zip(amounts)
        .map(|(chunk, amount)| {
            let mut recipient = [0u8; RECIPIENT_SIZE];
            recipient.copy_from_slice(chunk);
            DecodedPayout { recipient, amount }
        })
        .collect();

    Ok(payouts)
}

/// Decode a hex payload, reporting why nothing was found
pub fn try_decode_payouts(input_hex: &str) -> Result<Vec<DecodedPayout>, DecodeError> {
    let raw = hex_to_bytes(input_hex)?;
    try_decode_bytes(&raw)
}

/// Decode a hex payload into payouts; any anomaly yields an empty list
pub fn decode_payouts(input_hex: &str) -> Vec<DecodedPayout> {
    match try_decode_payouts(input_hex) {
        Ok(payouts) => payouts,
        Err(e) => {
            trace!("No payouts decoded: {}", e);
            Vec::new()
        }
    }
}
