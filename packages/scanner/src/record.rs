//! Match Records
//!
//! The persisted form of a payout that carried the target amount, plus the explorer
//! link and console formatting that go with it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decoder::DecodedPayout;

/// A matching payout, as stored in the results file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchRecord {
    pub tick: u64,
    #[serde(rename = "txId")]
    pub tx_id: Option<String>,
    pub pubkey_hex: String,
    pub amount: u64,
    pub explorer_url: String,
    /// ISO-8601 UTC discovery time
    pub found_at: String,
    /// Position of the transaction in its tick's response
    #[serde(default)]
    pub tx_index: usize,
    /// Position of the payout in the decoded table
    #[serde(default)]
    pub payout_index: usize,
}

impl MatchRecord {
    /// Build a record for `payout`, stamped with the current time
    pub fn new(
        tick: u64,
        tx_id: Option<&str>,
        tx_index: usize,
        payout_index: usize,
        payout: &DecodedPayout,
        explorer_base: &str,
    ) -> Self {
        Self::with_timestamp(tick, tx_id, tx_index, payout_index, payout, explorer_base, Utc::now())
    }

    /// Build a record with an explicit discovery time
    pub fn with_timestamp(
        tick: u64,
        tx_id: Option<&str>,
        tx_index: usize,
        payout_index: usize,
        payout: &DecodedPayout,
        explorer_base: &str,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            tick,
            tx_id: tx_id.map(str::to_string),
            pubkey_hex: payout.recipient_hex(),
            amount: payout.amount,
            explorer_url: explorer_url(explorer_base, tx_id),
            found_at: format_timestamp(at),
            tx_index,
            payout_index,
        }
    }

    /// Identity of a match: the same payout entry seen again after a restart has the same key
    ///
    /// The transaction position only counts when there is no id to tell
    /// transactions of one tick apart.
    pub fn dedup_key(&self) -> (u64, Option<&str>, Option<usize>, usize, &str) {
        let tx_index = self.tx_id.is_none().then_some(self.tx_index);
        (
            self.tick,
            self.tx_id.as_deref(),
            tx_index,
            self.payout_index,
            self.pubkey_hex.as_str(),
        )
    }

    /// One-line summary printed when the match is found
    pub fn console_line(&self) -> String {
        format!(
            "{} | {} | {} | {} | {}",
            self.tick,
            self.tx_id.as_deref().unwrap_or("-"),
            self.pubkey_hex,
            group_thousands(self.amount),
            self.explorer_url
        )
    }
}

/// Explorer page of a transaction; empty when there is no id
pub fn explorer_url(explorer_base: &str, tx_id: Option<&str>) -> String {
    match tx_id {
        Some(id) if !id.is_empty() => format!("{}/network/tx/{}?type=latest", explorer_base, id),
        _ => String::new(),
    }
}

/// Format a UTC time as ISO-8601 with microseconds and a `Z` suffix
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// Render an integer with comma thousands separators
pub fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
