//! Scan Driver
//!
//! Walks the configured tick range one tick at a time: fetch, filter, decode,
//! record matches, then checkpoint. A tick whose fetch keeps failing is skipped
//! so the scan never stalls; the checkpoint is written after every tick either way.

use tracing::{debug, info, warn};

use crate::client::{TickSource, TransactionWrapper};
use crate::config::ScanConfig;
use crate::decoder::decode_payouts;
use crate::filter::TransactionFilter;
use crate::record::{group_thousands, MatchRecord};
use crate::store::{MatchStore, OrRecover, ProgressStore, StoreError};

/// Counters of a finished scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Tick the scan resumed from
    pub first_tick: u64,
    pub ticks_scanned: u64,
    /// Ticks whose fetch failed after all retries
    pub ticks_skipped: u64,
    pub transactions_inspected: u64,
    /// Transactions that passed the destination and input-type filter
    pub payout_calls: u64,
    /// Decoded (recipient, amount) pairs
    pub candidate_payouts: u64,
    pub matches_recorded: u64,
    /// Matches already present in the results file
    pub duplicates_skipped: u64,
}

/// Sequential tick scanner
pub struct Scanner<S> {
    source: S,
    filter: TransactionFilter,
    progress: ProgressStore,
    matches: MatchStore,
    start_tick: u64,
    end_tick: u64,
    total_ticks: u64,
    target_amount: u64,
    explorer_base: String,
    progress_every: u64,
}

impl<S: TickSource> Scanner<S> {
    /// Create a scanner reading from `source` with the stores named in `config`
    pub fn new(source: S, config: &ScanConfig) -> Self {
        Self {
            source,
            filter: TransactionFilter::new(config.contract_id.clone()),
            progress: ProgressStore::new(&config.state_file, config.start_tick),
            matches: MatchStore::new(&config.results_file),
            start_tick: config.start_tick,
            end_tick: config.end_tick,
            total_ticks: config.total_ticks(),
            target_amount: config.target_amount,
            explorer_base: config.explorer_base.clone(),
            progress_every: config.progress_every,
        }
    }

    pub fn matches(&self) -> &MatchStore {
        &self.matches
    }

    /// Scan from the checkpoint to the end tick
    ///
    /// Only a failure to persist state aborts the scan.
    pub async fn run(&mut self) -> Result<ScanReport, StoreError> {
        let mut state = self.progress.load().await.or_recover();
        let mut tick = state.next_tick;
        let mut report = ScanReport {
            first_tick: tick,
            ..Default::default()
        };

        info!(
            "Scanning ticks {}..{} for amount {}",
            tick,
            self.end_tick,
            group_thousands(self.target_amount)
        );

        while tick <= self.end_tick {
            match self.source.tick_transactions(tick).await {
                Ok(wrappers) => self.process_tick(tick, &wrappers, &mut report).await?,
                Err(e) => {
                    warn!("Tick {}: {} (skipping)", tick, e);
                    report.ticks_skipped += 1;
                }
            }

            report.ticks_scanned += 1;
            let Some(next) = tick.checked_add(1) else {
                break;
            };
            tick = next;
            state.next_tick = tick;
            self.progress.save(&state).await?;
            self.log_progress(tick);
        }

        info!(
            "Done. {} ticks scanned ({} skipped), {} matches recorded in {}",
            report.ticks_scanned,
            report.ticks_skipped,
            report.matches_recorded,
            self.matches.path().display()
        );
        Ok(report)
    }

    /// Filter, decode and record the transactions of one tick
    pub async fn process_tick(
        &mut self,
        tick: u64,
        wrappers: &[TransactionWrapper],
        report: &mut ScanReport,
    ) -> Result<(), StoreError> {
        for (tx_index, wrapper) in wrappers.iter().enumerate() {
            report.transactions_inspected += 1;

            let Some((tx, payload)) = self.filter.filter_wrapper(wrapper) else {
                continue;
            };
            report.payout_calls += 1;

            let payouts = decode_payouts(payload);
            report.candidate_payouts += payouts.len() as u64;

            let tx_tick = tx.tick_number.unwrap_or(tick);
            for (payout_index, payout) in payouts.iter().enumerate() {
                if payout.amount != self.target_amount {
                    continue;
                }
                let record = MatchRecord::new(
                    tx_tick,
                    tx.identifier(),
                    tx_index,
                    payout_index,
                    payout,
                    &self.explorer_base,
                );
                if self.matches.append(&record).await? {
                    info!("Match: {}", record.console_line());
                    report.matches_recorded += 1;
                } else {
                    debug!("Duplicate match skipped: {}", record.console_line());
                    report.duplicates_skipped += 1;
                }
            }
        }
        Ok(())
    }

    fn log_progress(&self, next_tick: u64) {
        if self.progress_every == 0 {
            return;
        }
        let done = next_tick.saturating_sub(self.start_tick);
        if done % self.progress_every != 0 && next_tick <= self.end_tick {
            return;
        }
        let percent = done as f64 * 100.0 / self.total_ticks.max(1) as f64;
        info!("Progress: {}/{} ticks ({:.1}%)", done, self.total_ticks, percent);
    }
}
