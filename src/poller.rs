//! Confirmation polling
//!
//! Drives a chain's receipt lookup on its backoff schedule until a terminal
//! status is observed or the budget runs out. Never cancels anything:
//! `pending-timeout` only means "ask again later".

use crate::chain::ChainId;
use crate::wallets::{
    PollSchedule, Receipt, ReceiptCheck, ReceiptSource, TerminalStatus, WalletError,
};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct PollOutcome {
    pub status: TerminalStatus,
    pub receipt: Option<Receipt>,
    pub attempts: u32,
    pub elapsed: Duration,
}

/// Poll `handle` until it reaches a terminal status
pub async fn await_confirmation<S: ReceiptSource + ?Sized>(
    source: &S,
    chain: ChainId,
    rpc_url: &str,
    handle: &str,
) -> PollOutcome {
    let started = Instant::now();
    let schedule = source.schedule();
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        let check = check_once(source, chain, rpc_url, handle, attempts).await;

        if let ReceiptCheck::Final(receipt) = check {
            let outcome = PollOutcome {
                status: receipt.status,
                receipt: Some(receipt),
                attempts,
                elapsed: started.elapsed(),
            };
            info!(
                chain = %chain,
                tx = %handle,
                status = %outcome.status,
                attempts = attempts,
                "Transaction reached terminal status"
            );
            return outcome;
        }

        match next_delay(schedule, attempts, &check, started.elapsed()) {
            Some(delay) => tokio::time::sleep(delay).await,
            None => break,
        }
    }

    let elapsed = started.elapsed();
    warn!(
        chain = %chain,
        tx = %handle,
        attempts = attempts,
        elapsed_secs = elapsed.as_secs(),
        "Transaction not confirmed within poll budget"
    );
    PollOutcome {
        status: TerminalStatus::PendingTimeout,
        receipt: None,
        attempts,
        elapsed,
    }
}

async fn check_once<S: ReceiptSource + ?Sized>(
    source: &S,
    chain: ChainId,
    rpc_url: &str,
    handle: &str,
    attempt: u32,
) -> ReceiptCheck {
    match source.check_receipt(chain, rpc_url, handle).await {
        Ok(check) => {
            debug!(
                chain = %chain,
                tx = %handle,
                attempt = attempt,
                check = ?check,
                "Receipt checked"
            );
            check
        }
        Err(WalletError::RateLimited) => ReceiptCheck::RateLimited,
        Err(e) => {
            warn!(
                chain = %chain,
                tx = %handle,
                attempt = attempt,
                error = %e,
                "Receipt lookup failed"
            );
            ReceiptCheck::Pending
        }
    }
}

/// Delay before the next attempt, or `None` when the budget is spent.
/// There is no sleep after the final attempt.
fn next_delay(
    schedule: PollSchedule,
    attempt: u32,
    check: &ReceiptCheck,
    elapsed: Duration,
) -> Option<Duration> {
    match schedule {
        PollSchedule::Fixed { interval, timeout } => {
            (elapsed + interval <= timeout).then_some(interval)
        }
        PollSchedule::Exponential { base, max_attempts } => {
            let exponent = attempt.saturating_sub(1).min(31);
            (attempt < max_attempts).then(|| base.saturating_mul(1u32 << exponent))
        }
        PollSchedule::FixedWithRateLimit {
            interval,
            max_attempts,
        } => {
            if attempt >= max_attempts {
                return None;
            }
            match check {
                ReceiptCheck::RateLimited => Some(interval.saturating_mul(attempt)),
                _ => Some(interval),
            }
        }
    }
}
