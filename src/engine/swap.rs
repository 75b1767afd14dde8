//! Swap engine: converts between SUI and USDC at the oracle price.
//!
//! Pure with respect to the ledger it is handed: the caller holds the
//! ledger lock for the whole check-debit-credit sequence.

use chrono::Utc;
use tracing::{debug, info};

use crate::engine::ledger::Ledger;
use crate::types::{mock_tx_hash, Asset, EngineError, SwapReceipt};

pub struct SwapEngine;

impl SwapEngine {
    /// Output amount for swapping `amount` of `from` into `to`.
    ///
    /// `price` is USDC per SUI: SUI→USDC multiplies, USDC→SUI divides.
    pub fn quote(from: Asset, to: Asset, amount: f64, price: f64) -> Result<f64, EngineError> {
        if from == to {
            return Err(EngineError::Validation("Cannot swap a coin for itself".to_string()));
        }
        if !(price.is_finite() && price > 0.0) {
            return Err(EngineError::Execution(format!("Unusable price {price}")));
        }
        Ok(match from {
            Asset::Sui => amount * price,
            Asset::Usdc => amount / price,
        })
    }

    /// Validate and apply a swap to `ledger`.
    ///
    /// `amount` of `None` swaps the whole `from` balance. On any error the
    /// ledger is unchanged.
    pub fn execute(
        ledger: &mut Ledger,
        from: Asset,
        to: Asset,
        amount: Option<f64>,
        price: f64,
    ) -> Result<SwapReceipt, EngineError> {
        if from == to {
            return Err(EngineError::Validation("Cannot swap a coin for itself".to_string()));
        }

        let available = ledger.balance(from);
        let amount_in = match amount {
            Some(a) if a.is_finite() && a >= 0.0 => a,
            Some(a) => {
                return Err(EngineError::Validation(format!(
                    "Invalid amount {a}: must be a non-negative number"
                )))
            }
            None => available,
        };

        if amount_in > available {
            return Err(EngineError::InsufficientBalance {
                asset: from,
                needed: amount_in,
                available,
            });
        }

        let amount_out = Self::quote(from, to, amount_in, price)?;
        if !(amount_out.is_finite() && (ledger.balance(to) + amount_out).is_finite()) {
            return Err(EngineError::Validation(format!(
                "Swap result exceeds the representable {to} balance"
            )));
        }
        ledger.transfer(from, amount_in, to, amount_out);

        let receipt = SwapReceipt {
            tx_hash: mock_tx_hash(),
            from,
            to,
            amount_in,
            amount_out,
            price,
            balances_after: ledger.balances(),
            timestamp: Utc::now(),
        };

        info!(
            action = %receipt.action(),
            amount_in = format!("{amount_in:.6} {from}"),
            amount_out = format!("{amount_out:.6} {to}"),
            price = format!("${price:.4}"),
            "Swap executed"
        );
        debug!(tx_hash = %receipt.tx_hash, balances = %receipt.balances_after, "Swap receipt");

        Ok(receipt)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
