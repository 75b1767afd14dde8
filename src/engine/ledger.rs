//! Ledger: the two simulated balances.
//!
//! Balances are finite and non-negative at all times. Only the swap
//! engine and the explicit `set` operation mutate them.

use tracing::info;

use crate::types::{Asset, Balances, EngineError};

#[derive(Debug, Clone)]
pub struct Ledger {
    balances: Balances,
}

fn check_amount(asset: Asset, value: f64) -> Result<f64, EngineError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(EngineError::Validation(format!(
            "Invalid {asset} balance: must be a non-negative number"
        )))
    }
}

impl Ledger {
    pub fn new(sui: f64, usdc: f64) -> Result<Self, EngineError> {
        Ok(Self {
            balances: Balances::new(check_amount(Asset::Sui, sui)?, check_amount(Asset::Usdc, usdc)?),
        })
    }

    pub fn balances(&self) -> Balances {
        self.balances
    }

    pub fn balance(&self, asset: Asset) -> f64 {
        self.balances.get(asset)
    }

    /// Overwrite either or both balances. Both values are validated before
    /// anything is written, so a bad value leaves the ledger untouched.
    pub fn set(&mut self, sui: Option<f64>, usdc: Option<f64>) -> Result<Balances, EngineError> {
        let sui = sui.map(|v| check_amount(Asset::Sui, v)).transpose()?;
        let usdc = usdc.map(|v| check_amount(Asset::Usdc, v)).transpose()?;

        if let Some(sui) = sui {
            self.balances.sui = sui;
        }
        if let Some(usdc) = usdc {
            self.balances.usdc = usdc;
        }

        info!(sui = self.balances.sui, usdc = self.balances.usdc, "Balances updated");
        Ok(self.balances)
    }

    /// Debit `amount_in` of `from` and credit `amount_out` of `to`.
    ///
    /// Caller has already checked `amount_in <= balance(from)`.
    pub(crate) fn transfer(&mut self, from: Asset, amount_in: f64, to: Asset, amount_out: f64) {
        *self.slot(from) -= amount_in;
        *self.slot(to) += amount_out;
    }

    fn slot(&mut self, asset: Asset) -> &mut f64 {
        match asset {
            Asset::Sui => &mut self.balances.sui,
            Asset::Usdc => &mut self.balances.usdc,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_negative() {
        assert!(Ledger::new(-1.0, 0.0).is_err());
        assert!(Ledger::new(0.0, f64::INFINITY).is_err());
        let ledger = Ledger::new(100.0, 0.0).unwrap();
        assert_eq!(ledger.balances(), Balances::new(100.0, 0.0));
    }

    #[test]
    fn test_set_partial() {
        let mut ledger = Ledger::new(1.0, 2.0).unwrap();
        let after = ledger.set(None, Some(50.0)).unwrap();
        assert_eq!(after, Balances::new(1.0, 50.0));
    }

    #[test]
    fn test_set_is_all_or_nothing() {
        let mut ledger = Ledger::new(1.0, 2.0).unwrap();
        let err = ledger.set(Some(10.0), Some(f64::NAN)).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert_eq!(ledger.balances(), Balances::new(1.0, 2.0));
    }

    #[test]
    fn test_transfer() {
        let mut ledger = Ledger::new(10.0, 0.0).unwrap();
        ledger.transfer(Asset::Sui, 4.0, Asset::Usdc, 8.0);
        assert_eq!(ledger.balance(Asset::Sui), 6.0);
        assert_eq!(ledger.balance(Asset::Usdc), 8.0);
    }
}
