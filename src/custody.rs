// 9.2 custody.rs: MOCKED. in-memory bank ledger, balances keyed by (address, denom).
// no real chain accounts, minting only exists for tests and the simulator.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::keepers::{Bank, BankError, ModuleAccount};
use crate::types::{Address, Coin};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ledger {
    balances: BTreeMap<(Address, String), Decimal>,
    // Total minted per denom, never changed by transfers
    supply: BTreeMap<String, Decimal>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mint(&mut self, address: &Address, denom: &str, amount: Decimal) {
        if amount <= Decimal::ZERO {
            return;
        }
        *self.balances.entry((address.clone(), denom.to_string())).or_insert(Decimal::ZERO) += amount;
        *self.supply.entry(denom.to_string()).or_insert(Decimal::ZERO) += amount;
    }

    pub fn mint_module(&mut self, module: ModuleAccount, denom: &str, amount: Decimal) {
        self.mint(&module.address(), denom, amount);
    }

    pub fn total_supply(&self, denom: &str) -> Decimal {
        self.supply.get(denom).copied().unwrap_or(Decimal::ZERO)
    }

    /// Sum of every balance in `denom`. equals total_supply unless a transfer leaked.
    pub fn total_balances(&self, denom: &str) -> Decimal {
        self.balances
            .iter()
            .filter(|((_, d), _)| d == denom)
            .map(|(_, amount)| *amount)
            .sum()
    }

    fn transfer(&mut self, from: &Address, to: &Address, coin: &Coin) -> Result<(), BankError> {
        if !coin.is_positive() || !coin.amount.fract().is_zero() {
            return Err(BankError::InvalidAmount(coin.amount));
        }

        let available = self.balance(from, &coin.denom);
        if available < coin.amount {
            return Err(BankError::InsufficientFunds {
                address: from.clone(),
                denom: coin.denom.clone(),
                requested: coin.amount,
                available,
            });
        }

        self.balances
            .insert((from.clone(), coin.denom.clone()), available - coin.amount);
        *self
            .balances
            .entry((to.clone(), coin.denom.clone()))
            .or_insert(Decimal::ZERO) += coin.amount;
        Ok(())
    }
}

impl Bank for Ledger {
    fn balance(&self, address: &Address, denom: &str) -> Decimal {
        self.balances
            .get(&(address.clone(), denom.to_string()))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    fn send_from_account_to_module(
        &mut self,
        from: &Address,
        to: ModuleAccount,
        coin: &Coin,
    ) -> Result<(), BankError> {
        self.transfer(from, &to.address(), coin)
    }

    fn send_from_module_to_module(
        &mut self,
        from: ModuleAccount,
        to: ModuleAccount,
        coin: &Coin,
    ) -> Result<(), BankError> {
        self.transfer(&from.address(), &to.address(), coin)
    }

    fn send_from_module_to_account(
        &mut self,
        from: ModuleAccount,
        to: &Address,
        coin: &Coin,
    ) -> Result<(), BankError> {
        self.transfer(&from.address(), to, coin)
    }
}
