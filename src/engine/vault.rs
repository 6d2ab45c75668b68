//! Vault payouts, bad debt realization and module account transfers.

use super::core::Engine;
use super::results::EngineError;
use crate::events::{EventPayload, TransferEvent};
use crate::keepers::{Bank, ModuleAccount, Oracle, PricingEngine};
use crate::types::{Address, Coin};
use rust_decimal::Decimal;

impl<V, O, B> Engine<V, O, B>
where
    V: PricingEngine + Clone,
    O: Oracle,
    B: Bank + Clone,
{
    /// Pays `amount` out of the vault. a shortfall is fronted by the ecosystem
    /// fund and booked as prepaid bad debt.
    pub fn withdraw(&mut self, denom: &str, receiver: &Address, amount: Decimal) -> Result<(), EngineError> {
        self.atomic(|engine| engine.withdraw_from_vault(denom, receiver, amount))
    }

    pub fn realize_bad_debt(&mut self, denom: &str, bad_debt: Decimal) -> Result<(), EngineError> {
        self.atomic(|engine| engine.settle_bad_debt(denom, bad_debt))
    }

    pub(super) fn withdraw_from_vault(
        &mut self,
        denom: &str,
        receiver: &Address,
        amount: Decimal,
    ) -> Result<(), EngineError> {
        if amount <= Decimal::ZERO {
            return Ok(());
        }

        let vault_balance = self.bank.module_balance(ModuleAccount::Vault, denom);
        if vault_balance < amount {
            let shortage = amount - vault_balance;
            tracing::warn!(
                denom,
                %shortage,
                %vault_balance,
                "vault short of funds, drawing on the ecosystem fund"
            );
            self.state.prepaid_bad_debt.increment(denom, shortage);
            self.transfer_between_modules(
                ModuleAccount::PerpEcosystemFund,
                ModuleAccount::Vault,
                Coin::new(denom, shortage),
            )?;
        }

        self.transfer_to_account(ModuleAccount::Vault, receiver, Coin::new(denom, amount))
    }

    // prepaid credit is consumed first so the fund never pays twice for one deficit
    pub(super) fn settle_bad_debt(&mut self, denom: &str, bad_debt: Decimal) -> Result<(), EngineError> {
        if bad_debt <= Decimal::ZERO {
            return Ok(());
        }

        let prepaid = self.state.prepaid_bad_debt.get(denom);
        if prepaid >= bad_debt {
            self.state.prepaid_bad_debt.decrement(denom, bad_debt);
            return Ok(());
        }

        self.state.prepaid_bad_debt.set(denom, Decimal::ZERO);
        let uncovered = bad_debt - prepaid;
        tracing::warn!(denom, %bad_debt, %uncovered, "realizing bad debt from the ecosystem fund");
        self.transfer_between_modules(
            ModuleAccount::PerpEcosystemFund,
            ModuleAccount::Vault,
            Coin::new(denom, uncovered),
        )
    }

    pub(super) fn transfer_to_module(
        &mut self,
        from: &Address,
        to: ModuleAccount,
        coin: Coin,
    ) -> Result<(), EngineError> {
        self.bank.send_from_account_to_module(from, to, &coin)?;
        self.emit_transfer(from.clone(), to.address(), coin);
        Ok(())
    }

    pub(super) fn transfer_between_modules(
        &mut self,
        from: ModuleAccount,
        to: ModuleAccount,
        coin: Coin,
    ) -> Result<(), EngineError> {
        self.bank.send_from_module_to_module(from, to, &coin)?;
        self.emit_transfer(from.address(), to.address(), coin);
        Ok(())
    }

    pub(super) fn transfer_to_account(
        &mut self,
        from: ModuleAccount,
        to: &Address,
        coin: Coin,
    ) -> Result<(), EngineError> {
        self.bank.send_from_module_to_account(from, to, &coin)?;
        self.emit_transfer(from.address(), to.clone(), coin);
        Ok(())
    }

    fn emit_transfer(&mut self, from: Address, to: Address, coin: Coin) {
        self.emit_event(EventPayload::Transfer(TransferEvent { from, to, coin }));
    }
}
