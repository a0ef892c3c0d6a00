//! An in-memory `Provider` with deterministic ids.

use crate::error::Res;
use crate::model::Amount;
use crate::payments::{Payout, Provider, Recipient, Source, SourceKind};
use anyhow::{bail, Context};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Default)]
struct State {
    next: u64,
    recipients: HashMap<String, Recipient>,
    payouts: Vec<Payout>,
    sources: Vec<Source>,
}

/// Records every call so tests can look at what would have been sent.
#[derive(Debug)]
pub(crate) struct TestProvider {
    currency: String,
    state: Mutex<State>,
}

impl TestProvider {
    pub(crate) fn new(currency: &str) -> Self {
        Self {
            currency: currency.to_string(),
            state: Mutex::new(State::default()),
        }
    }

    #[cfg(test)]
    pub(crate) fn payouts(&self) -> Vec<Payout> {
        self.state
            .lock()
            .map(|s| s.payouts.clone())
            .unwrap_or_default()
    }

    fn next_id(state: &mut State, prefix: &str) -> String {
        state.next += 1;
        format!("{prefix}_test_{:04}", state.next)
    }

    fn lock(&self) -> Res<std::sync::MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| anyhow::anyhow!("The test payment provider state is poisoned"))
    }
}

#[async_trait::async_trait]
impl Provider for TestProvider {
    async fn create_source(
        &self,
        amount: Amount,
        kind: SourceKind,
        _description: &str,
    ) -> Res<Source> {
        if !amount.is_positive() {
            bail!("A checkout amount must be greater than zero");
        }
        let mut state = self.lock()?;
        let id = Self::next_id(&mut state, "src");
        let source = Source {
            checkout_url: format!(
                "https://payments.test/checkout/{id}?method={kind}&currency={}",
                self.currency
            ),
            id,
            amount,
            status: "pending".to_string(),
        };
        state.sources.push(source.clone());
        Ok(source)
    }

    async fn create_recipient(
        &self,
        name: &str,
        account_number: &str,
        channel: &str,
    ) -> Res<Recipient> {
        if account_number.trim().is_empty() {
            bail!("Recipient '{name}' has no account number");
        }
        let mut state = self.lock()?;
        let id = Self::next_id(&mut state, "rcp");
        let recipient = Recipient {
            id: id.clone(),
            name: name.to_string(),
            account_number: account_number.to_string(),
            channel: channel.to_string(),
        };
        state.recipients.insert(id, recipient.clone());
        Ok(recipient)
    }

    async fn create_payout(
        &self,
        recipient_id: &str,
        amount: Amount,
        reference: &str,
    ) -> Res<Payout> {
        let mut state = self.lock()?;
        state
            .recipients
            .get(recipient_id)
            .with_context(|| format!("Unknown recipient '{recipient_id}'"))?;
        if let Some(existing) = state.payouts.iter().find(|p| p.reference == reference) {
            return Ok(existing.clone());
        }
        let id = Self::next_id(&mut state, "po");
        let payout = Payout {
            id,
            recipient_id: recipient_id.to_string(),
            amount,
            reference: reference.to_string(),
            status: "paid".to_string(),
        };
        state.payouts.push(payout.clone());
        Ok(payout)
    }
}
