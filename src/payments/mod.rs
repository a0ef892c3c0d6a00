//! The payment provider: online giving checkouts and payouts to destination accounts.
//!
//! `Provider` is implemented by `HttpProvider`, which talks to the provider's REST API, and by
//! `TestProvider`, which keeps everything in memory. `TestProvider` is compiled into the program so
//! that the whole app can run top-to-bottom without the real API when `LEDGER_IN_TEST_MODE` is
//! set.

mod http;
mod test_provider;

pub(crate) use http::HttpProvider;
pub(crate) use test_provider::TestProvider;

use crate::error::Res;
use crate::model::{AccountKind, Amount};
use crate::{utils, Config};
use anyhow::{bail, Context};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// The environment variable that switches the program to the in-memory payment provider.
pub const TEST_MODE_ENV: &str = "LEDGER_IN_TEST_MODE";

/// Whether payment calls go to the real provider or to the in-memory test provider.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    #[default]
    Live,
    Testing,
}

impl Mode {
    /// `Testing` when `LEDGER_IN_TEST_MODE` is set to a non-empty value, otherwise `Live`.
    pub fn from_env() -> Self {
        match std::env::var(TEST_MODE_ENV) {
            Ok(v) if !v.is_empty() => Mode::Testing,
            _ => Mode::Live,
        }
    }
}

/// The wallet a donor pays from in an online giving checkout.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    JsonSchema,
    clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    #[default]
    Gcash,
    GrabPay,
}

serde_plain::derive_display_from_serialize!(SourceKind);
serde_plain::derive_fromstr_from_deserialize!(SourceKind);

/// A checkout created for online giving. The donor completes it at `checkout_url`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    pub checkout_url: String,
    pub amount: Amount,
    pub status: String,
}

/// A payout destination registered with the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub id: String,
    pub name: String,
    pub account_number: String,
    pub channel: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    pub id: String,
    pub recipient_id: String,
    pub amount: Amount,
    pub reference: String,
    pub status: String,
}

/// The calls the ledger makes to a payment provider.
#[async_trait::async_trait]
pub(crate) trait Provider: Send + Sync {
    /// Creates a checkout for `amount`.
    async fn create_source(
        &self,
        amount: Amount,
        kind: SourceKind,
        description: &str,
    ) -> Res<Source>;

    /// Registers a payout destination.
    async fn create_recipient(
        &self,
        name: &str,
        account_number: &str,
        channel: &str,
    ) -> Res<Recipient>;

    /// Sends `amount` to a registered recipient. `reference` lets the provider reject duplicates.
    async fn create_payout(&self, recipient_id: &str, amount: Amount, reference: &str)
        -> Res<Payout>;
}

/// The payout channel used for a destination account.
pub(crate) fn channel(kind: AccountKind) -> &'static str {
    match kind {
        AccountKind::Bank => "bank",
        AccountKind::EWallet => "e_wallet",
        AccountKind::Cash => "cash",
    }
}

/// Builds the provider for `mode`. Live mode needs a `payments` section in `config.json` and a
/// secret key file.
pub(crate) async fn provider(config: &Config, mode: Mode) -> Res<Box<dyn Provider>> {
    match mode {
        Mode::Testing => {
            debug!("Using the in-memory payment provider");
            Ok(Box::new(TestProvider::new(config.currency())))
        }
        Mode::Live => {
            let Some(settings) = config.payments() else {
                bail!(
                    "The payment provider is not configured. Add a \"payments\" section to {}",
                    config.config_path().display()
                );
            };
            let key_path = config.payments_key_path();
            let key = utils::read(&key_path).await.with_context(|| {
                format!(
                    "Unable to read the payment provider secret key from {}",
                    key_path.display()
                )
            })?;
            let key = key.trim();
            if key.is_empty() {
                bail!("The secret key file {} is empty", key_path.display());
            }
            Ok(Box::new(HttpProvider::new(settings, key, config.currency())?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::TestEnv;

    #[test]
    fn test_source_kind_names() {
        assert_eq!(SourceKind::Gcash.to_string(), "gcash");
        assert_eq!(SourceKind::GrabPay.to_string(), "grab_pay");
        assert_eq!("grab_pay".parse::<SourceKind>().unwrap(), SourceKind::GrabPay);
    }

    #[tokio::test]
    async fn test_live_provider_requires_configuration() {
        let env = TestEnv::new().await;
        let err = match provider(&env.config(), Mode::Live).await {
            Ok(_) => panic!("expected an error"),
            Err(e) => e,
        };
        assert!(err.to_string().contains("not configured"), "{err}");
    }

    #[tokio::test]
    async fn test_testing_provider() {
        let env = TestEnv::new().await;
        let p = provider(&env.config(), Mode::Testing).await.unwrap();
        let r = p.create_recipient("North", "123", "bank").await.unwrap();
        assert_eq!(r.account_number, "123");
    }
}
