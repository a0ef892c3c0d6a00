//! Implements `Provider` against the payment provider's REST API.
//!
//! Requests and responses use the `{"data": {"attributes": {...}}}` envelope. Amounts are integer
//! minor units. Every request authenticates with HTTP Basic auth using the secret key as the user
//! name and an empty password. Payouts carry their `{transfer_id}:{position}` reference as an
//! `Idempotency-Key` header.

use crate::config::PaymentsConfig;
use crate::error::Res;
use crate::model::Amount;
use crate::payments::{Payout, Provider, Recipient, Source, SourceKind};
use anyhow::{bail, Context};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::trace;
use url::Url;

/// The header carrying a payout's reference. A resumed transfer can repeat a payout whose id was
/// never stored; the provider deduplicates on this key.
const IDEMPOTENCY_KEY: &str = "Idempotency-Key";

pub(crate) struct HttpProvider {
    client: reqwest::Client,
    base_url: Url,
    secret_key: String,
    currency: String,
    success_url: String,
    failed_url: String,
}

impl std::fmt::Debug for HttpProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProvider")
            .field("base_url", &self.base_url.as_str())
            .field("currency", &self.currency)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Resource<T>,
}

#[derive(Debug, Deserialize)]
struct Resource<T> {
    id: String,
    attributes: T,
}

#[derive(Debug, Deserialize)]
struct SourceAttributes {
    #[serde(default)]
    status: String,
    redirect: Redirect,
}

#[derive(Debug, Deserialize)]
struct Redirect {
    checkout_url: String,
}

#[derive(Debug, Deserialize)]
struct PayoutAttributes {
    #[serde(default)]
    status: String,
}

impl HttpProvider {
    pub(crate) fn new(settings: &PaymentsConfig, secret_key: &str, currency: &str) -> Res<Self> {
        let base_url = Url::parse(&settings.base_url)
            .with_context(|| format!("Invalid payments base_url '{}'", settings.base_url))?;
        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
            secret_key: secret_key.to_string(),
            currency: currency.to_string(),
            success_url: settings.success_url.clone(),
            failed_url: settings.failed_url.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> Res<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("Unable to build the URL for {path}"))
    }

    /// Builds an authenticated POST. `idempotency_key` is sent as the `Idempotency-Key` header so
    /// that the provider answers a repeated request with the original result.
    fn request(
        &self,
        path: &str,
        body: &Value,
        idempotency_key: Option<&str>,
    ) -> Res<reqwest::RequestBuilder> {
        let url = self.endpoint(path)?;
        trace!("POST {url}");
        let builder = self
            .client
            .post(url)
            .basic_auth(&self.secret_key, Some(""))
            .json(body);
        Ok(match idempotency_key {
            Some(key) => builder.header(IDEMPOTENCY_KEY, key),
            None => builder,
        })
    }

    async fn post<T>(
        &self,
        path: &str,
        body: Value,
        idempotency_key: Option<&str>,
    ) -> Res<Envelope<T>>
    where
        T: DeserializeOwned,
    {
        let response = self
            .request(path, &body, idempotency_key)?
            .send()
            .await
            .with_context(|| format!("Failed to send request to {path}"))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read response body".to_string());
            bail!("Payment provider request to {path} failed with status {status}: {body}");
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse the payment provider response from {path}"))
    }
}

fn minor_units(amount: Amount) -> Res<i64> {
    if !amount.is_positive() {
        bail!("Payment amounts must be greater than zero, got {amount}");
    }
    amount
        .minor_units()
        .with_context(|| format!("Amount {amount} is too large to send"))
}

fn source_body(
    amount: i64,
    currency: &str,
    kind: SourceKind,
    description: &str,
    success_url: &str,
    failed_url: &str,
) -> Value {
    json!({
        "data": {
            "attributes": {
                "amount": amount,
                "currency": currency,
                "type": kind.to_string(),
                "description": description,
                "redirect": {
                    "success": success_url,
                    "failed": failed_url,
                }
            }
        }
    })
}

fn recipient_body(name: &str, account_number: &str, channel: &str) -> Value {
    json!({
        "data": {
            "attributes": {
                "name": name,
                "account_number": account_number,
                "channel": channel,
            }
        }
    })
}

fn payout_body(recipient_id: &str, amount: i64, currency: &str, reference: &str) -> Value {
    json!({
        "data": {
            "attributes": {
                "recipient_id": recipient_id,
                "amount": amount,
                "currency": currency,
                "reference": reference,
            }
        }
    })
}

#[async_trait::async_trait]
impl Provider for HttpProvider {
    async fn create_source(
        &self,
        amount: Amount,
        kind: SourceKind,
        description: &str,
    ) -> Res<Source> {
        let body = source_body(
            minor_units(amount)?,
            &self.currency,
            kind,
            description,
            &self.success_url,
            &self.failed_url,
        );
        let response: Envelope<SourceAttributes> = self.post("v1/sources", body, None).await?;
        Ok(Source {
            id: response.data.id,
            checkout_url: response.data.attributes.redirect.checkout_url,
            amount,
            status: response.data.attributes.status,
        })
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
        let body = recipient_body(name, account_number, channel);
        let response: Envelope<Value> = self.post("v1/recipients", body, None).await?;
        Ok(Recipient {
            id: response.data.id,
            name: name.to_string(),
            account_number: account_number.to_string(),
            channel: channel.to_string(),
        })
    }

    async fn create_payout(
        &self,
        recipient_id: &str,
        amount: Amount,
        reference: &str,
    ) -> Res<Payout> {
        let body = payout_body(recipient_id, minor_units(amount)?, &self.currency, reference);
        let response: Envelope<PayoutAttributes> =
            self.post("v1/payouts", body, Some(reference)).await?;
        Ok(Payout {
            id: response.data.id,
            recipient_id: recipient_id.to_string(),
            amount,
            reference: reference.to_string(),
            status: response.data.attributes.status,
        })
    }
}
