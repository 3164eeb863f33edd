use std::time::Duration;

use alloy::primitives::B256;
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use teleport_core::{DomainQueryPort, PortError, Receipt, ReceiptStatus};

/// Receipt lookups over a domain's JSON-RPC endpoint.
#[derive(Debug, Clone)]
pub struct JsonRpcDomainQuery {
    base_url: String,
    client: reqwest::Client,
}

impl JsonRpcDomainQuery {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, PortError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PortError::Transport(format!("rpc client init failed: {e}")))?;
        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, PortError> {
        let payload = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let response = self
            .client
            .post(&self.base_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| PortError::Transport(format!("rpc request failed: {e}")))?;
        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| PortError::Transport(format!("rpc json decode failed: {e}")))?;
        if !status.is_success() {
            return Err(PortError::Transport(format!("rpc status {status}: {body}")));
        }
        if let Some(err) = body.get("error") {
            return Err(PortError::Transport(format!("rpc returned error: {err}")));
        }
        body.get("result")
            .cloned()
            .ok_or_else(|| PortError::Transport("rpc response missing result".to_owned()))
    }
}

#[async_trait]
impl DomainQueryPort for JsonRpcDomainQuery {
    async fn get_receipt(&self, tx_hash: B256) -> Result<Option<Receipt>, PortError> {
        let result = self
            .call("eth_getTransactionReceipt", serde_json::json!([tx_hash]))
            .await?;
        if result.is_null() {
            debug!(%tx_hash, url = %self.base_url, "receipt not available");
            return Ok(None);
        }
        parse_receipt(tx_hash, &result).map(Some)
    }
}

fn parse_receipt(tx_hash: B256, value: &Value) -> Result<Receipt, PortError> {
    let status = match value.get("status").and_then(Value::as_str) {
        Some("0x1") => ReceiptStatus::Success,
        Some("0x0") => ReceiptStatus::Failure,
        Some(other) => {
            return Err(PortError::Validation(format!(
                "unknown receipt status {other}"
            )))
        }
        None => return Err(PortError::Validation("receipt missing status".to_owned())),
    };
    let block_number = value
        .get("blockNumber")
        .and_then(Value::as_str)
        .map(parse_quantity)
        .transpose()?;
    Ok(Receipt {
        tx_hash,
        status,
        block_number,
    })
}

fn parse_quantity(raw: &str) -> Result<u64, PortError> {
    u64::from_str_radix(raw.trim_start_matches("0x"), 16)
        .map_err(|e| PortError::Validation(format!("invalid quantity {raw}: {e}")))
}
