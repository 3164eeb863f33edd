use std::fmt;

use alloy::primitives::aliases::{U48, U80};
use alloy::primitives::{keccak256, Address, Bytes, B256, U256};
use alloy::sol;
use alloy::sol_types::SolValue;
use serde::{Deserialize, Serialize};
use url::form_urlencoded;

use crate::error::GuidError;
use crate::ports::PortError;

/// ABI-encoded `TeleportGUID` is seven static 32-byte words.
pub const GUID_ENCODED_LEN: usize = 7 * 32;

sol! {
    struct TeleportGUID {
        bytes32 sourceDomain;
        bytes32 targetDomain;
        bytes32 receiver;
        bytes32 operator;
        uint128 amount;
        uint80 nonce;
        uint48 timestamp;
    }
}

/// Domain identifier: ASCII name right-padded with zero bytes to 32 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DomainId(pub B256);

impl DomainId {
    pub fn from_name(name: &str) -> Result<Self, GuidError> {
        let raw = name.as_bytes();
        if raw.len() > 32 {
            return Err(GuidError::DomainNameTooLong(name.to_owned()));
        }
        let mut word = [0u8; 32];
        word[..raw.len()].copy_from_slice(raw);
        Ok(Self(B256::from(word)))
    }

    pub fn name(&self) -> String {
        let bytes = self.0.as_slice();
        let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
        String::from_utf8_lossy(&bytes[..end]).into_owned()
    }
}

impl fmt::Display for DomainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainInfo {
    pub domain: DomainId,
    pub chain_id: u64,
    pub requires_initial_allocation: bool,
}

/// Canonical identifier of one transfer, emitted by the source-domain burn.
/// Field widths are those of the on-chain struct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "GuidFields", into = "GuidFields")]
pub struct TeleportGuid {
    source_domain: DomainId,
    target_domain: DomainId,
    receiver: B256,
    operator: B256,
    amount: u128,
    nonce: U80,
    timestamp: U48,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GuidFields {
    source_domain: DomainId,
    target_domain: DomainId,
    receiver: B256,
    operator: B256,
    amount: U256,
    nonce: U256,
    timestamp: U256,
}

impl TryFrom<GuidFields> for TeleportGuid {
    type Error = GuidError;

    fn try_from(f: GuidFields) -> Result<Self, Self::Error> {
        Self::new(
            f.source_domain,
            f.target_domain,
            f.receiver,
            f.operator,
            f.amount,
            f.nonce,
            f.timestamp,
        )
    }
}

impl From<TeleportGuid> for GuidFields {
    fn from(g: TeleportGuid) -> Self {
        Self {
            source_domain: g.source_domain,
            target_domain: g.target_domain,
            receiver: g.receiver,
            operator: g.operator,
            amount: g.amount(),
            nonce: g.nonce(),
            timestamp: g.timestamp(),
        }
    }
}

impl From<TeleportGUID> for TeleportGuid {
    fn from(raw: TeleportGUID) -> Self {
        Self {
            source_domain: DomainId(raw.sourceDomain),
            target_domain: DomainId(raw.targetDomain),
            receiver: raw.receiver,
            operator: raw.operator,
            amount: raw.amount,
            nonce: raw.nonce,
            timestamp: raw.timestamp,
        }
    }
}

impl TeleportGuid {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source_domain: DomainId,
        target_domain: DomainId,
        receiver: B256,
        operator: B256,
        amount: U256,
        nonce: U256,
        timestamp: U256,
    ) -> Result<Self, GuidError> {
        Ok(Self {
            source_domain,
            target_domain,
            receiver,
            operator,
            amount: u128::try_from(amount).map_err(|_| GuidError::FieldOverflow {
                field: "amount",
                bits: 128,
            })?,
            nonce: U80::checked_from_uint(nonce).ok_or(GuidError::FieldOverflow {
                field: "nonce",
                bits: 80,
            })?,
            timestamp: U48::checked_from_uint(timestamp).ok_or(GuidError::FieldOverflow {
                field: "timestamp",
                bits: 48,
            })?,
        })
    }

    fn to_sol(self) -> TeleportGUID {
        TeleportGUID {
            sourceDomain: self.source_domain.0,
            targetDomain: self.target_domain.0,
            receiver: self.receiver,
            operator: self.operator,
            amount: self.amount,
            nonce: self.nonce,
            timestamp: self.timestamp,
        }
    }

    pub fn abi_encode(&self) -> Bytes {
        Bytes::from(self.to_sol().abi_encode())
    }

    pub fn abi_decode(data: &[u8]) -> Result<Self, GuidError> {
        if data.len() != GUID_ENCODED_LEN {
            return Err(GuidError::InvalidLength {
                expected: GUID_ENCODED_LEN,
                actual: data.len(),
            });
        }
        <TeleportGUID as SolValue>::abi_decode(data, true)
            .map(Self::from)
            .map_err(|e| GuidError::Abi(e.to_string()))
    }

    /// Decodes the non-indexed data of a `TeleportInitialized(TeleportGUID)` log.
    pub fn from_event_data(data: &[u8]) -> Result<Self, GuidError> {
        Self::abi_decode(data)
    }

    pub fn hash(&self) -> B256 {
        keccak256(self.to_sol().abi_encode())
    }

    pub fn source_domain(&self) -> DomainId {
        self.source_domain
    }

    pub fn target_domain(&self) -> DomainId {
        self.target_domain
    }

    pub fn receiver(&self) -> B256 {
        self.receiver
    }

    pub fn receiver_address(&self) -> Address {
        Address::from_word(self.receiver)
    }

    pub fn operator(&self) -> B256 {
        self.operator
    }

    pub fn amount(&self) -> U256 {
        U256::from(self.amount)
    }

    pub fn nonce(&self) -> U256 {
        U256::from(self.nonce)
    }

    pub fn timestamp(&self) -> U256 {
        U256::from(self.timestamp)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OracleSignature {
    pub signer: Address,
    pub signature: Bytes,
}

/// Oracle signatures collected for one burn. Append-only, one entry per signer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationSet {
    signatures: Vec<OracleSignature>,
    threshold: usize,
}

impl AttestationSet {
    pub fn new(threshold: usize) -> Self {
        Self {
            signatures: Vec::new(),
            threshold,
        }
    }

    /// Returns `false` when the signer already contributed a signature.
    pub fn insert(&mut self, signature: OracleSignature) -> bool {
        if self.signatures.iter().any(|s| s.signer == signature.signer) {
            return false;
        }
        self.signatures.push(signature);
        true
    }

    pub fn set_threshold(&mut self, threshold: usize) {
        self.threshold = threshold;
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    pub fn is_attestable(&self) -> bool {
        self.threshold > 0 && self.signatures.len() >= self.threshold
    }

    pub fn signatures(&self) -> &[OracleSignature] {
        &self.signatures
    }

    /// Concatenated signatures ordered by ascending signer, as the oracle auth
    /// contract expects them.
    pub fn combined_signatures(&self) -> Bytes {
        let mut ordered: Vec<&OracleSignature> = self.signatures.iter().collect();
        ordered.sort_by_key(|s| s.signer);
        let mut out = Vec::with_capacity(ordered.len() * 65);
        for sig in ordered {
            out.extend_from_slice(&sig.signature);
        }
        Bytes::from(out)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleSnapshot {
    pub signatures: Vec<OracleSignature>,
    pub threshold: usize,
    pub guid: Option<TeleportGuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttestationProgress {
    pub count: usize,
    pub threshold: usize,
    pub guid: Option<TeleportGuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceiptStatus {
    Success,
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub tx_hash: B256,
    pub status: ReceiptStatus,
    pub block_number: Option<u64>,
}

impl Receipt {
    pub fn success(tx_hash: B256) -> Self {
        Self {
            tx_hash,
            status: ReceiptStatus::Success,
            block_number: None,
        }
    }

    pub fn failure(tx_hash: B256) -> Self {
        Self {
            tx_hash,
            status: ReceiptStatus::Failure,
            block_number: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelayTaskState {
    Pending,
    Executing,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayTask {
    pub task_id: String,
    pub state: RelayTaskState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayTaskOutcome {
    Minted { tx_hash: B256 },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayPayload {
    pub guid: TeleportGuid,
    pub signatures: Bytes,
    pub max_fee_percentage: U256,
    pub gas_fee: U256,
    pub expiry: U256,
}

impl RelayPayload {
    pub fn payload_hash(&self) -> B256 {
        keccak256(
            (
                self.guid.hash(),
                self.max_fee_percentage,
                self.gas_fee,
                self.expiry,
            )
                .abi_encode(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedRelayPayload {
    pub payload: RelayPayload,
    pub payload_hash: B256,
    pub r: B256,
    pub s: B256,
    pub v: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletSession {
    pub account: Address,
    pub chain_id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub amount: U256,
    pub receiver: Address,
    pub operator: Address,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BurnRequest {
    pub source: DomainInfo,
    pub target: DomainInfo,
    pub receiver: Address,
    pub operator: Address,
    pub amount: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectMintRequest {
    pub destination: DomainInfo,
    pub guid: TeleportGuid,
    pub signatures: Bytes,
    pub max_fee_percentage: U256,
    pub operator_fee: U256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MintPath {
    Relay,
    Direct,
}

/// Externally carried state that is enough to resume a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeToken {
    pub burn_tx_hash: B256,
    pub source_chain_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relay_task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direct_mint_tx_hash: Option<B256>,
}

impl ResumeToken {
    pub fn new(burn_tx_hash: B256, source_chain_id: u64) -> Self {
        Self {
            burn_tx_hash,
            source_chain_id,
            relay_task_id: None,
            direct_mint_tx_hash: None,
        }
    }

    pub fn to_query(&self) -> String {
        let mut query = form_urlencoded::Serializer::new(String::new());
        query.append_pair("txHash", &self.burn_tx_hash.to_string());
        query.append_pair("chainId", &self.source_chain_id.to_string());
        if let Some(task_id) = &self.relay_task_id {
            query.append_pair("taskId", task_id);
        }
        if let Some(mint) = &self.direct_mint_tx_hash {
            query.append_pair("directMintTxHash", &mint.to_string());
        }
        query.finish()
    }

    pub fn from_query(query: &str) -> Result<Self, PortError> {
        let mut burn_tx_hash = None;
        let mut source_chain_id = None;
        let mut relay_task_id = None;
        let mut direct_mint_tx_hash = None;
        for (key, value) in form_urlencoded::parse(query.trim_start_matches('?').as_bytes()) {
            match key.as_ref() {
                "txHash" => burn_tx_hash = Some(parse_hash("txHash", &value)?),
                "chainId" => {
                    source_chain_id = Some(value.parse::<u64>().map_err(|e| {
                        PortError::Validation(format!("invalid chainId '{value}': {e}"))
                    })?)
                }
                "taskId" if !value.is_empty() => relay_task_id = Some(value.into_owned()),
                "directMintTxHash" if !value.is_empty() => {
                    direct_mint_tx_hash = Some(parse_hash("directMintTxHash", &value)?)
                }
                _ => {}
            }
        }
        Ok(Self {
            burn_tx_hash: burn_tx_hash
                .ok_or_else(|| PortError::Validation("missing txHash".to_owned()))?,
            source_chain_id: source_chain_id
                .ok_or_else(|| PortError::Validation("missing chainId".to_owned()))?,
            relay_task_id,
            direct_mint_tx_hash,
        })
    }
}

fn parse_hash(key: &str, value: &str) -> Result<B256, PortError> {
    value
        .parse()
        .map_err(|e| PortError::Validation(format!("invalid {key} '{value}': {e}")))
}
