//! Wire types for the unified cross-chain block-explorer HTTP API.

use serde::{Deserialize, Serialize};

/// The explorer's envelope: `{status, message, result}` over any payload shape.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    /// `"1"` on success, `"0"` on failure (including the "no records" case).
    pub status: String,
    /// `"OK"`, `"No records found"`, `"NOTOK"`, or free-form error text.
    pub message: String,
    /// Array for log/creation responses, string for the block-number response.
    pub result: T,
}

/// One raw event log row as returned by the explorer's `getLogs` action.
///
/// Every numeric field arrives as a hex or decimal string; parsing happens in
/// [`super::decode`].
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawLogRow {
    /// Emitting contract address.
    pub address: String,
    /// Indexed topics, `topics[0]` is the event signature.
    pub topics: Vec<String>,
    /// Non-indexed data, `0x`-prefixed hex blob.
    pub data: String,
    #[serde(rename = "blockNumber")]
    /// Block number, hex-string encoded.
    pub block_number: String,
    #[serde(rename = "blockHash")]
    /// Block hash.
    pub block_hash: String,
    #[serde(rename = "timeStamp")]
    /// Block Unix timestamp, decimal-string encoded (occasionally hex on some deployments).
    pub time_stamp: String,
    #[serde(rename = "gasPrice")]
    /// Gas price of the originating transaction, hex-string.
    pub gas_price: String,
    #[serde(rename = "gasUsed")]
    /// Gas used by the originating transaction, hex-string.
    pub gas_used: String,
    #[serde(rename = "logIndex")]
    /// Log index within the block, hex-string encoded.
    pub log_index: String,
    #[serde(rename = "transactionHash")]
    /// Originating transaction hash.
    pub transaction_hash: String,
    #[serde(rename = "transactionIndex")]
    /// Transaction index within the block, hex-string encoded.
    pub transaction_index: String,
}

/// One contract-creation record, as returned by the `getcontractcreation` action.
#[derive(Debug, Clone, Deserialize)]
pub struct ContractCreationRow {
    #[serde(rename = "contractAddress")]
    /// The queried contract's address (echoed back).
    pub contract_address: String,
    #[serde(rename = "txHash")]
    /// The deployment transaction hash.
    pub tx_hash: String,
    #[serde(rename = "blockNumber")]
    /// Deployment block number, decimal-string encoded.
    pub block_number: Option<String>,
}

/// Which side of a timestamp to resolve to a block number: the closest block
/// before it, or the closest block after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Closest {
    /// The closest block strictly before (or at) the timestamp.
    Before,
    /// The closest block strictly after (or at) the timestamp.
    After,
}

impl Closest {
    /// The query-string value the explorer expects.
    #[must_use]
    pub const fn as_query_value(self) -> &'static str {
        match self {
            Self::Before => "before",
            Self::After => "after",
        }
    }
}
