pub mod amounts;
pub mod config;
pub mod domain_query;
pub mod domains;
pub mod oracle;
pub mod relay;
pub mod rpc;
pub mod store;
pub mod wallet;

pub use amounts::InMemoryAmounts;
pub use config::{ConfigError, TeleportAdapterConfig};
pub use domain_query::InMemoryDomainQuery;
pub use domains::StaticChainIdentity;
pub use oracle::{HttpOracleFeed, InMemoryOracle};
pub use relay::{InMemoryRelay, RelayBehavior};
pub use rpc::JsonRpcDomainQuery;
pub use store::InMemoryTransferStore;
pub use wallet::{DeterministicWallet, Finality, WalletCall};
