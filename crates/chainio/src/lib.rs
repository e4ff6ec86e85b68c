//! `ChainIO` holds the ERC-20 bindings and provider construction used to read burn transfers.

use alloy::{
    primitives::Address,
    providers::{ProviderBuilder, RootProvider, fillers::FillProvider, utils::JoinedRecommendedFillers},
    rpc::types::Filter,
    sol,
};
use alloy_rpc_client::ClientBuilder;
use alloy_sol_types::SolEvent;
use primitives::retries::RpcRetryConfig;
use url::Url;

/// Alias to the default provider with all recommended fillers (read-only).
pub type DefaultProvider = FillProvider<JoinedRecommendedFillers, RootProvider>;

sol! {
    #[allow(missing_docs)]
    #[derive(Debug, PartialEq, Eq)]
    interface IERC20 {
        event Transfer(address indexed from, address indexed to, uint256 value);
    }
}

/// Connect a read-only HTTP provider whose transport retries rate limits and
/// refused connections.
pub fn http_provider(rpc_url: Url, retry: RpcRetryConfig) -> DefaultProvider {
    let client = ClientBuilder::default().layer(retry.layer()).http(rpc_url);
    ProviderBuilder::new().connect_client(client)
}

/// Returns a log [`Filter`] matching `Transfer` events emitted by `token` whose
/// `to` topic equals `recipient`.
pub fn transfers_to_filter(token: Address, recipient: Address) -> Filter {
    Filter::new()
        .address(token)
        .event_signature(IERC20::Transfer::SIGNATURE_HASH)
        .topic2(recipient.into_word())
}
