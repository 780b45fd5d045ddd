//! Bybit V5 endpoint groups and budgets
//!
//! Bybit limits by endpoint category: market data is IP-limited while
//! account and trade endpoints are limited per UID, with order endpoints
//! carrying the tightest budget.
//!
//! Reference: https://bybit-exchange.github.io/docs/v5/rate-limit

use std::collections::BTreeMap;

use crate::classify::EndpointRule;
use crate::classify::ResourceGroup;
use crate::config::GroupConfig;
use crate::config::LimiterConfig;

/// Endpoint-to-group rules for the V5 REST API
pub fn endpoint_rules() -> Vec<EndpointRule> {
    vec![
        EndpointRule::prefix("/v5/order", ResourceGroup::PrivateOrder),
        EndpointRule::prefix("/v5/position", ResourceGroup::PrivateRead),
        EndpointRule::prefix("/v5/account", ResourceGroup::PrivateRead),
        EndpointRule::prefix("/v5/execution", ResourceGroup::PrivateRead),
        EndpointRule::prefix("/v5/market", ResourceGroup::PublicRead),
    ]
}

/// Default V5 limits
///
/// - Market data: 600 per 5 seconds (IP limit)
/// - Account/position reads: 50 per second
/// - Orders: 10 per second (classic accounts)
/// - Stream management: 500 per 5 minutes
pub fn limiter_config() -> LimiterConfig {
    let mut groups = BTreeMap::new();
    groups.insert(ResourceGroup::PublicRead, GroupConfig::new(600, 5_000));
    groups.insert(ResourceGroup::PrivateRead, GroupConfig::new(50, 1_000));
    groups.insert(ResourceGroup::PrivateOrder, GroupConfig::new(10, 1_000));
    groups.insert(ResourceGroup::Streaming, GroupConfig::new(500, 300_000));

    LimiterConfig::new(groups, endpoint_rules(), ResourceGroup::PublicRead)
}
