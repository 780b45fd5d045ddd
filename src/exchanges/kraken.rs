//! Kraken endpoint groups and budgets
//!
//! Kraken meters private calls with a decaying counter (max 15-20 depending
//! on verification tier, decaying at 0.33-1.0 per second); the budgets here
//! approximate the Starter tier as a burst of 15 with one call freed every
//! three seconds. Public endpoints are limited per IP.
//!
//! Reference: https://docs.kraken.com/rest/#section/Rate-Limits

use std::collections::BTreeMap;

use crate::classify::EndpointRule;
use crate::classify::ResourceGroup;
use crate::config::GroupConfig;
use crate::config::LimiterConfig;

/// Endpoint-to-group rules for the REST API
pub fn endpoint_rules() -> Vec<EndpointRule> {
    vec![
        EndpointRule::prefix("/0/private/AddOrder", ResourceGroup::PrivateOrder),
        EndpointRule::prefix("/0/private/CancelOrder", ResourceGroup::PrivateOrder),
        EndpointRule::prefix("/0/private/EditOrder", ResourceGroup::PrivateOrder),
        EndpointRule::prefix("/0/private/GetWebSocketsToken", ResourceGroup::Streaming),
        EndpointRule::prefix("/0/private", ResourceGroup::PrivateRead),
        EndpointRule::prefix("/0/public", ResourceGroup::PublicRead),
    ]
}

/// Starter-tier limits
///
/// - Public: 1 call per second, small burst
/// - Private reads: counter of 15, decaying 0.33/s
/// - Orders: 60 per minute
/// - WebSocket token fetches: 30 per hour
pub fn limiter_config() -> LimiterConfig {
    let mut groups = BTreeMap::new();
    groups.insert(ResourceGroup::PublicRead, GroupConfig::new(5, 5_000));
    groups.insert(ResourceGroup::PrivateRead, GroupConfig::new(15, 45_000));
    groups.insert(ResourceGroup::PrivateOrder, GroupConfig::new(60, 60_000));
    groups.insert(ResourceGroup::Streaming, GroupConfig::new(30, 3_600_000));

    LimiterConfig::new(groups, endpoint_rules(), ResourceGroup::PublicRead)
}

/// Intermediate-tier limits: larger counter, faster decay
pub fn limiter_config_intermediate() -> LimiterConfig {
    let mut groups = BTreeMap::new();
    groups.insert(ResourceGroup::PublicRead, GroupConfig::new(5, 5_000));
    groups.insert(ResourceGroup::PrivateRead, GroupConfig::new(20, 40_000));
    groups.insert(ResourceGroup::PrivateOrder, GroupConfig::new(125, 60_000));
    groups.insert(ResourceGroup::Streaming, GroupConfig::new(30, 3_600_000));

    LimiterConfig::new(groups, endpoint_rules(), ResourceGroup::PublicRead)
}
