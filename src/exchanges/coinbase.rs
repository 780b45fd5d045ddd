//! Coinbase Exchange endpoint groups and budgets
//!
//! Coinbase applies separate public and private budgets with modest burst
//! allowances on top of the steady rate.
//!
//! Reference: https://docs.cloud.coinbase.com/exchange/docs/rate-limits

use std::collections::BTreeMap;

use crate::classify::EndpointRule;
use crate::classify::ResourceGroup;
use crate::config::GroupConfig;
use crate::config::LimiterConfig;

/// Endpoint-to-group rules for the Exchange REST API
pub fn endpoint_rules() -> Vec<EndpointRule> {
    vec![
        EndpointRule::prefix("/orders", ResourceGroup::PrivateOrder),
        EndpointRule::prefix("/fills", ResourceGroup::PrivateRead),
        EndpointRule::prefix("/accounts", ResourceGroup::PrivateRead),
        EndpointRule::prefix("/products", ResourceGroup::PublicRead),
        EndpointRule::prefix("/currencies", ResourceGroup::PublicRead),
    ]
}

/// Default Exchange limits
///
/// - Public endpoints: 10 per second, burst 15
/// - Private reads: 15 per second, burst 30
/// - Orders: 10 per second (shares the private budget but tracked apart so
///   order flow degrades independently)
/// - Stream management: 20 per minute
pub fn limiter_config() -> LimiterConfig {
    let mut groups = BTreeMap::new();
    groups.insert(ResourceGroup::PublicRead, GroupConfig { capacity: 15, period_ms: 1_500, increment_ms: 100 });
    groups.insert(ResourceGroup::PrivateRead, GroupConfig { capacity: 30, period_ms: 2_000, increment_ms: 66 });
    groups.insert(ResourceGroup::PrivateOrder, GroupConfig::new(10, 1_000));
    groups.insert(ResourceGroup::Streaming, GroupConfig::new(20, 60_000));

    LimiterConfig::new(groups, endpoint_rules(), ResourceGroup::PublicRead)
}
