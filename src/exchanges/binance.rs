//! Binance Spot endpoint groups and budgets
//!
//! Binance enforces a request-weight budget per minute alongside separate
//! order-count limits:
//! - REQUEST_WEIGHT: 1200 per minute
//! - ORDERS: 100 per 10 seconds
//!
//! Reference: https://binance-docs.github.io/apidocs/spot/en/#limits

use std::collections::BTreeMap;

use crate::classify::EndpointRule;
use crate::classify::ResourceGroup;
use crate::config::GroupConfig;
use crate::config::LimiterConfig;

/// Endpoint-to-group rules for the Spot REST API
pub fn endpoint_rules() -> Vec<EndpointRule> {
    vec![
        EndpointRule::prefix("/api/v3/order", ResourceGroup::PrivateOrder),
        EndpointRule::for_method("GET", "/api/v3/account", ResourceGroup::PrivateRead),
        EndpointRule::for_method("GET", "/api/v3/myTrades", ResourceGroup::PrivateRead),
        EndpointRule::for_method("GET", "/api/v3/openOrders", ResourceGroup::PrivateRead),
        EndpointRule::prefix("/api/v3/userDataStream", ResourceGroup::Streaming),
        EndpointRule::prefix("/api/v3", ResourceGroup::PublicRead),
    ]
}

/// Default Spot limits
///
/// - Public reads: 1200 weight per minute
/// - Private reads: 180 per minute
/// - Orders: 100 per 10 seconds
/// - Listen-key management: 60 per hour
pub fn limiter_config() -> LimiterConfig {
    let mut groups = BTreeMap::new();
    groups.insert(ResourceGroup::PublicRead, GroupConfig::new(1_200, 60_000));
    groups.insert(ResourceGroup::PrivateRead, GroupConfig::new(180, 60_000));
    groups.insert(ResourceGroup::PrivateOrder, GroupConfig::new(100, 10_000));
    groups.insert(ResourceGroup::Streaming, GroupConfig::new(60, 3_600_000));

    LimiterConfig::new(groups, endpoint_rules(), ResourceGroup::PublicRead)
}

/// Conservative Spot limits (safe for all accounts)
///
/// Roughly two thirds of the published budgets, leaving headroom for
/// retries and weight miscounts.
pub fn limiter_config_conservative() -> LimiterConfig {
    let mut groups = BTreeMap::new();
    groups.insert(ResourceGroup::PublicRead, GroupConfig::new(800, 60_000));
    groups.insert(ResourceGroup::PrivateRead, GroupConfig::new(120, 60_000));
    groups.insert(ResourceGroup::PrivateOrder, GroupConfig::new(60, 10_000));
    groups.insert(ResourceGroup::Streaming, GroupConfig::new(30, 3_600_000));

    LimiterConfig::new(groups, endpoint_rules(), ResourceGroup::PublicRead)
}
