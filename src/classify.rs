use std::fmt;

use serde::Deserialize;

/// Named bucket of API operations sharing one rate-limit budget
///
/// The set is small and fixed: every outbound call maps onto exactly one of
/// these groups, and each group owns its own budget, queue and worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceGroup {
    /// Unauthenticated market-data reads (depth, tickers, klines)
    PublicRead,
    /// Authenticated account/position reads
    PrivateRead,
    /// Order placement, amendment and cancellation
    PrivateOrder,
    /// Stream/listen-key management endpoints
    Streaming,
}

impl ResourceGroup {
    pub const ALL: [ResourceGroup; 4] = [ResourceGroup::PublicRead, ResourceGroup::PrivateRead, ResourceGroup::PrivateOrder, ResourceGroup::Streaming];

    pub const fn as_str(&self) -> &'static str {
        match self {
            ResourceGroup::PublicRead => "public-read",
            ResourceGroup::PrivateRead => "private-read",
            ResourceGroup::PrivateOrder => "private-order",
            ResourceGroup::Streaming => "streaming",
        }
    }
}

impl fmt::Display for ResourceGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps one endpoint path prefix (optionally method-qualified) to a group
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointRule {
    /// Path prefix to match, e.g. `/api/v3/order`
    pub path_prefix: String,

    /// HTTP method this rule applies to; `None` matches any method
    #[serde(default)]
    pub method: Option<String>,

    /// Group the matched operation is billed against
    pub group: ResourceGroup,
}

impl EndpointRule {
    /// Rule matching any HTTP method under the prefix
    pub fn prefix(path_prefix: impl Into<String>, group: ResourceGroup) -> Self {
        Self { path_prefix: path_prefix.into(), method: None, group }
    }

    /// Rule matching one HTTP method under the prefix
    pub fn for_method(method: &str, path_prefix: impl Into<String>, group: ResourceGroup) -> Self {
        Self { path_prefix: path_prefix.into(), method: Some(method.to_ascii_uppercase()), group }
    }
}

/// Static endpoint-to-group resolver
///
/// Longest-prefix match on the path; within the winning prefix an exact
/// method rule beats a wildcard rule. Anything unmatched falls back to the
/// default group. The table is built once at startup and never mutated.
pub struct GroupClassifier {
    /// Rules sorted by descending prefix length
    rules: Vec<EndpointRule>,
    default_group: ResourceGroup,
}

impl GroupClassifier {
    pub fn new(mut rules: Vec<EndpointRule>, default_group: ResourceGroup) -> Self {
        rules.sort_by(|a, b| b.path_prefix.len().cmp(&a.path_prefix.len()));
        Self { rules, default_group }
    }

    /// Resolve an operation to its resource group
    pub fn classify(&self, path: &str, method: &str) -> ResourceGroup {
        let mut matched_len: Option<usize> = None;
        let mut wildcard: Option<ResourceGroup> = None;

        for rule in &self.rules {
            if let Some(len) = matched_len {
                // Rules are sorted longest-first; once the winning prefix
                // length is passed there is nothing left to consider.
                if rule.path_prefix.len() < len {
                    break;
                }
            }

            if !path.starts_with(rule.path_prefix.as_str()) {
                continue;
            }

            if matched_len.is_none() {
                matched_len = Some(rule.path_prefix.len());
            }

            match &rule.method {
                Some(m) if m.eq_ignore_ascii_case(method) => return rule.group,
                None if wildcard.is_none() => wildcard = Some(rule.group),
                _ => {}
            }
        }

        wildcard.unwrap_or(self.default_group)
    }

    pub fn default_group(&self) -> ResourceGroup {
        self.default_group
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> GroupClassifier {
        GroupClassifier::new(
            vec![
                EndpointRule::prefix("/api/v3/order", ResourceGroup::PrivateOrder),
                EndpointRule::for_method("GET", "/api/v3/account", ResourceGroup::PrivateRead),
                EndpointRule::prefix("/api/v3/userDataStream", ResourceGroup::Streaming),
                EndpointRule::prefix("/api/v3", ResourceGroup::PublicRead),
            ],
            ResourceGroup::PublicRead,
        )
    }

    #[test]
    fn test_longest_prefix_wins() {
        let c = classifier();

        assert_eq!(c.classify("/api/v3/order", "POST"), ResourceGroup::PrivateOrder);
        assert_eq!(c.classify("/api/v3/order/oco", "POST"), ResourceGroup::PrivateOrder);
        assert_eq!(c.classify("/api/v3/depth", "GET"), ResourceGroup::PublicRead);
    }

    #[test]
    fn test_method_override_beats_wildcard() {
        let c = GroupClassifier::new(
            vec![
                EndpointRule::for_method("DELETE", "/api/v3/order", ResourceGroup::PrivateOrder),
                EndpointRule::prefix("/api/v3/order", ResourceGroup::PrivateRead),
            ],
            ResourceGroup::PublicRead,
        );

        assert_eq!(c.classify("/api/v3/order", "DELETE"), ResourceGroup::PrivateOrder);
        assert_eq!(c.classify("/api/v3/order", "delete"), ResourceGroup::PrivateOrder);
        assert_eq!(c.classify("/api/v3/order", "GET"), ResourceGroup::PrivateRead);
    }

    #[test]
    fn test_method_mismatch_falls_to_default_not_shorter_prefix() {
        let c = classifier();

        // /api/v3/account only has a GET rule; POST falls through to the
        // default group, not to the shorter /api/v3 wildcard.
        assert_eq!(c.classify("/api/v3/account", "POST"), ResourceGroup::PublicRead);
        assert_eq!(c.classify("/api/v3/account", "GET"), ResourceGroup::PrivateRead);
    }

    #[test]
    fn test_unmatched_path_uses_default() {
        let c = classifier();

        assert_eq!(c.classify("/sapi/v1/capital", "GET"), ResourceGroup::PublicRead);
        assert_eq!(c.default_group(), ResourceGroup::PublicRead);
    }

    #[test]
    fn test_group_display() {
        assert_eq!(ResourceGroup::PrivateOrder.to_string(), "private-order");
        assert_eq!(ResourceGroup::ALL.len(), 4);
    }
}
