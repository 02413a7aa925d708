//! Recipient → channel routing.
//!
//! Evaluated per recipient, first hit wins:
//! 1. the channel named on the request
//! 2. the first recipient-suffix rule that matches (case-insensitive)
//! 3. the configured default channel

use courier_common::config::{AppConfig, RoutingRuleConfig};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
struct SuffixRule {
    /// Lowercased
    suffix: String,
    channel_id: Uuid,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingPolicy {
    rules: Vec<SuffixRule>,
    default_channel: Option<Uuid>,
}

impl RoutingPolicy {
    pub fn new(rules: &[RoutingRuleConfig], default_channel: Option<Uuid>) -> Self {
        Self {
            rules: rules
                .iter()
                .map(|r| SuffixRule {
                    suffix: r.suffix.to_lowercase(),
                    channel_id: r.channel_id,
                })
                .collect(),
            default_channel,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(&config.routing_rules, config.default_channel_id)
    }

    /// The channel for `recipient`, or `None` when nothing routes it.
    pub fn route(&self, recipient: &str, explicit: Option<Uuid>) -> Option<Uuid> {
        if explicit.is_some() {
            return explicit;
        }
        let lower = recipient.to_lowercase();
        self.rules
            .iter()
            .find(|rule| lower.ends_with(&rule.suffix))
            .map(|rule| rule.channel_id)
            .or(self.default_channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(suffix: &str, channel_id: Uuid) -> RoutingRuleConfig {
        RoutingRuleConfig {
            suffix: suffix.to_string(),
            channel_id,
        }
    }

    #[test]
    fn test_explicit_channel_wins() {
        let explicit = Uuid::new_v4();
        let policy = RoutingPolicy::new(&[rule("@x.com", Uuid::new_v4())], Some(Uuid::new_v4()));
        assert_eq!(policy.route("a@x.com", Some(explicit)), Some(explicit));
    }

    #[test]
    fn test_first_matching_suffix_then_default() {
        let corp = Uuid::new_v4();
        let sub = Uuid::new_v4();
        let fallback = Uuid::new_v4();
        let policy = RoutingPolicy::new(
            &[rule("@corp.com", corp), rule(".com", sub)],
            Some(fallback),
        );
        assert_eq!(policy.route("Ann@CORP.com", None), Some(corp));
        assert_eq!(policy.route("bob@other.com", None), Some(sub));
        assert_eq!(policy.route("carl@site.io", None), Some(fallback));
    }

    #[test]
    fn test_no_route() {
        let policy = RoutingPolicy::default();
        assert_eq!(policy.route("a@x.com", None), None);
    }
}
