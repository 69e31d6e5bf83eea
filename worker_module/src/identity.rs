use regex::Regex;
use std::sync::LazyLock;

static RULE_RESOURCE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<arn>[\w:\-]+)/(?P<rule_name>[a-zA-Z\-_]+)$").unwrap()
});

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("could not derive rule identity from invocation: {descriptor:?}")]
pub struct InvalidDescriptor {
    pub descriptor: String,
}

/// Extracts the rule name from a trigger resource path such as
/// `arn:aws:events:us-east-1:123:rule/weekly-advice`.
pub fn parse_rule_name(descriptor: &str) -> Result<String, InvalidDescriptor> {
    RULE_RESOURCE_PATTERN
        .captures(descriptor)
        .and_then(|captures| captures.name("rule_name"))
        .map(|name| name.as_str().to_string())
        .ok_or_else(|| InvalidDescriptor {
            descriptor: descriptor.to_string(),
        })
}

/// Resource path the local rule runner passes when it fires `rule_name`.
pub fn rule_resource_path(region: &str, account_id: &str, rule_name: &str) -> String {
    format!("arn:aws:events:{region}:{account_id}:rule/{rule_name}")
}
