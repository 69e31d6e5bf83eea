use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::{RuleError, ScheduleRule, SqliteRuleStore};
use crate::identity::rule_resource_path;

/// Fires due rules from a [`SqliteRuleStore`], handing each target the rule's
/// resource path the same way the hosted scheduler would.
pub struct RuleRunner<'a> {
    store: &'a SqliteRuleStore,
    region: String,
    account_id: String,
}

impl<'a> RuleRunner<'a> {
    pub fn new(
        store: &'a SqliteRuleStore,
        region: impl Into<String>,
        account_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            region: region.into(),
            account_id: account_id.into(),
        }
    }

    pub fn due_rules(&self, now: DateTime<Utc>) -> Result<Vec<ScheduleRule>, RuleError> {
        let mut due = Vec::new();
        for rule in self.store.enabled_rules()? {
            match rule.is_due(now) {
                Ok(true) => due.push(rule),
                Ok(false) => {}
                Err(err) => warn!("skipping rule {} with bad schedule: {}", rule.name, err),
            }
        }
        Ok(due)
    }

    /// Runs `handler` once per due rule and returns how many fired. A rule is
    /// marked fired before its handler runs so a crash mid-run does not
    /// replay it.
    pub fn tick<F>(&self, now: DateTime<Utc>, mut handler: F) -> Result<usize, RuleError>
    where
        F: FnMut(&str),
    {
        let due = self.due_rules(now)?;
        for rule in &due {
            self.store.mark_fired(&rule.name, now)?;
            let descriptor = rule_resource_path(&self.region, &self.account_id, &rule.name);
            info!("firing rule {} ({})", rule.name, rule.schedule_expression);
            handler(&descriptor);
        }
        Ok(due.len())
    }
}
