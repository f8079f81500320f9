//! Corrective rule engine (spec §4.6), grounded on `corrective_guard.py`
//! and `corrective_rule.py`.
//!
//! Rules run in a fixed order rather than the original's single
//! `if`/`elif` chain keyed off whatever names happen to be configured:
//! counter-wrap correction is tried before partial-interval removal, since
//! a query can in principle trigger both and counter-wrap's own rewrite
//! already drops the columns the other rule would otherwise touch.

mod counter_wrap;
mod partial_interval;

pub use counter_wrap::CounterWrapRule;
pub use partial_interval::PartialIntervalRule;

use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};

use crate::ast::ParsedQuery;
use crate::error::Result;
use crate::tabular::{BackendClient, TabularResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum RuleName {
    HandleCounterWrapNonNegativeDerivative,
    RemovePartialIntervalsCaseSumGroupByTime,
}

/// Every recognized rule identifier, in declaration order — used by
/// `--show-rules` to list what a deployment could enable.
pub fn all_rule_names() -> Vec<RuleName> {
    RuleName::iter().collect()
}

/// Everything a rule needs to decide whether it applies, and to rework
/// and re-issue the query if it does.
pub struct RuleContext<'a> {
    pub query: &'a str,
    pub parsed_query: &'a ParsedQuery,
    pub schema: &'a str,
    pub user: &'a str,
    pub password: &'a str,
    pub measurement: &'a str,
    /// The value a counter wraps at for this schema/measurement (e.g.
    /// `2^32` for a 32-bit counter), if counter-wrap handling is
    /// configured for it at all.
    pub counter_overflow: Option<f64>,
}

pub trait CorrectiveRule {
    fn name(&self) -> RuleName;
    fn check(&self, ctx: &RuleContext) -> bool;
    fn action(&self, ctx: &RuleContext, backend: &dyn BackendClient) -> Result<TabularResult>;
}

fn ordered_rules(enabled: &[RuleName]) -> Vec<Box<dyn CorrectiveRule>> {
    let mut rules: Vec<Box<dyn CorrectiveRule>> = Vec::new();
    if enabled.contains(&RuleName::HandleCounterWrapNonNegativeDerivative) {
        rules.push(Box::new(CounterWrapRule));
    }
    if enabled.contains(&RuleName::RemovePartialIntervalsCaseSumGroupByTime) {
        rules.push(Box::new(PartialIntervalRule));
    }
    rules
}

/// Run each enabled rule's `check` in dispatch order; the first to match
/// runs its `action` and short-circuits the rest.
pub fn dispatch(ctx: &RuleContext, enabled: &[RuleName], backend: &dyn BackendClient) -> Option<Result<TabularResult>> {
    for rule in ordered_rules(enabled) {
        if rule.check(ctx) {
            return Some(rule.action(ctx, backend));
        }
    }
    None
}
