mod rules;

pub use rules::{default_rules, Rule, RuleThresholds};
