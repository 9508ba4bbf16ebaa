// Behavioral rule engine.
// Every rule is a pure function over one user's recent activity window.
// The evaluation instant is an argument, never the wall clock, so a rule
// always yields the same answer for the same input.

use chrono::{DateTime, Duration, Timelike, Utc};

use crate::entities::{ActionKind, ActivityRecord, TargetKind, UserAccount};
use crate::value_objects::Severity;

/// Thresholds and windows for the built-in rules. All of them come from
/// configuration; rule bodies contain no literal limits.
#[derive(Debug, Clone)]
pub struct RuleThresholds {
    pub rapid_login_threshold: usize,
    pub rapid_login_window: Duration,
    /// Inclusive hour band considered normal working time.
    pub working_hours_start: u32,
    pub working_hours_end: u32,
    pub off_hours_window: Duration,
    pub bulk_mutation_threshold: usize,
    pub bulk_mutation_window: Duration,
    pub scraping_threshold: usize,
    pub scraping_window: Duration,
}

impl Default for RuleThresholds {
    fn default() -> Self {
        Self {
            rapid_login_threshold: 5,
            rapid_login_window: Duration::hours(1),
            working_hours_start: 8,
            working_hours_end: 18,
            off_hours_window: Duration::hours(1),
            bulk_mutation_threshold: 20,
            bulk_mutation_window: Duration::minutes(15),
            scraping_threshold: 10,
            scraping_window: Duration::minutes(10),
        }
    }
}

type RuleCheck =
    fn(&[ActivityRecord], &UserAccount, &RuleThresholds, DateTime<Utc>) -> Option<String>;

/// A named, severity-tagged predicate over a user's recent activity.
pub struct Rule {
    pub name: &'static str,
    pub description: &'static str,
    pub severity: Severity,
    check: RuleCheck,
}

impl Rule {
    /// Returns the one-line explanation when the rule fires.
    pub fn evaluate(
        &self,
        records: &[ActivityRecord],
        user: &UserAccount,
        thresholds: &RuleThresholds,
        now: DateTime<Utc>,
    ) -> Option<String> {
        (self.check)(records, user, thresholds, now)
    }
}

/// The active rule set, fixed at startup. Rules are evaluated in order and
/// independently: several may fire for the same user in the same cycle.
pub fn default_rules() -> Vec<Rule> {
    vec![
        Rule {
            name: "rapid-login-attempts",
            description: "Multiple login attempts in a short time period",
            severity: Severity::Medium,
            check: check_rapid_logins,
        },
        Rule {
            name: "unusual-access-time",
            description: "Access outside normal working hours",
            severity: Severity::Low,
            check: check_off_hours,
        },
        Rule {
            name: "mass-data-modification",
            description: "Large number of update or delete operations",
            severity: Severity::High,
            check: check_bulk_mutations,
        },
        Rule {
            name: "sensitive-data-access",
            description: "Repeated access to sensitive user data",
            severity: Severity::High,
            check: check_user_data_scraping,
        },
    ]
}

fn check_rapid_logins(
    records: &[ActivityRecord],
    _user: &UserAccount,
    thresholds: &RuleThresholds,
    now: DateTime<Utc>,
) -> Option<String> {
    let count = records
        .iter()
        .filter(|r| r.action == ActionKind::Login && now - r.created_at < thresholds.rapid_login_window)
        .count();
    if count >= thresholds.rapid_login_threshold {
        return Some(format!(
            "{} or more login attempts within the last hour",
            thresholds.rapid_login_threshold
        ));
    }
    None
}

fn check_off_hours(
    records: &[ActivityRecord],
    _user: &UserAccount,
    thresholds: &RuleThresholds,
    now: DateTime<Utc>,
) -> Option<String> {
    let off_hours = records.iter().any(|r| {
        let hour = r.created_at.hour();
        (hour < thresholds.working_hours_start || hour > thresholds.working_hours_end)
            && now - r.created_at < thresholds.off_hours_window
    });
    if off_hours {
        return Some("Activity detected outside normal working hours".to_string());
    }
    None
}

fn check_bulk_mutations(
    records: &[ActivityRecord],
    _user: &UserAccount,
    thresholds: &RuleThresholds,
    now: DateTime<Utc>,
) -> Option<String> {
    let count = records
        .iter()
        .filter(|r| r.action.is_mutation() && now - r.created_at < thresholds.bulk_mutation_window)
        .count();
    if count >= thresholds.bulk_mutation_threshold {
        return Some(format!(
            "{} or more update/delete operations within {} minutes",
            thresholds.bulk_mutation_threshold,
            thresholds.bulk_mutation_window.num_minutes()
        ));
    }
    None
}

fn check_user_data_scraping(
    records: &[ActivityRecord],
    user: &UserAccount,
    thresholds: &RuleThresholds,
    now: DateTime<Utc>,
) -> Option<String> {
    if user.role.is_admin() {
        return None;
    }
    let count = records
        .iter()
        .filter(|r| {
            r.target == TargetKind::User
                && r.action == ActionKind::Read
                && now - r.created_at < thresholds.scraping_window
        })
        .count();
    if count >= thresholds.scraping_threshold {
        return Some("Frequent access to user data by non-admin".to_string());
    }
    None
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::value_objects::Role;

    fn midday() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 14, 12, 0, 0).unwrap()
    }

    fn user(role: Role) -> UserAccount {
        UserAccount {
            id: 7,
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            role,
            active: true,
            last_login: None,
        }
    }

    fn record(
        action: ActionKind,
        target: TargetKind,
        created_at: DateTime<Utc>,
    ) -> ActivityRecord {
        ActivityRecord {
            id: 0,
            user_id: 7,
            username: "alice".to_string(),
            action,
            target,
            target_id: None,
            description: String::new(),
            created_at,
        }
    }

    fn logins(count: usize, now: DateTime<Utc>) -> Vec<ActivityRecord> {
        (0..count)
            .map(|i| {
                record(
                    ActionKind::Login,
                    TargetKind::User,
                    now - Duration::minutes(i as i64),
                )
            })
            .collect()
    }

    #[test]
    fn rules_are_deterministic() {
        let now = midday();
        let records = logins(6, now);
        let user = user(Role::User);
        let thresholds = RuleThresholds::default();
        for rule in default_rules() {
            let first = rule.evaluate(&records, &user, &thresholds, now);
            let second = rule.evaluate(&records, &user, &thresholds, now);
            assert_eq!(first, second, "{} is not pure", rule.name);
        }
    }

    #[test]
    fn rapid_logins_fire_at_threshold() {
        let now = midday();
        let user = user(Role::User);
        let thresholds = RuleThresholds::default();

        let four = logins(4, now);
        assert!(check_rapid_logins(&four, &user, &thresholds, now).is_none());

        let five = logins(5, now);
        assert!(check_rapid_logins(&five, &user, &thresholds, now).is_some());
    }

    #[test]
    fn stale_logins_do_not_count() {
        let now = midday();
        let user = user(Role::User);
        let thresholds = RuleThresholds::default();
        let records: Vec<_> = (0..5)
            .map(|i| {
                record(
                    ActionKind::Login,
                    TargetKind::User,
                    now - Duration::hours(2) - Duration::minutes(i),
                )
            })
            .collect();
        assert!(check_rapid_logins(&records, &user, &thresholds, now).is_none());
    }

    #[test]
    fn five_logins_fire_only_the_login_rule() {
        let now = midday();
        let user = user(Role::User);
        let thresholds = RuleThresholds::default();
        let records = logins(5, now);

        let fired: Vec<_> = default_rules()
            .into_iter()
            .filter(|rule| rule.evaluate(&records, &user, &thresholds, now).is_some())
            .map(|rule| rule.name)
            .collect();
        assert_eq!(fired, vec!["rapid-login-attempts"]);
    }

    #[test]
    fn alice_scenario_fires_once_per_evaluation() {
        // Six logins at minutes 0..=5; the condition holds, so every cycle
        // re-fires the same rule (re-alerting, not deduplicated).
        let now = midday();
        let user = user(Role::User);
        let thresholds = RuleThresholds::default();
        let records = logins(6, now);

        for _cycle in 0..3 {
            let anomalies: Vec<_> = default_rules()
                .iter()
                .filter_map(|rule| {
                    rule.evaluate(&records, &user, &thresholds, now)
                        .map(|_| (rule.name, rule.severity))
                })
                .collect();
            assert_eq!(anomalies, vec![("rapid-login-attempts", Severity::Medium)]);
        }
    }

    #[test]
    fn off_hours_fires_for_recent_late_activity() {
        let now = Utc.with_ymd_and_hms(2024, 3, 14, 22, 30, 0).unwrap();
        let user = user(Role::User);
        let thresholds = RuleThresholds::default();

        let late = vec![record(
            ActionKind::Read,
            TargetKind::Worker,
            now - Duration::minutes(10),
        )];
        assert!(check_off_hours(&late, &user, &thresholds, now).is_some());

        // Same event hour, but older than the trailing window.
        let stale = vec![record(
            ActionKind::Read,
            TargetKind::Worker,
            now - Duration::hours(3),
        )];
        assert!(check_off_hours(&stale, &user, &thresholds, now).is_none());
    }

    #[test]
    fn working_hours_band_is_inclusive() {
        let thresholds = RuleThresholds::default();
        let user = user(Role::User);

        // 18:xx is still inside the band; 19:xx is not.
        let now = Utc.with_ymd_and_hms(2024, 3, 14, 18, 45, 0).unwrap();
        let records = vec![record(
            ActionKind::Update,
            TargetKind::Project,
            now - Duration::minutes(5),
        )];
        assert!(check_off_hours(&records, &user, &thresholds, now).is_none());

        let now = Utc.with_ymd_and_hms(2024, 3, 14, 19, 10, 0).unwrap();
        let records = vec![record(
            ActionKind::Update,
            TargetKind::Project,
            now - Duration::minutes(5),
        )];
        assert!(check_off_hours(&records, &user, &thresholds, now).is_some());
    }

    #[test]
    fn bulk_mutations_fire_at_twenty() {
        let now = midday();
        let user = user(Role::User);
        let thresholds = RuleThresholds::default();

        let mutations = |count: usize| -> Vec<ActivityRecord> {
            (0..count)
                .map(|i| {
                    let action = if i % 2 == 0 {
                        ActionKind::Update
                    } else {
                        ActionKind::Delete
                    };
                    record(action, TargetKind::Worker, now - Duration::seconds(i as i64))
                })
                .collect()
        };

        assert!(check_bulk_mutations(&mutations(19), &user, &thresholds, now).is_none());
        assert!(check_bulk_mutations(&mutations(20), &user, &thresholds, now).is_some());
    }

    #[test]
    fn scraping_exempts_admins() {
        let now = midday();
        let thresholds = RuleThresholds::default();
        let reads: Vec<_> = (0..10)
            .map(|i| {
                record(
                    ActionKind::Read,
                    TargetKind::User,
                    now - Duration::seconds(i * 30),
                )
            })
            .collect();

        assert!(check_user_data_scraping(&reads, &user(Role::User), &thresholds, now).is_some());
        assert!(check_user_data_scraping(&reads, &user(Role::Admin), &thresholds, now).is_none());
    }

    #[test]
    fn scraping_ignores_other_targets() {
        let now = midday();
        let thresholds = RuleThresholds::default();
        let reads: Vec<_> = (0..10)
            .map(|i| {
                record(
                    ActionKind::Read,
                    TargetKind::Worker,
                    now - Duration::seconds(i * 30),
                )
            })
            .collect();
        assert!(check_user_data_scraping(&reads, &user(Role::User), &thresholds, now).is_none());
    }
}
