//! Routing circuit breaker.
//!
//! Wraps the decision service's proposals with loop prevention: once a
//! single agent starts repeating, routing is forced to `qa` within at most
//! three supervisor decisions. The breaker is a pure function over the
//! previous [`RetryGuard`] so its termination property can be tested in
//! isolation from the engine.

use serde::{Deserialize, Serialize};

use crate::types::NodeKind;

/// Consecutive-repeat threshold after which routing is forced to `qa`.
pub const MAX_RETRIES: u32 = 2;

/// Placeholder proposals the decision service may emit that carry no
/// routing intent.
const PLACEHOLDERS: [&str; 4] = ["", "none", "null", "FINISH"];

/// Repeat tracking state, overwrite-reduced into the retry channel.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryGuard {
    pub last_agent: Option<String>,
    pub retry_count: u32,
}

/// Outcome of one breaker application.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Verdict {
    /// The real routing targets after loop prevention.
    pub targets: Vec<NodeKind>,
    /// Updated guard to overwrite into state.
    pub guard: RetryGuard,
    /// Updated plan to overwrite into state.
    pub plan: Vec<String>,
    /// Set when the breaker overrode the proposal to force termination.
    pub tripped: bool,
}

/// Apply loop prevention to the decision service's proposals.
///
/// Rules, in order:
/// 1. discard empty/placeholder proposals and collapse duplicates, so a
///    service that proposes the same agent twice in one decision still
///    counts as a single repeat; an empty set falls back to `qa`;
/// 2. a single proposal equal to `guard.last_agent` increments
///    `retry_count`, anything else resets it to 0;
/// 3. when `retry_count` reaches [`MAX_RETRIES`] the decision is forced to
///    `qa`, the count resets to 0 and the plan is truncated.
pub fn apply(proposals: &[String], plan: Vec<String>, guard: &RetryGuard) -> Verdict {
    let mut filtered: Vec<&str> = Vec::new();
    for proposal in proposals {
        let name = proposal.trim();
        if PLACEHOLDERS.contains(&name) || filtered.contains(&name) {
            continue;
        }
        filtered.push(name);
    }

    if filtered.is_empty() {
        tracing::debug!("no actionable proposals, routing to qa");
        return Verdict {
            targets: vec![NodeKind::Qa],
            guard: RetryGuard::default(),
            plan: Vec::new(),
            tripped: false,
        };
    }

    let mut guard = guard.clone();
    if filtered.len() == 1 {
        let proposed = filtered[0];
        if guard.last_agent.as_deref() == Some(proposed) {
            guard.retry_count += 1;
        } else {
            guard.retry_count = 0;
        }
        guard.last_agent = Some(proposed.to_string());

        if guard.retry_count >= MAX_RETRIES {
            tracing::warn!(
                agent = proposed,
                retries = guard.retry_count,
                "routing loop detected, forcing qa"
            );
            return Verdict {
                targets: vec![NodeKind::Qa],
                guard: RetryGuard {
                    last_agent: Some(proposed.to_string()),
                    retry_count: 0,
                },
                plan: Vec::new(),
                tripped: true,
            };
        }
    } else {
        // Fan-out proposals never repeat a single agent; reset tracking.
        guard.last_agent = None;
        guard.retry_count = 0;
    }

    Verdict {
        targets: filtered
            .into_iter()
            .map(NodeKind::from)
            .collect(),
        guard,
        plan,
        tripped: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard(last: Option<&str>, count: u32) -> RetryGuard {
        RetryGuard {
            last_agent: last.map(str::to_string),
            retry_count: count,
        }
    }

    #[test]
    fn empty_proposals_fall_back_to_qa() {
        let v = apply(&[], vec!["step".into()], &RetryGuard::default());
        assert_eq!(v.targets, vec![NodeKind::Qa]);
        assert!(!v.tripped);
    }

    #[test]
    fn placeholder_proposals_fall_back_to_qa() {
        let v = apply(
            &["".into(), "FINISH".into()],
            vec![],
            &guard(Some("agent_x"), 1),
        );
        assert_eq!(v.targets, vec![NodeKind::Qa]);
    }

    #[test]
    fn repeating_agent_trips_on_third_decision() {
        let g0 = RetryGuard::default();
        let v1 = apply(&["agent_x".into()], vec![], &g0);
        assert_eq!(v1.guard.retry_count, 0);
        assert!(!v1.tripped);

        let v2 = apply(&["agent_x".into()], vec![], &v1.guard);
        assert_eq!(v2.guard.retry_count, 1);
        assert!(!v2.tripped);

        let v3 = apply(&["agent_x".into()], vec![], &v2.guard);
        assert!(v3.tripped);
        assert_eq!(v3.targets, vec![NodeKind::Qa]);
        assert_eq!(v3.guard.retry_count, 0);
    }

    #[test]
    fn duplicated_single_agent_proposals_still_count_as_repeats() {
        let v1 = apply(
            &["agent_x".into(), "agent_x".into()],
            vec![],
            &RetryGuard::default(),
        );
        assert_eq!(v1.targets, vec![NodeKind::Agent("agent_x".into())]);
        assert_eq!(v1.guard.last_agent.as_deref(), Some("agent_x"));

        let v2 = apply(&["agent_x".into(), "agent_x".into()], vec![], &v1.guard);
        assert_eq!(v2.guard.retry_count, 1);

        let v3 = apply(&["agent_x".into(), "agent_x".into()], vec![], &v2.guard);
        assert!(v3.tripped);
        assert_eq!(v3.targets, vec![NodeKind::Qa]);
    }

    #[test]
    fn switching_agents_resets_the_count() {
        let g = guard(Some("agent_x"), 1);
        let v = apply(&["agent_y".into()], vec![], &g);
        assert_eq!(v.guard.retry_count, 0);
        assert_eq!(v.guard.last_agent.as_deref(), Some("agent_y"));
        assert!(!v.tripped);
    }

    #[test]
    fn fan_out_resets_tracking() {
        let g = guard(Some("agent_x"), 1);
        let v = apply(&["agent_x".into(), "agent_y".into()], vec![], &g);
        assert_eq!(v.guard, RetryGuard::default());
        assert_eq!(v.targets.len(), 2);
    }
}
