//! Topology reconstruction: rebuild the execution tree of a thread from
//! its checkpoint history alone.
//!
//! Current checkpoints record their producing node directly. Rows imported
//! from older deployments may carry [`UNKNOWN_NODE`]; for those, attribution
//! falls back to a pure heuristic over the parent's pending frontier and
//! the task results that appeared in this checkpoint. The heuristic is
//! deterministic: the same history always reconstructs the same tree.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::checkpoint::Checkpoint;
use crate::types::{START_MARKER, UNKNOWN_NODE};

/// Who produced a checkpoint, as far as the history can tell.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Attribution {
    /// A single node.
    Node(String),
    /// A fan-out step whose members could not be separated.
    Parallel(Vec<String>),
}

impl Attribution {
    /// Display label: the node name, or the comma-joined group.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Attribution::Node(name) => name.clone(),
            Attribution::Parallel(names) => names.join(", "),
        }
    }

    /// The group members when the attribution is a parallel group.
    #[must_use]
    pub fn parallel(&self) -> Option<Vec<String>> {
        match self {
            Attribution::Node(_) => None,
            Attribution::Parallel(names) => Some(names.clone()),
        }
    }
}

/// One vertex of the reconstructed tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TopologyEntry {
    pub checkpoint_id: String,
    pub parent_id: Option<String>,
    pub step: u64,
    /// Attributed producer: an encoded node name, a marker
    /// (`__start__`/`__fork__`), a comma-joined parallel group, or
    /// `unknown` when attribution failed.
    pub node: String,
    /// Members of the producing fan-out group, when attribution could not
    /// narrow it down to one node.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel_nodes: Option<Vec<String>>,
    pub created_at: DateTime<Utc>,
    /// Checkpoint ids branching off this one, in append order.
    pub children: Vec<String>,
}

/// Rebuild the tree for one thread from its checkpoint history.
///
/// Accepts the history in any order (stores return it newest first) and
/// yields entries in root-to-leaf step order, ties kept in input order.
pub fn reconstruct(history: &[Checkpoint]) -> Vec<TopologyEntry> {
    let mut ordered: Vec<&Checkpoint> = history.iter().collect();
    ordered.sort_by_key(|c| c.step);

    let mut entries: Vec<TopologyEntry> = ordered
        .into_iter()
        .map(|checkpoint| {
            let parent = checkpoint
                .parent_id
                .as_ref()
                .and_then(|pid| history.iter().find(|c| &c.id == pid));
            let attribution = attribute(checkpoint, parent);
            TopologyEntry {
                checkpoint_id: checkpoint.id.clone(),
                parent_id: checkpoint.parent_id.clone(),
                step: checkpoint.step,
                node: attribution.label(),
                parallel_nodes: attribution.parallel(),
                created_at: checkpoint.created_at,
                children: Vec::new(),
            }
        })
        .collect();

    for i in 0..entries.len() {
        let id = entries[i].checkpoint_id.clone();
        let children: Vec<String> = entries
            .iter()
            .filter(|e| e.parent_id.as_deref() == Some(id.as_str()))
            .map(|e| e.checkpoint_id.clone())
            .collect();
        entries[i].children = children;
    }
    entries
}

/// Attribute a checkpoint to the node(s) that produced it.
///
/// Trusts the recorded producer when present. Otherwise:
/// 1. a checkpoint without a parent is the start marker;
/// 2. the parent's pending frontier names the candidates: a single
///    candidate wins outright;
/// 3. for a fan-out frontier, the candidates are intersected with the
///    nodes that wrote new task results in this checkpoint. Exactly one
///    match pins the producer; several matches form a parallel group; no
///    match degrades to the whole frontier as a parallel group.
pub fn attribute(checkpoint: &Checkpoint, parent: Option<&Checkpoint>) -> Attribution {
    if !checkpoint.producing_node.is_empty() && checkpoint.producing_node != UNKNOWN_NODE {
        // Fan-out barriers record their members joined with `+`.
        if checkpoint.producing_node.contains('+') {
            return Attribution::Parallel(
                checkpoint
                    .producing_node
                    .split('+')
                    .map(str::to_string)
                    .collect(),
            );
        }
        return Attribution::Node(checkpoint.producing_node.clone());
    }

    let Some(parent) = parent.filter(|_| checkpoint.parent_id.is_some()) else {
        return Attribution::Node(START_MARKER.to_string());
    };

    let candidates: Vec<&str> = parent
        .pending_next
        .iter()
        .map(String::as_str)
        .filter(|name| *name != "Start" && *name != "End")
        .collect();

    match candidates.as_slice() {
        [] => Attribution::Node(UNKNOWN_NODE.to_string()),
        [single] => Attribution::Node((*single).to_string()),
        many => {
            let writers = result_writers(checkpoint, parent);
            let matches: Vec<&str> = many
                .iter()
                .copied()
                .filter(|name| writers.iter().any(|w| w == name))
                .collect();
            match matches.as_slice() {
                [single] => Attribution::Node((*single).to_string()),
                [] => Attribution::Parallel(many.iter().map(|s| s.to_string()).collect()),
                several => Attribution::Parallel(several.iter().map(|s| s.to_string()).collect()),
            }
        }
    }
}

/// Distinct nodes that produced task results new in `checkpoint` relative
/// to its parent. Result order within the step is completion order, so the
/// writer set is deduplicated but keeps first-seen order for determinism.
fn result_writers(checkpoint: &Checkpoint, parent: &Checkpoint) -> Vec<String> {
    let prior = parent.state.results.len().min(checkpoint.state.results.len());
    let mut writers: Vec<String> = Vec::new();
    for result in &checkpoint.state.results.get()[prior..] {
        if !writers.iter().any(|w| w == &result.assigned_to) {
            writers.push(result.assigned_to.clone());
        }
    }
    writers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::Checkpoint;
    use crate::state::RunState;
    use crate::task::{Task, TaskKind, TaskResult};
    use crate::types::{ChannelKey, NodeKind};
    use serde_json::json;

    fn root(state: RunState, pending: Vec<&str>) -> Checkpoint {
        Checkpoint::new(
            "t",
            None,
            state,
            UNKNOWN_NODE,
            pending.into_iter().map(str::to_string).collect(),
            vec![ChannelKey::Input],
            0,
        )
    }

    fn child(parent: &Checkpoint, state: RunState, pending: Vec<&str>) -> Checkpoint {
        Checkpoint::new(
            "t",
            Some(parent.id.clone()),
            state,
            UNKNOWN_NODE,
            pending.into_iter().map(str::to_string).collect(),
            vec![ChannelKey::Results],
            parent.step + 1,
        )
    }

    fn result_for(agent: &str) -> TaskResult {
        let task = Task::new(TaskKind::Agent, &NodeKind::Agent(agent.into()), "work");
        TaskResult::completed(&task, "done", json!(null))
    }

    #[test]
    fn recorded_producer_is_trusted() {
        let mut cp = root(RunState::new_with_input("q"), vec!["supervisor"]);
        cp.producing_node = "qa".to_string();
        assert_eq!(attribute(&cp, None), Attribution::Node("qa".into()));
    }

    #[test]
    fn recorded_fan_out_producer_splits_into_a_group() {
        let mut cp = root(RunState::new_with_input("q"), vec!["supervisor"]);
        cp.producing_node = "agent:a+agent:b".to_string();
        let a = attribute(&cp, None);
        assert_eq!(
            a,
            Attribution::Parallel(vec!["agent:a".into(), "agent:b".into()])
        );
        assert_eq!(a.label(), "agent:a, agent:b");
    }

    #[test]
    fn single_pending_candidate_wins() {
        let parent = root(RunState::new_with_input("q"), vec!["agent:agent_x"]);
        let cp = child(&parent, parent.state.clone(), vec!["supervisor"]);
        assert_eq!(
            attribute(&cp, Some(&parent)),
            Attribution::Node("agent:agent_x".into())
        );
    }

    #[test]
    fn fan_out_disambiguates_through_result_writers() {
        let parent = root(
            RunState::new_with_input("q"),
            vec!["agent:agent_x", "agent:agent_y"],
        );
        let mut state = parent.state.clone();
        state.results.get_mut().push(result_for("agent_y"));
        let cp = child(&parent, state, vec!["supervisor"]);
        assert_eq!(
            attribute(&cp, Some(&parent)),
            Attribution::Node("agent:agent_y".into())
        );
    }

    #[test]
    fn fan_out_with_two_writers_is_a_parallel_group() {
        let parent = root(
            RunState::new_with_input("q"),
            vec!["agent:agent_x", "agent:agent_y"],
        );
        let mut state = parent.state.clone();
        state.results.get_mut().push(result_for("agent_x"));
        state.results.get_mut().push(result_for("agent_y"));
        let cp = child(&parent, state, vec!["supervisor"]);
        assert_eq!(
            attribute(&cp, Some(&parent)),
            Attribution::Parallel(vec!["agent:agent_x".into(), "agent:agent_y".into()])
        );
    }

    #[test]
    fn fan_out_without_writers_degrades_to_the_whole_frontier() {
        let parent = root(
            RunState::new_with_input("q"),
            vec!["agent:agent_x", "agent:agent_y"],
        );
        let cp = child(&parent, parent.state.clone(), vec!["supervisor"]);
        assert_eq!(
            attribute(&cp, Some(&parent)),
            Attribution::Parallel(vec!["agent:agent_x".into(), "agent:agent_y".into()])
        );
    }

    #[test]
    fn rootless_checkpoint_is_the_start_marker() {
        let cp = root(RunState::new_with_input("q"), vec!["preprocess"]);
        assert_eq!(attribute(&cp, None), Attribution::Node(START_MARKER.into()));
    }

    #[test]
    fn reconstruct_builds_parent_child_links() {
        let a = root(RunState::new_with_input("q"), vec!["agent:agent_x"]);
        let b = child(&a, a.state.clone(), vec!["supervisor"]);
        let c = child(&a, a.state.clone(), vec!["supervisor"]);
        let entries = reconstruct(&[a.clone(), b.clone(), c.clone()]);
        assert_eq!(entries[0].children, vec![b.id.clone(), c.id.clone()]);
        assert_eq!(entries[1].parent_id.as_deref(), Some(a.id.as_str()));
        assert_eq!(entries[1].node, "agent:agent_x");
        assert!(entries[1].children.is_empty());
    }

    #[test]
    fn newest_first_input_still_yields_a_root_first_tree() {
        let a = root(RunState::new_with_input("q"), vec!["agent:agent_x"]);
        let b = child(&a, a.state.clone(), vec!["supervisor"]);
        let c = child(&b, b.state.clone(), vec!["qa"]);
        // Stores hand history back newest first.
        let entries = reconstruct(&[c.clone(), b.clone(), a.clone()]);
        assert_eq!(entries[0].checkpoint_id, a.id);
        assert_eq!(entries[0].node, START_MARKER);
        assert_eq!(entries[2].checkpoint_id, c.id);
        assert_eq!(entries, reconstruct(&[a, b, c]));
    }

    #[test]
    fn reconstruction_is_deterministic() {
        let a = root(
            RunState::new_with_input("q"),
            vec!["agent:agent_x", "agent:agent_y"],
        );
        let b = child(&a, a.state.clone(), vec!["supervisor"]);
        let history = vec![a, b];
        assert_eq!(reconstruct(&history), reconstruct(&history));
    }
}
