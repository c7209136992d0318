//! Activity graph representation
//!
//! Bipartite user/resource graph with credit-weighted edges. Each activity
//! becomes one edge whose weight depends only on the activity's
//! chronological rank among the activities on its resource. The same weight
//! is stored in both adjacency directions.

use crate::activity::Activity;
use crate::credit::CreditFunction;
use serde::{Deserialize, Serialize};
use spear_common::errors::{Result, SpearError};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use tracing::debug;

/// How activities with equal timestamps on one resource are ranked
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TiePolicy {
    /// Equal timestamps keep their input order: ranks 1, 2, 3, ...
    #[default]
    Sequential,
    /// Equal timestamps share the rank of the first of them:
    /// timestamps 1, 1, 1, 2 get ranks 1, 1, 1, 4
    Shared,
}

impl FromStr for TiePolicy {
    type Err = SpearError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequential" => Ok(TiePolicy::Sequential),
            "shared" => Ok(TiePolicy::Shared),
            other => Err(SpearError::Configuration {
                message: format!("unknown tie policy '{}'", other),
            }),
        }
    }
}

/// Incident edge seen from one side of the graph
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    /// Dense index of the node on the other side
    pub node: usize,

    /// Credit weight of the underlying activity
    pub weight: f64,
}

/// In-memory activity graph
#[derive(Debug, Clone)]
pub struct ActivityGraph {
    /// User identifiers, ascending; position is the dense user index
    users: Vec<String>,

    /// Resource identifiers, ascending; position is the dense resource index
    resources: Vec<String>,

    /// Adjacency: user -> resources acted on
    by_user: Vec<Vec<Edge>>,

    /// Reverse adjacency: resource -> users who acted on it
    by_resource: Vec<Vec<Edge>>,

    edge_count: usize,

    /// Largest edge weight, 0 when every weight is 0
    max_weight: f64,
}

impl ActivityGraph {
    /// Build the graph from raw activities.
    ///
    /// Activities need not be sorted. Each resource's activities are
    /// stable-sorted by timestamp to assign ranks, then every activity is
    /// weighted with `credit(rank, total_on_resource)`.
    ///
    /// # Errors
    /// - `InvalidInput` for an empty list or a blank user/resource identifier
    /// - `InvalidCredit` if the credit function returns a negative or
    ///   non-finite weight
    pub fn build<T, C>(activities: &[Activity<T>], credit: &C, ties: TiePolicy) -> Result<Self>
    where
        T: Ord,
        C: CreditFunction + ?Sized,
    {
        if activities.is_empty() {
            return Err(SpearError::invalid_input("activity list is empty"));
        }

        for (index, activity) in activities.iter().enumerate() {
            if let Some(field) = activity.missing_field() {
                return Err(SpearError::invalid_input(format!(
                    "activity {} has no {} identifier",
                    index, field
                )));
            }
        }

        let (users, user_index) = index_entities(activities.iter().map(|a| a.user.as_str()));
        let (resources, resource_index) =
            index_entities(activities.iter().map(|a| a.resource.as_str()));

        // Group activity positions by resource, in input order
        let mut groups: Vec<Vec<usize>> = vec![Vec::new(); resources.len()];
        for (position, activity) in activities.iter().enumerate() {
            groups[resource_index[activity.resource.as_str()]].push(position);
        }

        let mut by_user: Vec<Vec<Edge>> = vec![Vec::new(); users.len()];
        let mut by_resource: Vec<Vec<Edge>> = vec![Vec::new(); resources.len()];
        let mut max_weight = 0.0_f64;

        for (resource, group) in groups.iter_mut().enumerate() {
            // sort_by is stable: equal timestamps keep input order
            group.sort_by(|&a, &b| activities[a].timestamp.cmp(&activities[b].timestamp));

            let total = group.len();
            let mut tie_rank = 1;

            for (offset, &position) in group.iter().enumerate() {
                let rank = match ties {
                    TiePolicy::Sequential => offset + 1,
                    TiePolicy::Shared => {
                        let starts_run = offset == 0
                            || activities[group[offset - 1]].timestamp
                                != activities[position].timestamp;
                        if starts_run {
                            tie_rank = offset + 1;
                        }
                        tie_rank
                    }
                };

                let weight = credit.credit(rank, total);
                if !weight.is_finite() || weight < 0.0 {
                    return Err(SpearError::InvalidCredit { rank, total, value: weight });
                }

                max_weight = max_weight.max(weight);

                let user = user_index[activities[position].user.as_str()];
                by_user[user].push(Edge { node: resource, weight });
                by_resource[resource].push(Edge { node: user, weight });
            }
        }

        debug!(
            users = users.len(),
            resources = resources.len(),
            edges = activities.len(),
            credit = credit.name(),
            ties = ?ties,
            "Activity graph built"
        );

        Ok(Self {
            users,
            resources,
            by_user,
            by_resource,
            edge_count: activities.len(),
            max_weight,
        })
    }

    /// User identifiers in index order
    pub fn users(&self) -> &[String] {
        &self.users
    }

    /// Resource identifiers in index order
    pub fn resources(&self) -> &[String] {
        &self.resources
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    /// One edge per activity
    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    /// Largest credit weight in the graph
    pub fn max_weight(&self) -> f64 {
        self.max_weight
    }

    /// Dense index of a user
    pub fn user_index(&self, user: &str) -> Option<usize> {
        self.users.binary_search_by(|u| u.as_str().cmp(user)).ok()
    }

    /// Dense index of a resource
    pub fn resource_index(&self, resource: &str) -> Option<usize> {
        self.resources.binary_search_by(|r| r.as_str().cmp(resource)).ok()
    }

    /// Resources acted on by a user, with weights
    pub fn user_edges(&self, user: usize) -> &[Edge] {
        self.by_user.get(user).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Users who acted on a resource, with weights
    pub fn resource_edges(&self, resource: usize) -> &[Edge] {
        self.by_resource.get(resource).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub(crate) fn user_adjacency(&self) -> &[Vec<Edge>] {
        &self.by_user
    }

    pub(crate) fn resource_adjacency(&self) -> &[Vec<Edge>] {
        &self.by_resource
    }
}

/// Distinct identifiers in ascending order plus their dense indexes
fn index_entities<'a>(
    ids: impl Iterator<Item = &'a str>,
) -> (Vec<String>, BTreeMap<&'a str, usize>) {
    let distinct: BTreeSet<&str> = ids.collect();
    let names = distinct.iter().map(|id| id.to_string()).collect();
    let index = distinct.into_iter().enumerate().map(|(i, id)| (id, i)).collect();
    (names, index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credit::{ConstantCredit, ReciprocalCredit};

    fn sequential<C>(activities: &[Activity<i32>], credit: &C) -> Result<ActivityGraph>
    where
        C: CreditFunction,
    {
        ActivityGraph::build(activities, credit, TiePolicy::Sequential)
    }

    fn weight_of(graph: &ActivityGraph, user: &str, resource: &str) -> Vec<f64> {
        let u = graph.user_index(user).unwrap();
        let r = graph.resource_index(resource).unwrap();
        graph
            .user_edges(u)
            .iter()
            .filter(|e| e.node == r)
            .map(|e| e.weight)
            .collect()
    }

    #[test]
    fn test_graph_construction() {
        let activities = vec![
            Activity::new(1, "alice", "R"),
            Activity::new(2, "bob", "R"),
            Activity::new(3, "bob", "S"),
        ];
        let graph = sequential(&activities, &ConstantCredit).unwrap();

        assert_eq!(graph.users(), ["alice", "bob"]);
        assert_eq!(graph.resources(), ["R", "S"]);
        assert_eq!(graph.edge_count(), 3);
        assert_eq!(graph.user_edges(graph.user_index("bob").unwrap()).len(), 2);
        assert_eq!(graph.resource_edges(graph.resource_index("R").unwrap()).len(), 2);
        assert!(graph.user_index("carol").is_none());
        assert_eq!(graph.max_weight(), 1.0);
    }

    #[test]
    fn test_empty_activity_list() {
        let activities: Vec<Activity<i32>> = Vec::new();
        let err = sequential(&activities, &ConstantCredit).unwrap_err();
        assert!(matches!(err, SpearError::InvalidInput { .. }));
    }

    #[test]
    fn test_blank_identifier_is_rejected() {
        let activities = vec![Activity::new(1, "alice", "R"), Activity::new(2, "", "R")];
        let err = sequential(&activities, &ConstantCredit).unwrap_err();
        match err {
            SpearError::InvalidInput { message } => {
                assert!(message.contains("activity 1"), "{}", message);
                assert!(message.contains("user"), "{}", message);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_ranks_follow_timestamps_not_input_order() {
        let activities = vec![
            Activity::new(3, "carol", "R"),
            Activity::new(1, "alice", "R"),
            Activity::new(2, "bob", "R"),
        ];
        let graph = sequential(&activities, &ReciprocalCredit).unwrap();

        assert_eq!(weight_of(&graph, "alice", "R"), vec![1.0]);
        assert_eq!(weight_of(&graph, "bob", "R"), vec![0.5]);
        assert_eq!(weight_of(&graph, "carol", "R"), vec![1.0 / 3.0]);
    }

    #[test]
    fn test_sequential_ties_use_input_order() {
        let activities = vec![Activity::new(5, "bob", "R"), Activity::new(5, "alice", "R")];
        let graph = sequential(&activities, &ReciprocalCredit).unwrap();

        assert_eq!(weight_of(&graph, "bob", "R"), vec![1.0]);
        assert_eq!(weight_of(&graph, "alice", "R"), vec![0.5]);
    }

    #[test]
    fn test_shared_ties_take_first_rank() {
        // Followers-including-self credit: timestamps 1,1,1,2,3,3,4,4,5,6
        // give 10,10,10,7,6,6,4,4,2,1
        let followers = |rank: usize, total: usize| (total - rank + 1) as f64;
        let timestamps = [1, 1, 1, 2, 3, 3, 4, 4, 5, 6];
        let activities: Vec<Activity<i32>> = timestamps
            .iter()
            .enumerate()
            .map(|(i, &t)| Activity::new(t, format!("user{:02}", i), "R"))
            .collect();

        let graph = ActivityGraph::build(&activities, &followers, TiePolicy::Shared).unwrap();

        let expected = [10.0, 10.0, 10.0, 7.0, 6.0, 6.0, 4.0, 4.0, 2.0, 1.0];
        for (i, want) in expected.iter().enumerate() {
            assert_eq!(weight_of(&graph, &format!("user{:02}", i), "R"), vec![*want]);
        }
    }

    #[test]
    fn test_repeated_activity_counted_separately() {
        let activities = vec![
            Activity::new(1, "alice", "R"),
            Activity::new(2, "alice", "R"),
            Activity::new(3, "bob", "R"),
        ];
        let graph = sequential(&activities, &ReciprocalCredit).unwrap();

        assert_eq!(graph.edge_count(), 3);
        assert_eq!(weight_of(&graph, "alice", "R"), vec![1.0, 0.5]);
        assert_eq!(graph.resource_edges(0).len(), 3);
    }

    #[test]
    fn test_both_directions_share_weights() {
        let activities = vec![
            Activity::new(4, "alice", "R"),
            Activity::new(1, "bob", "R"),
            Activity::new(2, "bob", "S"),
            Activity::new(3, "carol", "S"),
            Activity::new(9, "carol", "T"),
        ];
        let graph = sequential(&activities, &ReciprocalCredit).unwrap();

        let forward: f64 = (0..graph.user_count())
            .flat_map(|u| graph.user_edges(u))
            .map(|e| e.weight)
            .sum();
        let backward: f64 = (0..graph.resource_count())
            .flat_map(|r| graph.resource_edges(r))
            .map(|e| e.weight)
            .sum();
        assert!((forward - backward).abs() < 1e-12);

        for r in 0..graph.resource_count() {
            for edge in graph.resource_edges(r) {
                assert!(graph
                    .user_edges(edge.node)
                    .iter()
                    .any(|back| back.node == r && back.weight == edge.weight));
            }
        }
    }

    #[test]
    fn test_earlier_actor_never_weighted_less() {
        let activities = vec![Activity::new(20, "late", "R"), Activity::new(10, "early", "R")];
        let graph = sequential(&activities, &ReciprocalCredit).unwrap();

        assert!(weight_of(&graph, "early", "R")[0] >= weight_of(&graph, "late", "R")[0]);
    }

    #[test]
    fn test_negative_credit_rejected() {
        let negative = |_rank: usize, _total: usize| -1.0;
        let activities = vec![Activity::new(1, "alice", "R")];
        let err = ActivityGraph::build(&activities, &negative, TiePolicy::Sequential).unwrap_err();
        assert!(matches!(
            err,
            SpearError::InvalidCredit { rank: 1, total: 1, .. }
        ));
    }

    #[test]
    fn test_nan_credit_rejected() {
        let broken = |rank: usize, total: usize| if rank == total { f64::NAN } else { 1.0 };
        let activities = vec![Activity::new(1, "alice", "R"), Activity::new(2, "bob", "R")];
        let err = ActivityGraph::build(&activities, &broken, TiePolicy::Sequential).unwrap_err();
        assert!(matches!(
            err,
            SpearError::InvalidCredit { rank: 2, total: 2, .. }
        ));
    }

    #[test]
    fn test_tie_policy_parsing() {
        assert_eq!("shared".parse::<TiePolicy>().unwrap(), TiePolicy::Shared);
        assert_eq!("Sequential".parse::<TiePolicy>().unwrap(), TiePolicy::Sequential);
        assert!("random".parse::<TiePolicy>().is_err());
    }
}
