//! Greedy Claim Clustering
//!
//! Groups near-duplicate claims so each cluster resolves to one origin.
//! Items are compared against each existing cluster's key (its first
//! member's text) and join the first cluster scoring above the threshold,
//! so the outcome is deterministic for a given input order. Callers feed
//! date-sorted items, which makes each cluster's first member its
//! chronologically earliest appearance.

/// One cluster of near-duplicate claims, holding indices into the
/// caller's item list.
#[derive(Debug, Clone)]
pub struct ClaimCluster {
    /// Normalized text of the first member, used for all comparisons
    pub key: String,
    /// Indices of members in input order
    pub member_indices: Vec<usize>,
}

impl ClaimCluster {
    /// Index of the cluster's earliest member (first in input order)
    pub fn representative(&self) -> usize {
        self.member_indices[0]
    }
}

/// Cluster pre-normalized keys greedily. `similarity` scores two keys in
/// [0, 1]; an item joins the first cluster scoring strictly above
/// `threshold`, otherwise it starts a new cluster.
pub fn cluster_claims<F>(keys: &[String], similarity: F, threshold: f64) -> Vec<ClaimCluster>
where
    F: Fn(&str, &str) -> f64,
{
    let mut clusters: Vec<ClaimCluster> = Vec::new();
    for (index, key) in keys.iter().enumerate() {
        let joined = clusters
            .iter_mut()
            .find(|cluster| similarity(&cluster.key, key) > threshold);
        match joined {
            Some(cluster) => cluster.member_indices.push(index),
            None => clusters.push(ClaimCluster {
                key: key.clone(),
                member_indices: vec![index],
            }),
        }
    }
    clusters
}
