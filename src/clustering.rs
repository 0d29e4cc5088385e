//! Density-based clustering over memory embeddings
//!
//! DBSCAN with cosine distance plus the maintenance passes that keep cluster
//! assignments healthy over time: incremental assignment for new points,
//! merging of near-duplicate clusters, and splitting of oversized
//! low-coherence ones.

use std::collections::{BTreeMap, HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::vector::{centroid, coherence, cosine_distance, cosine_similarity};

/// DBSCAN parameters
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DbscanParams {
    /// Cosine-distance neighborhood radius
    pub epsilon: f64,
    /// Minimum neighborhood size for a core point
    pub min_points: usize,
    /// Clusters smaller than this are discarded as noise
    pub min_cluster_size: usize,
}

impl Default for DbscanParams {
    fn default() -> Self {
        Self {
            epsilon: 0.3,
            min_points: 3,
            min_cluster_size: 2,
        }
    }
}

/// One embedded memory for clustering
#[derive(Debug, Clone)]
pub struct ClusterPoint {
    pub id: String,
    pub vector: Vec<f32>,
}

/// Output of a clustering run
#[derive(Debug, Clone, Default)]
pub struct ClusterAssignments {
    /// Cluster id to member memory ids
    pub clusters: BTreeMap<i64, Vec<String>>,
    /// Unassigned points
    pub noise: Vec<String>,
}

impl ClusterAssignments {
    /// Cluster id for a member, if assigned
    pub fn cluster_of(&self, id: &str) -> Option<i64> {
        self.clusters
            .iter()
            .find(|(_, members)| members.iter().any(|m| m == id))
            .map(|(cluster, _)| *cluster)
    }

    pub fn clustered_count(&self) -> usize {
        self.clusters.values().map(|m| m.len()).sum()
    }
}

const UNLABELED: i64 = 0;
const NOISE: i64 = -1;

/// DBSCAN over cosine distance. Cluster ids start at 1; clusters below
/// `min_cluster_size` are demoted to noise.
pub fn dbscan(points: &[ClusterPoint], params: &DbscanParams) -> ClusterAssignments {
    let n = points.len();
    let mut labels = vec![UNLABELED; n];
    let mut next_cluster = 1i64;

    for i in 0..n {
        if labels[i] != UNLABELED {
            continue;
        }

        let neighbors = region_query(points, i, params.epsilon);
        if neighbors.len() < params.min_points {
            labels[i] = NOISE;
            continue;
        }

        let cluster = next_cluster;
        next_cluster += 1;
        labels[i] = cluster;

        let mut frontier: VecDeque<usize> = neighbors.into_iter().collect();
        while let Some(j) = frontier.pop_front() {
            if labels[j] == NOISE {
                // Border point reachable from a core point
                labels[j] = cluster;
            }
            if labels[j] != UNLABELED {
                continue;
            }
            labels[j] = cluster;

            let j_neighbors = region_query(points, j, params.epsilon);
            if j_neighbors.len() >= params.min_points {
                frontier.extend(j_neighbors);
            }
        }
    }

    collect_assignments(points, &labels, params.min_cluster_size)
}

/// Neighborhood of a point, itself included (minPts counts the point)
fn region_query(points: &[ClusterPoint], idx: usize, epsilon: f64) -> Vec<usize> {
    let origin = &points[idx].vector;
    points
        .iter()
        .enumerate()
        .filter(|(j, p)| *j == idx || cosine_distance(origin, &p.vector) <= epsilon)
        .map(|(j, _)| j)
        .collect()
}

fn collect_assignments(
    points: &[ClusterPoint],
    labels: &[i64],
    min_cluster_size: usize,
) -> ClusterAssignments {
    let mut clusters: BTreeMap<i64, Vec<String>> = BTreeMap::new();
    let mut noise: Vec<String> = Vec::new();

    for (point, label) in points.iter().zip(labels.iter()) {
        if *label > 0 {
            clusters.entry(*label).or_default().push(point.id.clone());
        } else {
            noise.push(point.id.clone());
        }
    }

    // Small clusters are not worth keeping
    let too_small: Vec<i64> = clusters
        .iter()
        .filter(|(_, members)| members.len() < min_cluster_size)
        .map(|(id, _)| *id)
        .collect();
    for id in too_small {
        if let Some(members) = clusters.remove(&id) {
            noise.extend(members);
        }
    }

    ClusterAssignments { clusters, noise }
}

/// Incremental DBSCAN: cluster `existing ∪ fresh`, keep existing cluster ids
/// stable where possible, and return assignments for the fresh points only.
pub fn incremental_dbscan(
    existing: &[(ClusterPoint, Option<i64>)],
    fresh: &[ClusterPoint],
    params: &DbscanParams,
) -> BTreeMap<String, i64> {
    let mut all: Vec<ClusterPoint> = Vec::with_capacity(existing.len() + fresh.len());
    all.extend(existing.iter().map(|(p, _)| p.clone()));
    all.extend(fresh.iter().cloned());

    let result = dbscan(&all, params);

    let prior: HashMap<&str, i64> = existing
        .iter()
        .filter_map(|(p, label)| label.map(|l| (p.id.as_str(), l)))
        .collect();
    let mut next_id = prior.values().copied().max().unwrap_or(0) + 1;

    // Map each result cluster onto the dominant prior id among its members
    let mut stable: HashMap<i64, i64> = HashMap::new();
    for (cluster, members) in &result.clusters {
        let mut votes: HashMap<i64, usize> = HashMap::new();
        for member in members {
            if let Some(prior_id) = prior.get(member.as_str()) {
                *votes.entry(*prior_id).or_insert(0) += 1;
            }
        }
        let id = votes
            .into_iter()
            .max_by_key(|(_, count)| *count)
            .map(|(id, _)| id)
            .unwrap_or_else(|| {
                let id = next_id;
                next_id += 1;
                id
            });
        stable.insert(*cluster, id);
    }

    let fresh_ids: std::collections::HashSet<&str> =
        fresh.iter().map(|p| p.id.as_str()).collect();
    let mut assignments: BTreeMap<String, i64> = BTreeMap::new();
    for (cluster, members) in &result.clusters {
        for member in members {
            if fresh_ids.contains(member.as_str()) {
                assignments.insert(member.clone(), stable[cluster]);
            }
        }
    }
    assignments
}

/// Merge clusters whose centroids are at least `tau` cosine-similar; the
/// second cluster's members move into the first. Returns merge count.
pub fn merge_similar_clusters(
    assignments: &mut ClusterAssignments,
    vectors: &HashMap<String, Vec<f32>>,
    tau: f64,
) -> usize {
    let ids: Vec<i64> = assignments.clusters.keys().copied().collect();
    let mut centroids: HashMap<i64, Vec<f32>> = ids
        .iter()
        .filter_map(|id| {
            cluster_centroid(&assignments.clusters[id], vectors).map(|c| (*id, c))
        })
        .collect();

    let mut merged = 0usize;
    for i in 0..ids.len() {
        for j in (i + 1)..ids.len() {
            let (keep, absorb) = (ids[i], ids[j]);
            if !assignments.clusters.contains_key(&keep)
                || !assignments.clusters.contains_key(&absorb)
            {
                continue;
            }
            let (Some(a), Some(b)) = (centroids.get(&keep), centroids.get(&absorb)) else {
                continue;
            };
            if cosine_similarity(a, b) >= tau {
                let members = assignments.clusters.remove(&absorb).unwrap_or_default();
                assignments
                    .clusters
                    .get_mut(&keep)
                    .expect("keep cluster exists")
                    .extend(members);
                centroids.remove(&absorb);
                if let Some(c) = cluster_centroid(&assignments.clusters[&keep], vectors) {
                    centroids.insert(keep, c);
                }
                merged += 1;
            }
        }
    }
    merged
}

/// Split clusters larger than `max_size` whose coherence falls below
/// `min_coherence`, re-running DBSCAN with a tighter epsilon. Sub-cluster ids
/// derive from the parent as `parent * 1000 + k`. Members that the tighter
/// pass rejects stay in the parent cluster. Returns split count.
pub fn split_large_clusters(
    assignments: &mut ClusterAssignments,
    vectors: &HashMap<String, Vec<f32>>,
    max_size: usize,
    min_coherence: f64,
) -> usize {
    let tighter = DbscanParams {
        epsilon: 0.2,
        min_points: 3,
        min_cluster_size: 2,
    };

    let candidates: Vec<i64> = assignments
        .clusters
        .iter()
        .filter(|(_, members)| members.len() > max_size)
        .map(|(id, _)| *id)
        .collect();

    let mut splits = 0usize;
    for parent in candidates {
        let members = assignments.clusters[&parent].clone();
        let member_vectors: Vec<&[f32]> = members
            .iter()
            .filter_map(|id| vectors.get(id).map(|v| v.as_slice()))
            .collect();
        if coherence(&member_vectors) >= min_coherence {
            continue;
        }

        let points: Vec<ClusterPoint> = members
            .iter()
            .filter_map(|id| {
                vectors.get(id).map(|v| ClusterPoint {
                    id: id.clone(),
                    vector: v.clone(),
                })
            })
            .collect();
        let sub = dbscan(&points, &tighter);
        if sub.clusters.len() < 2 {
            continue;
        }

        let mut leftover = members;
        for (k, (_, sub_members)) in sub.clusters.iter().enumerate() {
            let sub_id = parent * 1000 + (k as i64 + 1);
            leftover.retain(|id| !sub_members.contains(id));
            assignments.clusters.insert(sub_id, sub_members.clone());
        }
        if leftover.is_empty() {
            assignments.clusters.remove(&parent);
        } else {
            assignments.clusters.insert(parent, leftover);
        }
        splits += 1;
    }
    splits
}

fn cluster_centroid(
    members: &[String],
    vectors: &HashMap<String, Vec<f32>>,
) -> Option<Vec<f32>> {
    let member_vectors: Vec<&[f32]> = members
        .iter()
        .filter_map(|id| vectors.get(id).map(|v| v.as_slice()))
        .collect();
    if member_vectors.is_empty() {
        None
    } else {
        Some(centroid(&member_vectors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(id: &str, vector: Vec<f32>) -> ClusterPoint {
        ClusterPoint {
            id: id.to_string(),
            vector,
        }
    }

    /// Two tight bundles around orthogonal axes plus one outlier
    fn two_bundles() -> Vec<ClusterPoint> {
        vec![
            point("a1", vec![1.0, 0.0, 0.0]),
            point("a2", vec![0.99, 0.05, 0.0]),
            point("a3", vec![0.98, 0.0, 0.05]),
            point("b1", vec![0.0, 1.0, 0.0]),
            point("b2", vec![0.05, 0.99, 0.0]),
            point("b3", vec![0.0, 0.98, 0.05]),
            point("outlier", vec![0.57, 0.57, 0.57]),
        ]
    }

    #[test]
    fn test_dbscan_two_clusters_plus_noise() {
        let result = dbscan(&two_bundles(), &DbscanParams::default());
        assert_eq!(result.clusters.len(), 2);
        assert_eq!(result.noise, vec!["outlier"]);
        assert_eq!(result.clustered_count(), 6);
    }

    #[test]
    fn test_dbscan_discards_small_clusters() {
        let points = vec![
            point("a1", vec![1.0, 0.0]),
            point("a2", vec![0.99, 0.01]),
        ];
        let params = DbscanParams {
            epsilon: 0.3,
            min_points: 2,
            min_cluster_size: 3,
        };
        let result = dbscan(&points, &params);
        assert!(result.clusters.is_empty());
        assert_eq!(result.noise.len(), 2);
    }

    #[test]
    fn test_dbscan_deterministic() {
        let points = two_bundles();
        let a = dbscan(&points, &DbscanParams::default());
        let b = dbscan(&points, &DbscanParams::default());
        assert_eq!(a.clusters, b.clusters);
        assert_eq!(a.noise, b.noise);
    }

    #[test]
    fn test_incremental_keeps_existing_ids() {
        let params = DbscanParams::default();
        let existing: Vec<(ClusterPoint, Option<i64>)> = vec![
            (point("a1", vec![1.0, 0.0, 0.0]), Some(7)),
            (point("a2", vec![0.99, 0.05, 0.0]), Some(7)),
            (point("a3", vec![0.98, 0.0, 0.05]), Some(7)),
        ];
        let fresh = vec![point("a4", vec![0.97, 0.02, 0.02])];

        let assignments = incremental_dbscan(&existing, &fresh, &params);
        assert_eq!(assignments.get("a4"), Some(&7));
        // Only fresh points are reported
        assert_eq!(assignments.len(), 1);
    }

    #[test]
    fn test_incremental_allocates_new_id_for_new_cluster() {
        let params = DbscanParams::default();
        let existing: Vec<(ClusterPoint, Option<i64>)> = vec![
            (point("a1", vec![1.0, 0.0, 0.0]), Some(3)),
            (point("a2", vec![0.99, 0.05, 0.0]), Some(3)),
            (point("a3", vec![0.98, 0.0, 0.05]), Some(3)),
        ];
        let fresh = vec![
            point("b1", vec![0.0, 1.0, 0.0]),
            point("b2", vec![0.05, 0.99, 0.0]),
            point("b3", vec![0.0, 0.98, 0.05]),
        ];

        let assignments = incremental_dbscan(&existing, &fresh, &params);
        let new_id = assignments.get("b1").copied().unwrap();
        assert!(new_id > 3);
        assert_eq!(assignments.get("b2"), Some(&new_id));
    }

    #[test]
    fn test_merge_similar_clusters() {
        let mut vectors = HashMap::new();
        vectors.insert("a1".to_string(), vec![1.0, 0.0]);
        vectors.insert("a2".to_string(), vec![0.99, 0.01]);
        vectors.insert("b1".to_string(), vec![0.98, 0.02]);
        vectors.insert("b2".to_string(), vec![0.97, 0.01]);
        vectors.insert("c1".to_string(), vec![0.0, 1.0]);
        vectors.insert("c2".to_string(), vec![0.01, 0.99]);

        let mut assignments = ClusterAssignments::default();
        assignments
            .clusters
            .insert(1, vec!["a1".into(), "a2".into()]);
        assignments
            .clusters
            .insert(2, vec!["b1".into(), "b2".into()]);
        assignments
            .clusters
            .insert(3, vec!["c1".into(), "c2".into()]);

        let merged = merge_similar_clusters(&mut assignments, &vectors, 0.8);
        assert_eq!(merged, 1);
        assert_eq!(assignments.clusters.len(), 2);
        assert_eq!(assignments.clusters[&1].len(), 4);
        assert!(assignments.clusters.contains_key(&3));
    }

    #[test]
    fn test_split_large_low_coherence_cluster() {
        // Cluster 5 holds two orthogonal bundles, so coherence is poor
        let mut vectors = HashMap::new();
        let mut members = Vec::new();
        for i in 0..4 {
            let id = format!("x{i}");
            vectors.insert(id.clone(), vec![1.0, 0.001 * i as f32, 0.0]);
            members.push(id);
        }
        for i in 0..4 {
            let id = format!("y{i}");
            vectors.insert(id.clone(), vec![0.0, 1.0, 0.001 * i as f32]);
            members.push(id);
        }

        let mut assignments = ClusterAssignments::default();
        assignments.clusters.insert(5, members);

        let splits = split_large_clusters(&mut assignments, &vectors, 4, 0.5);
        assert_eq!(splits, 1);
        assert!(assignments.clusters.contains_key(&5001));
        assert!(assignments.clusters.contains_key(&5002));
        assert!(!assignments.clusters.contains_key(&5));
    }

    #[test]
    fn test_split_skips_coherent_clusters() {
        let mut vectors = HashMap::new();
        let mut members = Vec::new();
        for i in 0..6 {
            let id = format!("x{i}");
            vectors.insert(id.clone(), vec![1.0, 0.001 * i as f32]);
            members.push(id);
        }
        let mut assignments = ClusterAssignments::default();
        assignments.clusters.insert(1, members);

        let splits = split_large_clusters(&mut assignments, &vectors, 4, 0.5);
        assert_eq!(splits, 0);
        assert_eq!(assignments.clusters[&1].len(), 6);
    }
}
