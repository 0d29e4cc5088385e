//! Clustering scenarios over synthetic embeddings
//!
//! Run with: cargo test --test clustering_test

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use memoria::clustering::{
    dbscan, incremental_dbscan, merge_similar_clusters, split_large_clusters, ClusterPoint,
    DbscanParams,
};
use memoria::vector::{cosine_similarity, silhouette};

/// Unit vector near `base` with small deterministic jitter
fn jittered(rng: &mut StdRng, base: &[f32], scale: f32) -> Vec<f32> {
    let mut v: Vec<f32> = base
        .iter()
        .map(|x| x + rng.gen_range(-scale..scale))
        .collect();
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    for x in &mut v {
        *x /= norm;
    }
    v
}

/// Two dense bundles around orthogonal axes plus scattered outliers
fn two_dense_clusters_with_outliers() -> Vec<ClusterPoint> {
    let mut rng = StdRng::seed_from_u64(42);
    let mut points = Vec::new();

    let axis_a = [1.0, 0.0, 0.0, 0.0];
    let axis_b = [0.0, 1.0, 0.0, 0.0];
    for i in 0..6 {
        points.push(ClusterPoint {
            id: format!("a{i}"),
            vector: jittered(&mut rng, &axis_a, 0.05),
        });
        points.push(ClusterPoint {
            id: format!("b{i}"),
            vector: jittered(&mut rng, &axis_b, 0.05),
        });
    }
    // Outliers sit between and away from both bundles
    points.push(ClusterPoint {
        id: "noise1".into(),
        vector: vec![0.5, 0.5, 0.7, 0.0],
    });
    points.push(ClusterPoint {
        id: "noise2".into(),
        vector: vec![0.0, 0.0, 0.0, 1.0],
    });
    points
}

#[test]
fn dbscan_finds_two_clusters_and_noise() {
    let points = two_dense_clusters_with_outliers();
    let result = dbscan(
        &points,
        &DbscanParams {
            epsilon: 0.3,
            min_points: 3,
            min_cluster_size: 2,
        },
    );

    assert_eq!(result.clusters.len(), 2, "noise: {:?}", result.noise);
    assert!(!result.noise.is_empty());
    assert_eq!(result.clustered_count(), 12);

    // Members of a cluster share a prefix by construction
    for members in result.clusters.values() {
        let prefix = &members[0][..1];
        assert!(members.iter().all(|m| m.starts_with(prefix)));
    }
}

#[test]
fn dbscan_silhouette_is_positive_for_separated_clusters() {
    let points = two_dense_clusters_with_outliers();
    let result = dbscan(&points, &DbscanParams::default());

    let point_by_id: HashMap<&str, &ClusterPoint> =
        points.iter().map(|p| (p.id.as_str(), p)).collect();

    let labeled: Vec<(&[f32], i64)> = result
        .clusters
        .iter()
        .flat_map(|(cluster, members)| {
            members.iter().map(|id| {
                let point = point_by_id[id.as_str()];
                (point.vector.as_slice(), *cluster)
            })
        })
        .collect();

    assert!(silhouette(&labeled) > 0.0);
}

#[test]
fn incremental_assignment_joins_nearest_cluster() {
    let mut rng = StdRng::seed_from_u64(7);
    let axis = [1.0, 0.0, 0.0, 0.0];

    let existing: Vec<(ClusterPoint, Option<i64>)> = (0..5)
        .map(|i| {
            (
                ClusterPoint {
                    id: format!("e{i}"),
                    vector: jittered(&mut rng, &axis, 0.05),
                },
                Some(11),
            )
        })
        .collect();
    let fresh = vec![ClusterPoint {
        id: "new".into(),
        vector: jittered(&mut rng, &axis, 0.05),
    }];

    let assignments = incremental_dbscan(&existing, &fresh, &DbscanParams::default());
    assert_eq!(assignments.get("new"), Some(&11));
}

#[test]
fn merge_then_split_round() {
    let mut rng = StdRng::seed_from_u64(99);
    let axis = [1.0, 0.0, 0.0, 0.0];
    let other = [0.0, 0.0, 1.0, 0.0];

    let mut vectors: HashMap<String, Vec<f32>> = HashMap::new();
    let points: Vec<ClusterPoint> = (0..8)
        .map(|i| {
            let base = if i < 4 { &axis } else { &other };
            let p = ClusterPoint {
                id: format!("p{i}"),
                vector: jittered(&mut rng, base, 0.03),
            };
            vectors.insert(p.id.clone(), p.vector.clone());
            p
        })
        .collect();

    // Artificially split the first bundle into clusters 1 and 2
    let mut assignments = dbscan(&points, &DbscanParams::default());
    let first_cluster: Vec<String> = assignments.clusters.values().next().unwrap().clone();
    if assignments.clusters.len() == 2 && first_cluster.len() == 4 {
        let moved: Vec<String> = first_cluster[..2].to_vec();
        assignments
            .clusters
            .get_mut(&1)
            .unwrap()
            .retain(|id| !moved.contains(id));
        assignments.clusters.insert(99, moved);
    }

    let merged = merge_similar_clusters(&mut assignments, &vectors, 0.8);
    assert!(merged >= 1);

    // Centroid check: merged clusters really are similar
    for members in assignments.clusters.values() {
        let any = &vectors[&members[0]];
        for member in members {
            assert!(cosine_similarity(any, &vectors[member]) > 0.5);
        }
    }

    // Nothing here is big enough to split
    let split = split_large_clusters(&mut assignments, &vectors, 100, 0.5);
    assert_eq!(split, 0);
}

#[test]
fn split_separates_low_coherence_cluster() {
    let mut rng = StdRng::seed_from_u64(5);
    let axis_a = [1.0, 0.0, 0.0, 0.0];
    let axis_b = [0.0, 1.0, 0.0, 0.0];

    let mut vectors: HashMap<String, Vec<f32>> = HashMap::new();
    let mut members = Vec::new();
    for i in 0..5 {
        let id = format!("a{i}");
        vectors.insert(id.clone(), jittered(&mut rng, &axis_a, 0.03));
        members.push(id);
        let id = format!("b{i}");
        vectors.insert(id.clone(), jittered(&mut rng, &axis_b, 0.03));
        members.push(id);
    }

    let mut assignments = memoria::clustering::ClusterAssignments::default();
    assignments.clusters.insert(3, members);

    let split = split_large_clusters(&mut assignments, &vectors, 6, 0.5);
    assert_eq!(split, 1);
    assert!(assignments.clusters.contains_key(&3001));
    assert!(assignments.clusters.contains_key(&3002));

    // Sub-clusters are pure
    for (id, members) in &assignments.clusters {
        if *id >= 3001 {
            let prefix = &members[0][..1];
            assert!(members.iter().all(|m| m.starts_with(prefix)));
        }
    }
}
