//! Vector distance primitives shared by search, clustering, and lifecycle

/// Cosine similarity between two vectors. Mismatched lengths or a zero norm
/// yield 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| *x as f64 * *y as f64).sum();
    let norm_a: f64 = a.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// Cosine distance `1 - similarity`. When either norm is 0 the distance is 1.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    1.0 - cosine_similarity(a, b)
}

/// Arithmetic mean per dimension. Empty input yields an empty vector.
pub fn centroid(vectors: &[&[f32]]) -> Vec<f32> {
    let Some(first) = vectors.first() else {
        return Vec::new();
    };

    let dim = first.len();
    let mut sum = vec![0.0f64; dim];
    for v in vectors {
        for (acc, x) in sum.iter_mut().zip(v.iter()) {
            *acc += *x as f64;
        }
    }

    let n = vectors.len() as f64;
    sum.into_iter().map(|x| (x / n) as f32).collect()
}

/// Mean pairwise cosine similarity of a set. Sets with fewer than two
/// members are perfectly coherent by definition.
pub fn coherence(vectors: &[&[f32]]) -> f64 {
    let n = vectors.len();
    if n < 2 {
        return 1.0;
    }

    let mut total = 0.0;
    let mut pairs = 0usize;
    for i in 0..n {
        for j in (i + 1)..n {
            total += cosine_similarity(vectors[i], vectors[j]);
            pairs += 1;
        }
    }
    total / pairs as f64
}

/// Silhouette coefficient for labeled points.
///
/// Per point: `(b - a) / max(a, b)` where `a` is the mean intra-cluster
/// distance and `b` the mean distance to the nearest other cluster. Averaged
/// over points belonging to a cluster with at least two members; points in
/// singleton clusters or without a second cluster to compare against are
/// skipped. Returns 0.0 when no point qualifies.
pub fn silhouette(points: &[(&[f32], i64)]) -> f64 {
    use std::collections::HashMap;

    let mut by_cluster: HashMap<i64, Vec<usize>> = HashMap::new();
    for (idx, (_, cluster)) in points.iter().enumerate() {
        by_cluster.entry(*cluster).or_default().push(idx);
    }

    if by_cluster.len() < 2 {
        return 0.0;
    }

    let mut total = 0.0;
    let mut counted = 0usize;

    for (idx, (vec, cluster)) in points.iter().enumerate() {
        let own = &by_cluster[cluster];
        if own.len() < 2 {
            continue;
        }

        let a: f64 = own
            .iter()
            .filter(|&&other| other != idx)
            .map(|&other| cosine_distance(vec, points[other].0))
            .sum::<f64>()
            / (own.len() - 1) as f64;

        let b = by_cluster
            .iter()
            .filter(|(other_cluster, _)| *other_cluster != cluster)
            .map(|(_, members)| {
                members
                    .iter()
                    .map(|&other| cosine_distance(vec, points[other].0))
                    .sum::<f64>()
                    / members.len() as f64
            })
            .fold(f64::INFINITY, f64::min);

        if !b.is_finite() {
            continue;
        }

        let denom = a.max(b);
        if denom > 0.0 {
            total += (b - a) / denom;
        }
        counted += 1;
    }

    if counted == 0 {
        0.0
    } else {
        total / counted as f64
    }
}
