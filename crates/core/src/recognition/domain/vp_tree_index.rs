use crate::shared::embedding::Embedding;

/// Vantage-point tree over gallery embeddings.
///
/// Exact nearest-neighbour search in Euclidean space: every subtree that
/// could hold a point at least as close as the best so far is visited, so
/// the answer equals brute force, including the lowest-index rule on ties.
#[derive(Debug)]
pub struct VpTreeIndex {
    points: Vec<Embedding>,
    root: Option<Box<Node>>,
}

#[derive(Debug)]
struct Node {
    point: usize,
    radius: f32,
    /// Points with distance to the vantage point `<= radius`.
    inside: Option<Box<Node>>,
    /// Points with distance `>= radius`.
    outside: Option<Box<Node>>,
}

#[derive(Clone, Copy)]
struct Best {
    index: usize,
    distance: f32,
}

impl VpTreeIndex {
    pub fn build(points: Vec<Embedding>) -> Self {
        let indices: Vec<usize> = (0..points.len()).collect();
        let root = build_node(&points, indices);
        Self { points, root }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Index into the build order and distance of the closest point.
    pub fn nearest(&self, query: &Embedding) -> Option<(usize, f32)> {
        let mut best: Option<Best> = None;
        if let Some(root) = &self.root {
            self.search(root, query, &mut best);
        }
        best.filter(|b| b.distance.is_finite())
            .map(|b| (b.index, b.distance))
    }

    fn search(&self, node: &Node, query: &Embedding, best: &mut Option<Best>) {
        let d = query.distance(&self.points[node.point]);
        let improves = match best {
            None => true,
            Some(b) => d < b.distance || (d == b.distance && node.point < b.index),
        };
        if improves {
            *best = Some(Best {
                index: node.point,
                distance: d,
            });
        }
        if !d.is_finite() {
            return;
        }

        let bound = |best: &Option<Best>| best.map_or(f32::INFINITY, |b| b.distance);
        if d < node.radius {
            if let Some(inside) = &node.inside {
                self.search(inside, query, best);
            }
            if let Some(outside) = &node.outside {
                if d + bound(best) >= node.radius {
                    self.search(outside, query, best);
                }
            }
        } else {
            if let Some(outside) = &node.outside {
                self.search(outside, query, best);
            }
            if let Some(inside) = &node.inside {
                if d - bound(best) <= node.radius {
                    self.search(inside, query, best);
                }
            }
        }
    }
}

fn build_node(points: &[Embedding], mut indices: Vec<usize>) -> Option<Box<Node>> {
    if indices.is_empty() {
        return None;
    }
    let vantage = indices.remove(0);
    if indices.is_empty() {
        return Some(Box::new(Node {
            point: vantage,
            radius: 0.0,
            inside: None,
            outside: None,
        }));
    }

    let mut by_distance: Vec<(usize, f32)> = indices
        .into_iter()
        .map(|i| (i, points[vantage].distance(&points[i])))
        .collect();
    by_distance.sort_by(|a, b| {
        a.1.partial_cmp(&b.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
    let median = by_distance.len() / 2;
    let radius = by_distance[median].1;
    let outside: Vec<usize> = by_distance.split_off(median).into_iter().map(|(i, _)| i).collect();
    let inside: Vec<usize> = by_distance.into_iter().map(|(i, _)| i).collect();

    Some(Box::new(Node {
        point: vantage,
        radius,
        inside: build_node(points, inside),
        outside: build_node(points, outside),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brute_force(points: &[Embedding], query: &Embedding) -> Option<(usize, f32)> {
        let mut best: Option<(usize, f32)> = None;
        for (i, p) in points.iter().enumerate() {
            let d = query.distance(p);
            if best.map_or(true, |(_, bd)| d < bd) {
                best = Some((i, d));
            }
        }
        best
    }

    /// Deterministic pseudo-random embeddings.
    fn points(n: usize, dim: usize, seed: u32) -> Vec<Embedding> {
        let mut state = seed;
        (0..n)
            .map(|_| {
                Embedding::new(
                    (0..dim)
                        .map(|_| {
                            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                            (state >> 8) as f32 / (1u32 << 24) as f32
                        })
                        .collect(),
                )
            })
            .collect()
    }

    #[test]
    fn test_empty_index_has_no_neighbour() {
        let index = VpTreeIndex::build(vec![]);
        assert!(index.is_empty());
        assert!(index.nearest(&Embedding::new(vec![0.0])).is_none());
    }

    #[test]
    fn test_single_point() {
        let index = VpTreeIndex::build(vec![Embedding::new(vec![3.0, 4.0])]);
        assert_eq!(index.nearest(&Embedding::new(vec![0.0, 0.0])), Some((0, 5.0)));
    }

    #[test]
    fn test_agrees_with_brute_force() {
        let gallery = points(500, 16, 7);
        let queries = points(100, 16, 99);
        let index = VpTreeIndex::build(gallery.clone());

        for query in &queries {
            assert_eq!(index.nearest(query), brute_force(&gallery, query));
        }
    }

    #[test]
    fn test_exact_member_is_found() {
        let gallery = points(300, 8, 3);
        let index = VpTreeIndex::build(gallery.clone());
        for (i, p) in gallery.iter().enumerate().step_by(37) {
            assert_eq!(index.nearest(p), Some((i, 0.0)));
        }
    }

    #[test]
    fn test_duplicate_points_resolve_to_lowest_index() {
        let p = Embedding::new(vec![1.0, 1.0]);
        let index = VpTreeIndex::build(vec![
            Embedding::new(vec![5.0, 5.0]),
            p.clone(),
            p.clone(),
            p,
        ]);
        assert_eq!(index.nearest(&Embedding::new(vec![1.0, 1.5])).map(|r| r.0), Some(1));
    }

    #[test]
    fn test_dimension_mismatch_finds_nothing() {
        let index = VpTreeIndex::build(points(10, 4, 1));
        assert!(index.nearest(&Embedding::new(vec![0.0; 3])).is_none());
    }
}
