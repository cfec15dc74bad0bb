/*!
HNSW vector index (spec §4.5): approximate nearest-neighbor search over
fixed-width float vectors, with incremental insert/remove and row-group
remapping after compaction.
*/

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{ParqueError, Result};

/// Distance metric used to rank neighbors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Cosine,
    L2,
    Dot,
}

impl Metric {
    /// Lower is closer for every metric: cosine and dot are negated so the
    /// search heap can always treat "smaller distance" as "better".
    fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Metric::L2 => a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f32>()
                .sqrt(),
            Metric::Dot => -dot(a, b),
            Metric::Cosine => {
                let denom = norm(a) * norm(b);
                if denom == 0.0 {
                    1.0
                } else {
                    1.0 - dot(a, b) / denom
                }
            }
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn norm(a: &[f32]) -> f32 {
    dot(a, a).sqrt()
}

/// Tunable HNSW construction/search parameters.
#[derive(Debug, Clone, Copy)]
pub struct HnswParams {
    /// Max bidirectional links per node per layer (beyond layer 0).
    pub m: usize,
    /// Candidate list size used while inserting.
    pub ef_construction: usize,
    /// Candidate list size used while searching, unless overridden per-query.
    pub ef_search: usize,
}

impl Default for HnswParams {
    fn default() -> Self {
        HnswParams {
            m: 16,
            ef_construction: 200,
            ef_search: 50,
        }
    }
}

/// A single indexed vector plus the document/location it belongs to.
#[derive(Debug, Clone)]
struct Node {
    vector: Vec<f32>,
    row_group: u16,
    row_offset: u64,
    doc_id: Vec<u8>,
    layer: usize,
    /// Per-layer neighbor lists, indexed by layer.
    neighbors: Vec<Vec<usize>>,
    /// Tombstoned nodes stay in the arena (removing would invalidate
    /// neighbor indices) but are skipped by search and removable on compaction.
    deleted: bool,
}

/// A single search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub doc_id: Vec<u8>,
    pub row_group: u16,
    pub row_offset: u64,
    pub distance: f32,
}

#[derive(PartialEq)]
struct ScoredCandidate {
    distance: f32,
    index: usize,
}
impl Eq for ScoredCandidate {}
impl Ord for ScoredCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .distance
            .partial_cmp(&self.distance)
            .unwrap_or(Ordering::Equal)
    }
}
impl PartialOrd for ScoredCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// An HNSW graph index over fixed-width vectors.
pub struct HnswIndex {
    dim: usize,
    metric: Metric,
    params: HnswParams,
    nodes: Vec<Node>,
    entry_point: Option<usize>,
    max_layer: usize,
    level_lambda: f64,
}

impl HnswIndex {
    /// Build an empty index for `dim`-dimensional vectors.
    pub fn new(dim: usize, metric: Metric, params: HnswParams) -> Self {
        HnswIndex {
            dim,
            metric,
            params,
            nodes: Vec::new(),
            entry_point: None,
            max_layer: 0,
            level_lambda: 1.0 / (params.m.max(2) as f64).ln(),
        }
    }

    fn random_layer(&self) -> usize {
        let r: f64 = rand::thread_rng().gen_range(f64::MIN_POSITIVE..1.0);
        (-r.ln() * self.level_lambda).floor() as usize
    }

    /// Insert one vector, returning its internal node index.
    pub fn insert(
        &mut self,
        vector: Vec<f32>,
        row_group: u16,
        row_offset: u64,
        doc_id: Vec<u8>,
    ) -> Result<usize> {
        if vector.len() != self.dim {
            return Err(ParqueError::Decode(format!(
                "vector has dimension {} but index expects {}",
                vector.len(),
                self.dim
            )));
        }
        let layer = self.random_layer();
        let node_index = self.nodes.len();
        self.nodes.push(Node {
            vector,
            row_group,
            row_offset,
            doc_id,
            layer,
            neighbors: vec![Vec::new(); layer + 1],
            deleted: false,
        });

        let Some(entry_point) = self.entry_point else {
            self.entry_point = Some(node_index);
            self.max_layer = layer;
            return Ok(node_index);
        };

        let mut current = entry_point;
        for lc in (layer + 1..=self.max_layer).rev() {
            current = self.greedy_descend(current, node_index, lc);
        }

        for lc in (0..=layer.min(self.max_layer)).rev() {
            let candidates = self.search_layer(node_index, current, self.params.ef_construction, lc);
            let selected = self.select_neighbors(&candidates, self.params.m);
            for &neighbor in &selected {
                self.connect(node_index, neighbor, lc);
                self.connect(neighbor, node_index, lc);
                self.prune(neighbor, lc);
            }
            if let Some(&best) = selected.first() {
                current = best;
            }
        }

        if layer > self.max_layer {
            self.max_layer = layer;
            self.entry_point = Some(node_index);
        }
        Ok(node_index)
    }

    fn vector_distance(&self, a: usize, b: usize) -> f32 {
        self.metric.distance(&self.nodes[a].vector, &self.nodes[b].vector)
    }

    fn greedy_descend(&self, start: usize, target: usize, layer: usize) -> usize {
        let mut current = start;
        let mut current_dist = self.vector_distance(current, target);
        loop {
            let mut improved = false;
            if let Some(neighbors) = self.nodes[current].neighbors.get(layer) {
                for &candidate in neighbors {
                    if self.nodes[candidate].deleted {
                        continue;
                    }
                    let dist = self.vector_distance(candidate, target);
                    if dist < current_dist {
                        current = candidate;
                        current_dist = dist;
                        improved = true;
                    }
                }
            }
            if !improved {
                return current;
            }
        }
    }

    /// Best-first search for `ef` candidates close to `target` at `layer`.
    fn search_layer(&self, target: usize, entry: usize, ef: usize, layer: usize) -> Vec<usize> {
        let mut visited = std::collections::HashSet::new();
        visited.insert(entry);
        let mut candidates = BinaryHeap::new();
        let mut results = BinaryHeap::new();

        let dist = self.vector_distance(entry, target);
        candidates.push(ScoredCandidate { distance: dist, index: entry });
        results.push(ScoredCandidate { distance: -dist, index: entry });

        while let Some(ScoredCandidate { distance, index }) = candidates.pop() {
            let worst = results.peek().map(|c| -c.distance).unwrap_or(f32::MAX);
            if distance > worst && results.len() >= ef {
                break;
            }
            if let Some(neighbors) = self.nodes[index].neighbors.get(layer) {
                for &neighbor in neighbors {
                    if self.nodes[neighbor].deleted || !visited.insert(neighbor) {
                        continue;
                    }
                    let d = self.vector_distance(neighbor, target);
                    let worst = results.peek().map(|c| -c.distance).unwrap_or(f32::MAX);
                    if results.len() < ef || d < worst {
                        candidates.push(ScoredCandidate { distance: d, index: neighbor });
                        results.push(ScoredCandidate { distance: -d, index: neighbor });
                        if results.len() > ef {
                            results.pop();
                        }
                    }
                }
            }
        }

        let mut out: Vec<(f32, usize)> = results.into_iter().map(|c| (-c.distance, c.index)).collect();
        out.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
        out.into_iter().map(|(_, idx)| idx).collect()
    }

    fn select_neighbors(&self, candidates: &[usize], m: usize) -> Vec<usize> {
        candidates.iter().take(m).copied().collect()
    }

    fn connect(&mut self, from: usize, to: usize, layer: usize) {
        if from == to {
            return;
        }
        let list = &mut self.nodes[from].neighbors[layer];
        if !list.contains(&to) {
            list.push(to);
        }
    }

    fn prune(&mut self, node: usize, layer: usize) {
        let m = self.params.m;
        if self.nodes[node].neighbors[layer].len() <= m {
            return;
        }
        let mut scored: Vec<(f32, usize)> = self.nodes[node].neighbors[layer]
            .iter()
            .map(|&n| (self.vector_distance(node, n), n))
            .collect();
        scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
        scored.truncate(m);
        self.nodes[node].neighbors[layer] = scored.into_iter().map(|(_, n)| n).collect();
    }

    /// Search for the `k` nearest neighbors to `query`, optionally overriding `ef`.
    pub fn search(&self, query: &[f32], k: usize, ef: Option<usize>) -> Result<Vec<Neighbor>> {
        if query.len() != self.dim {
            return Err(ParqueError::Decode(format!(
                "query vector has dimension {} but index expects {}",
                query.len(),
                self.dim
            )));
        }
        let Some(entry_point) = self.entry_point else {
            return Ok(Vec::new());
        };
        let ef = ef.unwrap_or(self.params.ef_search).max(k);

        let mut current = entry_point;
        for lc in (1..=self.max_layer).rev() {
            current = self.greedy_descend_query(current, query, lc);
        }
        let candidates = self.search_layer_query(query, current, ef, 0);

        let mut scored: Vec<Neighbor> = candidates
            .into_iter()
            .filter(|&idx| !self.nodes[idx].deleted)
            .map(|idx| {
                let node = &self.nodes[idx];
                Neighbor {
                    doc_id: node.doc_id.clone(),
                    row_group: node.row_group,
                    row_offset: node.row_offset,
                    distance: self.metric.distance(query, &node.vector),
                }
            })
            .collect();
        scored.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    fn greedy_descend_query(&self, start: usize, query: &[f32], layer: usize) -> usize {
        let mut current = start;
        let mut current_dist = self.metric.distance(query, &self.nodes[current].vector);
        loop {
            let mut improved = false;
            if let Some(neighbors) = self.nodes[current].neighbors.get(layer) {
                for &candidate in neighbors {
                    if self.nodes[candidate].deleted {
                        continue;
                    }
                    let dist = self.metric.distance(query, &self.nodes[candidate].vector);
                    if dist < current_dist {
                        current = candidate;
                        current_dist = dist;
                        improved = true;
                    }
                }
            }
            if !improved {
                return current;
            }
        }
    }

    fn search_layer_query(&self, query: &[f32], entry: usize, ef: usize, layer: usize) -> Vec<usize> {
        let mut visited = std::collections::HashSet::new();
        visited.insert(entry);
        let mut candidates = BinaryHeap::new();
        let mut results = BinaryHeap::new();

        let dist = self.metric.distance(query, &self.nodes[entry].vector);
        candidates.push(ScoredCandidate { distance: dist, index: entry });
        results.push(ScoredCandidate { distance: -dist, index: entry });

        while let Some(ScoredCandidate { distance, index }) = candidates.pop() {
            let worst = results.peek().map(|c| -c.distance).unwrap_or(f32::MAX);
            if distance > worst && results.len() >= ef {
                break;
            }
            if let Some(neighbors) = self.nodes[index].neighbors.get(layer) {
                for &neighbor in neighbors {
                    if self.nodes[neighbor].deleted || !visited.insert(neighbor) {
                        continue;
                    }
                    let d = self.metric.distance(query, &self.nodes[neighbor].vector);
                    let worst = results.peek().map(|c| -c.distance).unwrap_or(f32::MAX);
                    if results.len() < ef || d < worst {
                        candidates.push(ScoredCandidate { distance: d, index: neighbor });
                        results.push(ScoredCandidate { distance: -d, index: neighbor });
                        if results.len() > ef {
                            results.pop();
                        }
                    }
                }
            }
        }
        let mut out: Vec<(f32, usize)> = results.into_iter().map(|c| (-c.distance, c.index)).collect();
        out.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
        out.into_iter().map(|(_, idx)| idx).collect()
    }

    /// Tombstone every node belonging to `doc_id`. Neighbor lists are left
    /// intact; search and descent both skip deleted nodes.
    pub fn remove_doc(&mut self, doc_id: &[u8]) {
        for node in &mut self.nodes {
            if node.doc_id == doc_id {
                node.deleted = true;
            }
        }
    }

    /// Remap row-group ids after compaction. Nodes whose row group has no
    /// mapping are tombstoned rather than physically removed, since removing
    /// them would require renumbering every neighbor index.
    pub fn remap_row_groups(&mut self, remap: &HashMap<u16, u16>) {
        for node in &mut self.nodes {
            match remap.get(&node.row_group) {
                Some(&new_id) => node.row_group = new_id,
                None => node.deleted = true,
            }
        }
    }

    /// Count of live (non-tombstoned) vectors.
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| !n.deleted).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(x: f32, y: f32) -> Vec<f32> {
        vec![x, y]
    }

    #[test]
    fn nearest_neighbor_is_exact_match() {
        let mut index = HnswIndex::new(2, Metric::L2, HnswParams::default());
        index.insert(unit(0.0, 0.0), 0, 0, b"a".to_vec()).unwrap();
        index.insert(unit(10.0, 10.0), 0, 1, b"b".to_vec()).unwrap();
        index.insert(unit(1.0, 1.0), 0, 2, b"c".to_vec()).unwrap();

        let hits = index.search(&unit(0.9, 0.9), 1, None).unwrap();
        assert_eq!(hits[0].doc_id, b"c");
    }

    #[test]
    fn removed_doc_is_excluded_from_search() {
        let mut index = HnswIndex::new(2, Metric::L2, HnswParams::default());
        index.insert(unit(0.0, 0.0), 0, 0, b"a".to_vec()).unwrap();
        index.insert(unit(0.01, 0.01), 0, 1, b"b".to_vec()).unwrap();
        index.remove_doc(b"a");

        let hits = index.search(&unit(0.0, 0.0), 5, None).unwrap();
        assert!(hits.iter().all(|h| h.doc_id != b"a"));
    }

    #[test]
    fn remap_drops_unmapped_row_group() {
        let mut index = HnswIndex::new(2, Metric::L2, HnswParams::default());
        index.insert(unit(0.0, 0.0), 5, 0, b"a".to_vec()).unwrap();
        let mut remap = HashMap::new();
        remap.insert(5u16, 1u16);
        index.remap_row_groups(&remap);
        let hits = index.search(&unit(0.0, 0.0), 1, None).unwrap();
        assert_eq!(hits[0].row_group, 1);
    }
}
