//! Radix-tree prefix index over token blocks, with worker-affinity scoring.
//!
//! Input token sequences are split into fixed-size blocks (default 16
//! tokens). The tree is walked from the root matching whole blocks as long
//! as they are present; the remainder of the path is inserted, marking the
//! worker that served the request. Eviction is LRU over a worker's
//! affinity entries once its cached token budget is exceeded — the block
//! itself survives if another worker still references it.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Instant;

use sha2::{Digest, Sha256};

pub type BlockKey = u64;

/// Default LRU ceiling per worker, expressed in cached tokens. Chosen so a
/// single worker can hold on the order of a few hundred thousand blocks of
/// context before eviction kicks in — generous for load-test workloads
/// without growing unbounded over a long-running server.
pub const DEFAULT_WORKER_TOKEN_CAP: u64 = 100_000 * 16;

#[derive(Debug, Clone, Copy)]
struct WorkerAffinity {
    last_access: Instant,
    ref_count: u32,
}

struct RadixNode {
    block_key: BlockKey,
    children: HashMap<BlockKey, usize>,
    affinities: HashMap<u32, WorkerAffinity>,
    parent: Option<usize>,
}

impl RadixNode {
    fn root() -> Self {
        Self { block_key: 0, children: HashMap::new(), affinities: HashMap::new(), parent: None }
    }
}

/// Per-worker routing inputs: current queue depth, used to break score ties
/// and to penalize busy workers.
#[derive(Debug, Clone, Copy)]
pub struct WorkerLoad {
    pub worker_id: u32,
    pub queue_depth: u32,
}

pub struct KVCacheRouter {
    block_size: usize,
    overlap_weight: f64,
    nodes: RwLock<Vec<RadixNode>>,
    worker_token_totals: RwLock<HashMap<u32, u64>>,
    worker_cap: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct RouteOutcome {
    pub matched_tokens: u32,
    pub worker_id: u32,
}

impl KVCacheRouter {
    pub fn new(block_size: usize, overlap_weight: f64) -> Self {
        Self {
            block_size,
            overlap_weight,
            nodes: RwLock::new(vec![RadixNode::root()]),
            worker_token_totals: RwLock::new(HashMap::new()),
            worker_cap: DEFAULT_WORKER_TOKEN_CAP,
        }
    }

    /// Hashes `text` deterministically into a token-id sequence for
    /// simulation purposes, one id per word.
    pub fn tokenize(text: &str) -> Vec<u64> {
        text.split_whitespace()
            .map(|word| {
                let mut hasher = Sha256::new();
                hasher.update(word.as_bytes());
                let digest = hasher.finalize();
                u64::from_be_bytes(digest[0..8].try_into().expect("sha256 digest is at least 8 bytes"))
            })
            .collect()
    }

    fn block_keys(&self, token_ids: &[u64]) -> Vec<BlockKey> {
        token_ids
            .chunks(self.block_size)
            .filter(|chunk| chunk.len() == self.block_size)
            .map(|chunk| {
                let mut hasher = Sha256::new();
                for token in chunk {
                    hasher.update(token.to_be_bytes());
                }
                let digest = hasher.finalize();
                u64::from_be_bytes(digest[0..8].try_into().expect("sha256 digest is at least 8 bytes"))
            })
            .collect()
    }

    /// Routes a request: walks the tree matching whole blocks, scores
    /// candidate workers by overlap and queue depth, inserts the
    /// unmatched remainder under the chosen worker, and returns the
    /// match plus the chosen worker.
    pub fn route(&self, input_tokens: &[u64], workers: &[WorkerLoad]) -> RouteOutcome {
        let blocks = self.block_keys(input_tokens);
        let mut nodes = self.nodes.write().expect("kv-cache tree lock poisoned");

        let mut current = 0usize; // root
        let mut matched_blocks = 0usize;
        for &key in &blocks {
            let Some(&child) = nodes[current].children.get(&key) else { break };
            current = child;
            matched_blocks += 1;
        }

        let matched_tokens = (matched_blocks * self.block_size) as u32;

        // Candidate workers: whichever have affinity on the matched node,
        // scored against every known worker so a cold worker can still win
        // on low queue depth. Ties break by least queue depth, then
        // smallest worker id.
        let mut best: Option<(u32, f64, u32)> = None;
        for load in workers {
            let matched_for_worker = nodes[current]
                .affinities
                .get(&load.worker_id)
                .map(|_| matched_tokens)
                .unwrap_or(0) as f64;
            let score = self.overlap_weight * matched_for_worker - load.queue_depth as f64;

            let is_better = match best {
                None => true,
                Some((best_id, best_score, best_queue_depth)) => {
                    score > best_score
                        || (score == best_score && load.queue_depth < best_queue_depth)
                        || (score == best_score && load.queue_depth == best_queue_depth && load.worker_id < best_id)
                }
            };
            if is_better {
                best = Some((load.worker_id, score, load.queue_depth));
            }
        }
        let worker_id = best.map(|(id, _, _)| id).unwrap_or(0);

        self.insert_remainder(&mut nodes, current, &blocks[matched_blocks..], worker_id);
        drop(nodes);

        self.record_worker_tokens(worker_id, matched_tokens as u64 + ((blocks.len() - matched_blocks) * self.block_size) as u64);
        self.evict_if_over_cap(worker_id);

        RouteOutcome { matched_tokens, worker_id }
    }

    fn insert_remainder(&self, nodes: &mut Vec<RadixNode>, mut current: usize, remainder: &[BlockKey], worker_id: u32) {
        for &key in remainder {
            let next = nodes[current].children.get(&key).copied().unwrap_or_else(|| {
                let index = nodes.len();
                nodes.push(RadixNode { block_key: key, children: HashMap::new(), affinities: HashMap::new(), parent: Some(current) });
                nodes[current].children.insert(key, index);
                index
            });
            current = next;
        }
        nodes[current].affinities.insert(worker_id, WorkerAffinity { last_access: Instant::now(), ref_count: 1 });
    }

    fn record_worker_tokens(&self, worker_id: u32, tokens: u64) {
        let mut totals = self.worker_token_totals.write().expect("worker token totals lock poisoned");
        *totals.entry(worker_id).or_insert(0) += tokens;
    }

    /// Drops the globally least-recently-used affinity entries for
    /// `worker_id` until its cached-token total is back under the cap.
    fn evict_if_over_cap(&self, worker_id: u32) {
        let over = {
            let totals = self.worker_token_totals.read().expect("worker token totals lock poisoned");
            totals.get(&worker_id).copied().unwrap_or(0) > self.worker_cap
        };
        if !over {
            return;
        }

        let mut nodes = self.nodes.write().expect("kv-cache tree lock poisoned");
        loop {
            let totals_over = {
                let totals = self.worker_token_totals.read().expect("worker token totals lock poisoned");
                totals.get(&worker_id).copied().unwrap_or(0) > self.worker_cap
            };
            if !totals_over {
                break;
            }

            let lru_node = nodes
                .iter()
                .enumerate()
                .filter_map(|(i, n)| n.affinities.get(&worker_id).map(|a| (i, a.last_access)))
                .min_by_key(|(_, last_access)| *last_access);

            let Some((index, _)) = lru_node else { break };
            nodes[index].affinities.remove(&worker_id);
            let mut totals = self.worker_token_totals.write().expect("worker token totals lock poisoned");
            let entry = totals.entry(worker_id).or_insert(0);
            *entry = entry.saturating_sub(self.block_size as u64);

            // The node is pruned from its parent only once no worker
            // references it at all; the block itself may still be shared.
            if nodes[index].affinities.is_empty()
                && let Some(parent) = nodes[index].parent
            {
                let key = nodes[index].block_key;
                nodes[parent].children.remove(&key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_prefix_is_fully_matched_on_second_request() {
        let router = KVCacheRouter::new(2, 0.8);
        let tokens = KVCacheRouter::tokenize("the quick brown fox jumps over");
        let workers = vec![WorkerLoad { worker_id: 0, queue_depth: 0 }];

        let first = router.route(&tokens, &workers);
        assert_eq!(first.matched_tokens, 0);

        let second = router.route(&tokens, &workers);
        assert!(second.matched_tokens > 0);
    }

    #[test]
    fn ties_break_by_least_queue_depth_then_worker_id() {
        let router = KVCacheRouter::new(4, 0.8);
        let tokens = KVCacheRouter::tokenize("alpha beta gamma delta");
        let workers = vec![
            WorkerLoad { worker_id: 1, queue_depth: 2 },
            WorkerLoad { worker_id: 0, queue_depth: 1 },
        ];
        let outcome = router.route(&tokens, &workers);
        assert_eq!(outcome.worker_id, 0);
    }

    #[test]
    fn longer_prefix_never_reduces_match_length() {
        let router = KVCacheRouter::new(2, 0.8);
        let workers = vec![WorkerLoad { worker_id: 0, queue_depth: 0 }];

        let short = KVCacheRouter::tokenize("alpha beta");
        router.route(&short, &workers);

        let longer = KVCacheRouter::tokenize("alpha beta gamma delta");
        let first_long = router.route(&longer, &workers);
        let second_long = router.route(&longer, &workers);
        assert!(second_long.matched_tokens >= first_long.matched_tokens);
    }
}
