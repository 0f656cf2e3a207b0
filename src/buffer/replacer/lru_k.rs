//! LRU-K replacement policy.
//!
//! Evicts the frame whose K-th most recent access lies furthest in the
//! past. Frames with fewer than K recorded accesses count as infinitely
//! distant and go first, oldest most-recent access first.

use std::collections::{HashMap, VecDeque};

use crate::common::FrameId;

/// Access history of one frame.
#[derive(Debug)]
struct LruKNode {
    /// Last K access timestamps, oldest at the front.
    history: VecDeque<u64>,
    is_evictable: bool,
}

impl LruKNode {
    fn new(k: usize) -> Self {
        Self {
            history: VecDeque::with_capacity(k),
            is_evictable: false,
        }
    }

    fn record(&mut self, timestamp: u64, k: usize) {
        if self.history.len() == k {
            self.history.pop_front();
        }
        self.history.push_back(timestamp);
    }

    /// Sort key for eviction; the smallest key is evicted first.
    ///
    /// Infinite-distance frames (`false`) sort ahead of full histories
    /// (`true`). Within the infinite group the most recent access decides,
    /// within the finite group the K-th most recent access does.
    fn eviction_key(&self, k: usize) -> (bool, u64) {
        if self.history.len() < k {
            (false, self.history.back().copied().unwrap_or(0))
        } else {
            (true, self.history.front().copied().unwrap_or(0))
        }
    }
}

/// LRU-K eviction policy over the frames of one buffer pool.
///
/// Time is a logical counter bumped on every [`record_access`](Self::record_access),
/// not a wall clock. Only frames marked evictable are candidates.
///
/// # Example
/// ```
/// use pagepool::buffer::replacer::LruKReplacer;
/// use pagepool::FrameId;
///
/// let mut replacer = LruKReplacer::new(4, 2);
/// replacer.record_access(FrameId::new(0));
/// replacer.record_access(FrameId::new(0));
/// replacer.record_access(FrameId::new(1));
/// replacer.set_evictable(FrameId::new(0), true);
/// replacer.set_evictable(FrameId::new(1), true);
///
/// // Frame 1 has a single access, so its distance is infinite
/// assert_eq!(replacer.evict(), Some(FrameId::new(1)));
/// ```
#[derive(Debug)]
pub struct LruKReplacer {
    nodes: HashMap<FrameId, LruKNode>,
    current_timestamp: u64,
    evictable_count: usize,
    num_frames: usize,
    k: usize,
}

impl LruKReplacer {
    /// Create a replacer for frames `0..num_frames`.
    ///
    /// # Panics
    /// Panics if `k` is 0.
    pub fn new(num_frames: usize, k: usize) -> Self {
        assert!(k > 0, "LRU-K needs k >= 1");
        Self {
            nodes: HashMap::with_capacity(num_frames),
            current_timestamp: 0,
            evictable_count: 0,
            num_frames,
            k,
        }
    }

    /// Record an access to a frame at the current logical time.
    ///
    /// # Panics
    /// Panics if `frame_id` is outside the pool.
    pub fn record_access(&mut self, frame_id: FrameId) {
        self.check_frame_id(frame_id);

        let k = self.k;
        let timestamp = self.current_timestamp;
        self.current_timestamp += 1;

        self.nodes
            .entry(frame_id)
            .or_insert_with(|| LruKNode::new(k))
            .record(timestamp, k);
    }

    /// Add a frame to, or remove it from, the eviction candidates.
    ///
    /// Frames with no recorded access are ignored.
    pub fn set_evictable(&mut self, frame_id: FrameId, evictable: bool) {
        self.check_frame_id(frame_id);

        if let Some(node) = self.nodes.get_mut(&frame_id) {
            match (node.is_evictable, evictable) {
                (false, true) => self.evictable_count += 1,
                (true, false) => self.evictable_count -= 1,
                _ => {}
            }
            node.is_evictable = evictable;
        }
    }

    /// The frame [`evict`](Self::evict) would pick, left in place.
    ///
    /// Lets a caller finish work on the victim (e.g. a write-back) before
    /// committing with [`remove`](Self::remove); if that work fails, the
    /// frame keeps its history and its place in line.
    pub fn peek_victim(&self) -> Option<FrameId> {
        let k = self.k;
        self.nodes
            .iter()
            .filter(|(_, node)| node.is_evictable)
            .min_by_key(|&(&fid, node)| (node.eviction_key(k), fid))
            .map(|(&fid, _)| fid)
    }

    /// Pick a victim, forgetting its history.
    ///
    /// Returns `None` when no frame is evictable.
    pub fn evict(&mut self) -> Option<FrameId> {
        let victim = self.peek_victim()?;
        self.remove(victim);
        Some(victim)
    }

    /// Forget a frame entirely, e.g. after its page is deleted.
    pub fn remove(&mut self, frame_id: FrameId) {
        if let Some(node) = self.nodes.remove(&frame_id) {
            if node.is_evictable {
                self.evictable_count -= 1;
            }
        }
    }

    /// Number of evictable frames.
    #[inline]
    pub fn size(&self) -> usize {
        self.evictable_count
    }

    fn check_frame_id(&self, frame_id: FrameId) {
        assert!(
            frame_id.0 < self.num_frames,
            "invalid {frame_id}, pool has {} frames",
            self.num_frames
        );
    }
}
