//! The network data structure (§3 "Network"), leveling, and incremental
//! maintenance under add/remove (§4.3).

use crate::link::Link;
use crate::reactive::{ptr_key, ReactiveRef};
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Weak;

/// Stable identifier for a reactive known to a [`Network`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReactiveId(u64);

/// Stable identifier for a link known to a [`Network`]. Assigned in
/// strictly increasing order, which is what breaks ties between sibling
/// links at the same level (§4.3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(u64);

static NEXT_REACTIVE_ID: AtomicU64 = AtomicU64::new(0);
static NEXT_LINK_ID: AtomicU64 = AtomicU64::new(0);

struct ReactiveEntry {
    weak: Weak<dyn crate::reactive::Reactive>,
    level: u32,
}

pub(crate) struct LinkEntry {
    pub link: Link,
    pub level: u32,
}

/// Default threshold (§4.3) past which an accumulation of removed links
/// triggers a full index rebuild.
pub const DEFAULT_REBUILD_THRESHOLD: usize = 100;

/// Bundles the two constructor tunables a caller may want to override
/// together (SPEC_FULL.md §10.3).
#[derive(Clone, Copy, Debug)]
pub struct NetworkConfig {
    pub rebuild_threshold: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            rebuild_threshold: DEFAULT_REBUILD_THRESHOLD,
        }
    }
}

/// The graph of links plus derived indices (§3).
pub struct Network {
    pub(crate) config: NetworkConfig,
    reactives: FxHashMap<ReactiveId, ReactiveEntry>,
    ptr_to_id: FxHashMap<usize, ReactiveId>,
    pub(crate) links: FxHashMap<LinkId, LinkEntry>,
    /// Forward fan-out: reactive id -> links for which it is an input.
    links_map: FxHashMap<ReactiveId, FxHashSet<LinkId>>,
    /// Per-reactive hold count; reaching zero auto-completes it.
    alive_map: FxHashMap<ReactiveId, i64>,
    removes: usize,
}

impl Network {
    pub fn new() -> Self {
        Self::with_config(NetworkConfig::default())
    }

    pub fn with_config(config: NetworkConfig) -> Self {
        Self {
            config,
            reactives: FxHashMap::default(),
            ptr_to_id: FxHashMap::default(),
            links: FxHashMap::default(),
            links_map: FxHashMap::default(),
            alive_map: FxHashMap::default(),
            removes: 0,
        }
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn reactive_count(&self) -> usize {
        self.reactives.len()
    }

    pub fn level_of_reactive(&self, r: &ReactiveRef) -> Option<u32> {
        let id = *self.ptr_to_id.get(&ptr_key(r))?;
        self.reactives.get(&id).map(|e| e.level)
    }

    pub fn level_of_link(&self, id: LinkId) -> Option<u32> {
        self.links.get(&id).map(|e| e.level)
    }

    fn id_for(&mut self, r: &ReactiveRef) -> ReactiveId {
        let key = ptr_key(r);
        if let Some(id) = self.ptr_to_id.get(&key) {
            return *id;
        }
        let id = ReactiveId(NEXT_REACTIVE_ID.fetch_add(1, Ordering::Relaxed));
        self.ptr_to_id.insert(key, id);
        self.reactives.insert(
            id,
            ReactiveEntry {
                weak: std::sync::Arc::downgrade(r) as Weak<dyn crate::reactive::Reactive>,
                level: 1,
            },
        );
        self.alive_map.entry(id).or_insert(1);
        id
    }

    fn existing_id_for(&self, r: &ReactiveRef) -> Option<ReactiveId> {
        self.ptr_to_id.get(&ptr_key(r)).copied()
    }

    /// Adds a link, assigning ids and levels per §4.3 steps 1-6.
    pub fn add_link(&mut self, link: Link) -> LinkId {
        // Snapshot which `complete_on_remove` reactives the network already
        // knew about *before* this link's own inputs/outputs are seeded --
        // needed below to tell "this link is the first to hold it" (no
        // extra increment; the seed-to-1 already is that hold) apart from
        // "another link already holds it" (needs its own increment).
        let pre_existing: FxHashSet<usize> = link
            .complete_on_remove
            .iter()
            .filter(|r| self.existing_id_for(r).is_some())
            .map(ptr_key)
            .collect();

        let mut input_levels = Vec::with_capacity(link.inputs.len());
        let inputs = link.inputs.clone();
        for input in &inputs {
            let id = self.id_for(input);
            input_levels.push(self.reactives[&id].level);
        }
        let level = input_levels.into_iter().max().unwrap_or(0) + 1;

        let outputs: Vec<ReactiveRef> = link.outputs.iter().filter_map(Weak::upgrade).collect();
        for output in &outputs {
            self.id_for(output);
        }

        let link_id = LinkId(NEXT_LINK_ID.fetch_add(1, Ordering::Relaxed));

        for input in &inputs {
            let id = self.ptr_to_id[&ptr_key(input)];
            self.links_map.entry(id).or_default().insert(link_id);
        }

        // A reactive's first-ever link already accounts for one hold via
        // the seed-to-1 in `id_for` (§4.3 step 5, "its creator's implicit
        // hold"). Every *additional* link that lists the same reactive in
        // `complete_on_remove` is a second, independent reason it's kept
        // alive, and needs its own hold -- otherwise the first link to be
        // removed would zero out a reactive two links still share (§4.5,
        // §8 "completes exactly when all links declaring it are removed").
        for reactive in &link.complete_on_remove {
            let id = self.id_for(reactive);
            if pre_existing.contains(&ptr_key(reactive)) {
                *self.alive_map.entry(id).or_insert(1) += 1;
            }
        }

        self.links.insert(link_id, LinkEntry { link, level });

        // Walk downstream from the outputs, bumping levels so that
        // level(output) > level(link) and level(downstream link) >
        // level(any of its inputs) transitively (§4.3 step 6).
        self.propagate_levels_from_outputs(&outputs, level);

        link_id
    }

    fn propagate_levels_from_outputs(&mut self, outputs: &[ReactiveRef], link_level: u32) {
        let mut queue: VecDeque<ReactiveId> = VecDeque::new();
        let mut visited: FxHashSet<ReactiveId> = FxHashSet::default();

        for output in outputs {
            let id = self.ptr_to_id[&ptr_key(output)];
            let required = link_level + 1;
            let entry = self.reactives.get_mut(&id).unwrap();
            if entry.level < required {
                entry.level = required;
            }
            if visited.insert(id) {
                queue.push_back(id);
            }
        }

        while let Some(reactive_id) = queue.pop_front() {
            let reactive_level = self.reactives[&reactive_id].level;
            let Some(dependent_links) = self.links_map.get(&reactive_id).cloned() else {
                continue;
            };
            for dependent in dependent_links {
                let Some(entry) = self.links.get_mut(&dependent) else {
                    continue;
                };
                let required = reactive_level + 1;
                if entry.level >= required {
                    continue;
                }
                entry.level = required;
                let downstream_outputs: Vec<ReactiveRef> = entry.link.live_outputs();
                for output in downstream_outputs {
                    let out_id = self.ptr_to_id[&ptr_key(&output)];
                    let out_required = entry.level + 1;
                    let out_entry = self.reactives.get_mut(&out_id).unwrap();
                    if out_entry.level < out_required {
                        out_entry.level = out_required;
                    }
                    if visited.insert(out_id) {
                        queue.push_back(out_id);
                    }
                }
            }
        }
    }

    /// Removes links matching `pred`. Returns the removed links' declared
    /// `complete_on_remove` reactives (still needing an `allow_complete`
    /// adjustment from the caller, typically the engine's step (h)).
    pub fn remove_links(&mut self, pred: impl Fn(&Link) -> bool) -> Vec<ReactiveRef> {
        let to_remove: Vec<LinkId> = self
            .links
            .iter()
            .filter(|(_, entry)| pred(&entry.link))
            .map(|(id, _)| *id)
            .collect();
        self.remove_link_ids(&to_remove)
    }

    pub(crate) fn remove_link_ids(&mut self, ids: &[LinkId]) -> Vec<ReactiveRef> {
        let mut freed = Vec::new();
        for link_id in ids {
            let Some(entry) = self.links.remove(link_id) else {
                continue;
            };
            for input in &entry.link.inputs {
                if let Some(reactive_id) = self.existing_id_for(input) {
                    if let Some(set) = self.links_map.get_mut(&reactive_id) {
                        set.remove(link_id);
                    }
                }
            }
            freed.extend(entry.link.complete_on_remove.iter().cloned());
            self.removes += 1;
        }
        if self.removes > self.config.rebuild_threshold {
            self.rebuild();
        }
        freed
    }

    /// Full rebuild of derived indices from the current link list (§4.3).
    pub fn rebuild(&mut self) {
        tracing::debug!(links = self.links.len(), "rebuilding network indices");
        self.links_map.clear();
        for (link_id, entry) in self.links.iter() {
            for input in &entry.link.inputs {
                let id = self.ptr_to_id[&ptr_key(input)];
                self.links_map.entry(id).or_default().insert(*link_id);
            }
        }
        // Drop bookkeeping for reactives no longer referenced by any live
        // link and whose weak ref has already been collected.
        self.reactives.retain(|id, entry| {
            let still_linked = self.links_map.contains_key(id);
            let alive_ref = entry.weak.upgrade().is_some();
            still_linked || alive_ref
        });
        self.ptr_to_id.retain(|_, id| self.reactives.contains_key(id));
        self.removes = 0;
    }

    /// Applies a `dont_complete`/`allow_complete` delta (§4.5). Returns the
    /// reactives whose counters just reached zero and should be delivered
    /// `COMPLETED`.
    pub(crate) fn adjust_alive(
        &mut self,
        dont_complete: &[ReactiveRef],
        allow_complete: &[ReactiveRef],
    ) -> Vec<ReactiveRef> {
        for r in dont_complete {
            let id = self.id_for(r);
            *self.alive_map.entry(id).or_insert(1) += 1;
        }
        let mut newly_dead = Vec::new();
        for r in allow_complete {
            let id = self.id_for(r);
            let counter = self.alive_map.entry(id).or_insert(1);
            *counter -= 1;
            if *counter <= 0 {
                newly_dead.push(r.clone());
            }
        }
        newly_dead
    }

    /// Links whose input set contains `reactive_id` (forward fan-out).
    pub(crate) fn links_with_input(&self, reactive_id: ReactiveId) -> Vec<LinkId> {
        self.links_map
            .get(&reactive_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub(crate) fn id_of(&self, r: &ReactiveRef) -> Option<ReactiveId> {
        self.existing_id_for(r)
    }
}

impl Default for Network {
    fn default() -> Self {
        Self::new()
    }
}
