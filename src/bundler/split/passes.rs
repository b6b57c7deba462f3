//! The partitioning passes

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use tracing::debug;

use super::{Pass, PartitionState, Warning};
use crate::bundler::chunk::{BaseChunk, BaseIdx, BaseKind, Chunk, NameHint};
use crate::bundler::graph::ModuleIdx;

/// Builds base chunks and module usage sets
pub struct DiscoverPass;

impl Pass for DiscoverPass {
    fn name(&self) -> &'static str {
        "discover"
    }

    fn apply(&self, state: &mut PartitionState<'_>) {
        let graph = state.graph;

        let mut bases: Vec<BaseChunk> = state
            .entries
            .iter()
            .map(|(name, root)| BaseChunk {
                name: name.clone(),
                kind: BaseKind::Initial,
                root: *root,
                modules: Vec::new(),
                parents: BTreeSet::new(),
            })
            .collect();
        let mut split_points: HashMap<ModuleIdx, BaseIdx> = HashMap::new();
        let mut next_rank = 0;

        // Bases discovered along the way are appended and visited in turn
        let mut i = 0;
        while i < bases.len() {
            let modules = graph.static_closure(bases[i].root);

            for &m in &modules {
                if state.rank[m] == usize::MAX {
                    state.rank[m] = next_rank;
                    next_rank += 1;
                }

                for &target in graph.async_dependencies(m) {
                    let idx = *split_points.entry(target).or_insert_with(|| {
                        bases.push(BaseChunk {
                            name: graph.module(target).id.clone(),
                            kind: BaseKind::Async,
                            root: target,
                            modules: Vec::new(),
                            parents: BTreeSet::new(),
                        });
                        bases.len() - 1
                    });
                    bases[idx].parents.insert(i);
                }
            }

            bases[i].modules = modules;
            i += 1;
        }

        for m in 0..graph.len() {
            if state.rank[m] == usize::MAX {
                state.rank[m] = next_rank;
                next_rank += 1;
            }
        }

        prune_available_modules(&mut bases);

        for (b, base) in bases.iter().enumerate() {
            let selected = state.options.chunks.includes(base.kind);
            for &m in &base.modules {
                state.membership[m].insert(b);
                if selected {
                    state.usage[m].insert(b);
                }
            }
        }

        debug!(
            "Discovered {} entry and {} async base chunks",
            state.entries.len(),
            bases.len() - state.entries.len()
        );
        state.bases = bases;
    }
}

/// Drop modules from async bases that every initial ancestor already loads
fn prune_available_modules(bases: &mut [BaseChunk]) {
    let initial_sets: Vec<HashSet<ModuleIdx>> = bases
        .iter()
        .map(|b| match b.kind {
            BaseKind::Initial => b.modules.iter().copied().collect(),
            BaseKind::Async => HashSet::new(),
        })
        .collect();

    let mut removals = Vec::new();
    for (a, base) in bases.iter().enumerate() {
        if base.kind != BaseKind::Async {
            continue;
        }

        let ancestors = initial_ancestors(bases, a);
        let available: Vec<ModuleIdx> = base
            .modules
            .iter()
            .copied()
            .filter(|m| {
                !ancestors.is_empty() && ancestors.iter().all(|&r| initial_sets[r].contains(m))
            })
            .collect();

        if !available.is_empty() {
            removals.push((a, available));
        }
    }

    for (a, available) in removals {
        let available: HashSet<ModuleIdx> = available.into_iter().collect();
        bases[a].modules.retain(|m| !available.contains(m));
    }
}

/// Initial bases that eventually load base `start`
fn initial_ancestors(bases: &[BaseChunk], start: BaseIdx) -> Vec<BaseIdx> {
    let mut visited = HashSet::from([start]);
    let mut stack = vec![start];
    let mut roots = Vec::new();

    while let Some(b) = stack.pop() {
        for &parent in &bases[b].parents {
            if !visited.insert(parent) {
                continue;
            }
            match bases[parent].kind {
                BaseKind::Initial => roots.push(parent),
                BaseKind::Async => stack.push(parent),
            }
        }
    }

    roots
}

/// Forms shared chunks from cache groups in priority order
pub struct CacheGroupPass;

impl Pass for CacheGroupPass {
    fn name(&self) -> &'static str {
        "cache-groups"
    }

    fn apply(&self, state: &mut PartitionState<'_>) {
        let options = state.options;
        let graph = state.graph;

        // Stable sort keeps declaration order among equal priorities
        let mut order: Vec<usize> = (0..options.cache_groups.len()).collect();
        order.sort_by_key(|&g| Reverse(options.cache_groups[g].priority));

        let mut by_rank: Vec<ModuleIdx> = (0..graph.len())
            .filter(|&m| !state.membership[m].is_empty())
            .collect();
        state.sort_by_rank(&mut by_rank);

        for g in order {
            let group = &options.cache_groups[g];
            let min_chunks = group.min_chunks.unwrap_or(options.min_chunks);
            let min_size = group.min_size.unwrap_or(options.min_size);

            let mut buckets: BTreeMap<Vec<BaseIdx>, Vec<ModuleIdx>> = BTreeMap::new();
            for &m in &by_rank {
                if state.claimed[m] {
                    continue;
                }
                let uses = state.usage[m].len();
                if uses == 0 || uses < min_chunks {
                    continue;
                }
                if !group.matcher.matches(graph.module(m)) {
                    continue;
                }

                let key = if group.name.is_some() {
                    Vec::new()
                } else {
                    state.usage[m].iter().copied().collect()
                };
                buckets.entry(key).or_default().push(m);
            }

            for members in buckets.into_values() {
                let origins: BTreeSet<BaseIdx> = members
                    .iter()
                    .flat_map(|&m| state.usage[m].iter().copied())
                    .collect();
                let size = state.size_of(&members);
                let reusable = if group.reuse_existing_chunk {
                    find_reusable(state, &members, &origins)
                } else {
                    None
                };

                if size < min_size && reusable.is_none() {
                    debug!(
                        "Cache group '{}': {} modules ({} bytes) below min_size {}, left in place",
                        group.key,
                        members.len(),
                        size,
                        min_size
                    );
                    continue;
                }

                for &m in &members {
                    state.claimed[m] = true;
                }
                state.cover(&members, &origins);

                let max_size = group.max_size.or(options.max_size);
                let chunk = match reusable {
                    Some(base) => {
                        debug!(
                            "Cache group '{}' reuses the chunk of '{}'",
                            group.key, state.bases[base].name
                        );
                        let mut chunk = Chunk::own(base, state.bases[base].kind, members, size);
                        chunk.origins.extend(origins);
                        chunk
                    }
                    None => {
                        let hint = match &group.name {
                            Some(name) => NameHint::Fixed(name.clone()),
                            None => NameHint::Group(group.key.clone()),
                        };
                        debug!(
                            "Cache group '{}': {} modules ({} bytes) for {} chunks",
                            group.key,
                            members.len(),
                            size,
                            origins.len()
                        );
                        Chunk::shared(hint, members, size, group.priority, origins)
                    }
                };

                state.chunks.push(Chunk { max_size, ..chunk });
            }
        }
    }
}

/// A base whose uncovered modules are exactly `members`
fn find_reusable(
    state: &PartitionState<'_>,
    members: &[ModuleIdx],
    origins: &BTreeSet<BaseIdx>,
) -> Option<BaseIdx> {
    let wanted: BTreeSet<ModuleIdx> = members.iter().copied().collect();

    origins.iter().copied().find(|&base| {
        let remaining: BTreeSet<ModuleIdx> = state.uncovered(base).into_iter().collect();
        remaining == wanted
    })
}

/// Gives every base a chunk with the modules nothing else provides
pub struct DefaultPlacementPass;

impl Pass for DefaultPlacementPass {
    fn name(&self) -> &'static str {
        "default-placement"
    }

    fn apply(&self, state: &mut PartitionState<'_>) {
        let max_size = state.options.max_size;

        for base in 0..state.bases.len() {
            let mut modules = state.uncovered(base);
            if modules.is_empty() {
                continue;
            }
            state.sort_by_rank(&mut modules);

            let size = state.size_of(&modules);
            state.cover(&modules, &BTreeSet::from([base]));

            let mut chunk = Chunk::own(base, state.bases[base].kind, modules, size);
            chunk.max_size = max_size;
            state.chunks.push(chunk);
        }

        let mut orphans: Vec<ModuleIdx> = (0..state.graph.len())
            .filter(|&m| state.membership[m].is_empty())
            .collect();
        if orphans.is_empty() {
            return;
        }
        state.sort_by_rank(&mut orphans);

        for &m in &orphans {
            let module = state.graph.module(m).id.clone();
            state.warn(Warning::UnreachableModule { module });
        }

        let size = state.size_of(&orphans);
        let mut chunk = Chunk::orphans(orphans, size);
        chunk.max_size = max_size;
        state.chunks.push(chunk);
    }
}

/// Splits chunks above their size cap
pub struct MaxSizePass;

impl Pass for MaxSizePass {
    fn name(&self) -> &'static str {
        "max-size"
    }

    fn apply(&self, state: &mut PartitionState<'_>) {
        let chunks = std::mem::take(&mut state.chunks);

        for chunk in chunks {
            let max = match chunk.max_size {
                Some(max) if chunk.size > max => max,
                _ => {
                    state.chunks.push(chunk);
                    continue;
                }
            };

            let bins = pack(state, &chunk.modules, max);
            for bin in &bins {
                if let [m] = bin.as_slice() {
                    if state.sizes[*m] > max {
                        let module = state.graph.module(*m).id.clone();
                        let size = state.sizes[*m];
                        state.warn(Warning::OversizedModule {
                            module,
                            size,
                            max_size: max,
                        });
                    }
                }
            }

            if bins.len() == 1 {
                state.chunks.push(chunk);
                continue;
            }

            debug!(
                "Split chunk of {} bytes into {} parts (max_size {})",
                chunk.size,
                bins.len(),
                max
            );
            for (k, mut bin) in bins.into_iter().enumerate() {
                state.sort_by_rank(&mut bin);
                let size = state.size_of(&bin);
                state.chunks.push(Chunk {
                    modules: bin,
                    size,
                    part: Some(k),
                    ..chunk.clone()
                });
            }
        }
    }
}

/// Largest-first next-fit packing
fn pack(state: &PartitionState<'_>, modules: &[ModuleIdx], max: u64) -> Vec<Vec<ModuleIdx>> {
    let mut sorted = modules.to_vec();
    sorted.sort_by_key(|&m| (Reverse(state.sizes[m]), state.rank[m], m));

    let mut bins = Vec::new();
    let mut current: Vec<ModuleIdx> = Vec::new();
    let mut current_size = 0u64;

    for m in sorted {
        let size = state.sizes[m];
        if !current.is_empty() && current_size.saturating_add(size) > max {
            bins.push(std::mem::take(&mut current));
            current_size = 0;
        }
        current.push(m);
        current_size = current_size.saturating_add(size);
    }
    if !current.is_empty() {
        bins.push(current);
    }

    bins
}

/// Merges chunks until every base respects its request cap
pub struct RequestLimitPass;

impl Pass for RequestLimitPass {
    fn name(&self) -> &'static str {
        "request-limits"
    }

    fn apply(&self, state: &mut PartitionState<'_>) {
        for base in 0..state.bases.len() {
            let kind = state.bases[base].kind;
            let limit = match kind {
                BaseKind::Initial => state.options.max_initial_requests,
                BaseKind::Async => state.options.max_async_requests,
            };

            loop {
                let loads: Vec<usize> = state
                    .chunks
                    .iter()
                    .enumerate()
                    .filter(|(_, c)| !c.is_empty() && c.is_loaded_by(base))
                    .map(|(i, _)| i)
                    .collect();
                if loads.len() <= limit {
                    break;
                }

                let target = match state.chunks.iter().position(|c| c.is_private_to(base)) {
                    Some(target) => target,
                    None => {
                        let mut chunk = Chunk::own(base, kind, Vec::new(), 0);
                        chunk.max_size = state.options.max_size;
                        state.chunks.push(chunk);
                        state.chunks.len() - 1
                    }
                };

                let victim = loads
                    .iter()
                    .copied()
                    .filter(|&c| c != target)
                    .min_by_key(|&c| (state.chunks[c].priority, state.chunks[c].size, c));
                let Some(victim) = victim else {
                    break;
                };

                debug!(
                    "'{}' loads {} chunks (limit {}), merging",
                    state.bases[base].name,
                    loads.len(),
                    limit
                );
                state.merge_into(victim, target, base);
            }
        }
    }
}
