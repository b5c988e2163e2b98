//! Merge of an authoritative snapshot with locally held speculative state.
//!
//! The merge is a pure function of its inputs: no clock, no I/O. Applying it
//! twice with the same snapshot and no local change in between yields the
//! same list.

use crate::core::{CorrelationId, Entity, EntityId};
use std::collections::{HashMap, HashSet};
use tracing::{Level, event};

/// Returns `true` when the local list holds nothing but skeleton stand-ins.
pub fn is_placeholder_only(local: &[Entity]) -> bool {
    !local.is_empty() && local.iter().all(Entity::is_skeleton)
}

/// Merges `authoritative` into `local`, producing the next visible list.
///
/// `pending_deletions` is pruned in place: ids the snapshot no longer
/// contains have been durably deleted and leave the set. Ids still present
/// are filtered out of the result.
///
/// Authoritative fields win for every confirmed entity. An optimistic local
/// entry survives only while no authoritative entity carries its correlation
/// id and no authoritative entity shares its id.
pub fn reconcile(
    authoritative: &[Entity],
    local: &[Entity],
    pending_deletions: &mut HashSet<EntityId>,
) -> Vec<Entity> {
    let authoritative_ids: HashSet<&EntityId> = authoritative.iter().map(|e| &e.id).collect();
    pending_deletions.retain(|id| authoritative_ids.contains(id));

    let mut result: Vec<Entity> = Vec::with_capacity(authoritative.len() + local.len());
    let mut seen_correlations: HashSet<CorrelationId> = HashSet::new();
    for entity in authoritative {
        if pending_deletions.contains(&entity.id) {
            continue;
        }
        if let Some(correlation_id) = entity.correlation_id {
            if !seen_correlations.insert(correlation_id) {
                event!(
                    Level::WARN,
                    entity_id = %entity.id,
                    correlation_id = %correlation_id,
                    "snapshot carries duplicate correlation id"
                );
                continue;
            }
        }
        result.push(entity.clone());
    }

    if is_placeholder_only(local) {
        sort_by_order(&mut result);
        return result;
    }

    let confirmed: HashMap<CorrelationId, &EntityId> = result
        .iter()
        .filter_map(|e| e.correlation_id.map(|c| (c, &e.id)))
        .collect();
    let result_ids: HashSet<EntityId> = result.iter().map(|e| e.id.clone()).collect();

    let mut still_pending = Vec::new();
    for entry in local.iter().filter(|e| e.is_optimistic) {
        if let Some(correlation_id) = entry.correlation_id {
            if confirmed.contains_key(&correlation_id) {
                continue;
            }
            if !seen_correlations.insert(correlation_id) {
                continue;
            }
        }
        if result_ids.contains(&entry.id) || pending_deletions.contains(&entry.id) {
            continue;
        }
        still_pending.push(entry.clone());
    }
    result.extend(still_pending);

    sort_by_order(&mut result);
    result
}

/// Stable sort by `order_index`; ties keep their relative order.
pub fn sort_by_order(entities: &mut [Entity]) {
    entities.sort_by_key(|e| e.order_index);
}
