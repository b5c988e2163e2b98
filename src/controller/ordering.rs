use crate::core::{Entity, EntityId};

/// One order index rewrite produced by a move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderChange {
    pub id: EntityId,
    pub from: i64,
    pub to: i64,
    pub was_optimistic: bool,
}

/// Plans moving `id` to display `position` by opening a gap.
///
/// The moved entity takes the order index at the destination; entities from
/// there on are shifted up by one until an existing gap absorbs the shift.
/// Indices stay non-contiguous; server-side reindexing closes gaps later.
///
/// Returns `None` if `id` is not in the list.
pub fn plan_move(entities: &[Entity], id: &EntityId, position: usize) -> Option<Vec<OrderChange>> {
    let mut visible: Vec<&Entity> = entities.iter().filter(|e| !e.is_skeleton()).collect();
    visible.sort_by_key(|e| e.order_index);

    let from = visible.iter().position(|e| &e.id == id)?;
    let moved = visible.remove(from);
    let to = position.min(visible.len());
    if to == from {
        return Some(Vec::new());
    }

    let after_prev = if to > 0 {
        Some(visible[to - 1].order_index + 1)
    } else {
        None
    };
    let target = match (visible.get(to), after_prev) {
        (Some(next), Some(floor)) => next.order_index.max(floor),
        (Some(next), None) => next.order_index,
        (None, Some(floor)) => floor,
        (None, None) => moved.order_index,
    };

    let mut changes = Vec::new();
    if target != moved.order_index {
        changes.push(change(moved, target));
    }
    let mut floor = target + 1;
    for entity in &visible[to..] {
        if entity.order_index >= floor {
            break;
        }
        changes.push(change(entity, floor));
        floor += 1;
    }
    Some(changes)
}

fn change(entity: &Entity, to: i64) -> OrderChange {
    OrderChange {
        id: entity.id.clone(),
        from: entity.order_index,
        to,
        was_optimistic: entity.is_optimistic,
    }
}
