use std::collections::{HashMap, HashSet, VecDeque};
use uuid::Uuid;

use super::value_objects::FulfillmentUnit;

// ============================================================================
// Unit Arena
// ============================================================================
//
// Flat unit storage addressed by id. Deal containment is a back-reference
// (`parent_unit_id`) plus a secondary `parent -> children` index, so a
// station can address any unit without walking a tree.
//
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct UnitArena {
    units: HashMap<Uuid, FulfillmentUnit>,
    /// Insertion order, for stable presentation
    ordering: Vec<Uuid>,
    children: HashMap<Uuid, Vec<Uuid>>,
}

impl UnitArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a unit. A component whose parent is absent is refused.
    pub fn insert(&mut self, unit: FulfillmentUnit) -> Result<(), FulfillmentUnit> {
        if self.units.contains_key(&unit.unit_id) {
            return Err(unit);
        }
        if let Some(parent_id) = unit.parent_unit_id {
            if !self.units.contains_key(&parent_id) {
                return Err(unit);
            }
            self.children.entry(parent_id).or_default().push(unit.unit_id);
        }

        self.ordering.push(unit.unit_id);
        self.units.insert(unit.unit_id, unit);
        Ok(())
    }

    pub fn get(&self, unit_id: &Uuid) -> Option<&FulfillmentUnit> {
        self.units.get(unit_id)
    }

    pub fn get_mut(&mut self, unit_id: &Uuid) -> Option<&mut FulfillmentUnit> {
        self.units.get_mut(unit_id)
    }

    pub fn contains(&self, unit_id: &Uuid) -> bool {
        self.units.contains_key(unit_id)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Units in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &FulfillmentUnit> {
        self.ordering.iter().filter_map(|id| self.units.get(id))
    }

    pub fn children_of(&self, parent_id: &Uuid) -> &[Uuid] {
        self.children.get(parent_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The unit itself followed by every unit that descends from it
    pub fn cascade_ids(&self, unit_id: &Uuid) -> Vec<Uuid> {
        if !self.units.contains_key(unit_id) {
            return Vec::new();
        }

        let mut seen = HashSet::new();
        let mut result = Vec::new();
        let mut queue = VecDeque::from([*unit_id]);

        while let Some(id) = queue.pop_front() {
            if !seen.insert(id) {
                continue;
            }
            result.push(id);
            queue.extend(self.children_of(&id).iter().copied());
        }

        result
    }

    /// Remove a unit together with its descendants. Returns the removed units.
    pub fn remove_cascade(&mut self, unit_id: &Uuid) -> Vec<FulfillmentUnit> {
        let ids = self.cascade_ids(unit_id);
        if ids.is_empty() {
            return Vec::new();
        }

        let doomed: HashSet<Uuid> = ids.iter().copied().collect();
        self.ordering.retain(|id| !doomed.contains(id));

        let mut removed = Vec::with_capacity(ids.len());
        for id in &ids {
            self.children.remove(id);
            if let Some(unit) = self.units.remove(id) {
                removed.push(unit);
            }
        }

        if let Some(parent_id) = removed.first().and_then(|u| u.parent_unit_id) {
            if let Some(siblings) = self.children.get_mut(&parent_id) {
                siblings.retain(|id| !doomed.contains(id));
            }
        }

        removed
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::CatalogId;
    use rust_decimal::Decimal;

    fn unit(parent: Option<Uuid>) -> FulfillmentUnit {
        FulfillmentUnit {
            unit_id: Uuid::new_v4(),
            catalog_id: CatalogId::new("x"),
            name: "X".to_string(),
            quantity: 1,
            price: Decimal::ONE,
            base_price: Decimal::ONE,
            station_id: None,
            is_component: parent.is_some(),
            parent_unit_id: parent,
            is_deal: false,
            is_prepared: false,
            is_dispatched: false,
            prepared_at: None,
            dispatched_at: None,
            selected_addons: vec![],
            selected_variant: None,
            instructions: None,
        }
    }

    #[test]
    fn test_insert_maintains_order_and_index() {
        let mut arena = UnitArena::new();
        let parent = unit(None);
        let parent_id = parent.unit_id;
        let a = unit(Some(parent_id));
        let b = unit(Some(parent_id));
        let (a_id, b_id) = (a.unit_id, b.unit_id);

        arena.insert(parent).unwrap();
        arena.insert(a).unwrap();
        arena.insert(b).unwrap();

        let ids: Vec<Uuid> = arena.iter().map(|u| u.unit_id).collect();
        assert_eq!(ids, vec![parent_id, a_id, b_id]);
        assert_eq!(arena.children_of(&parent_id), &[a_id, b_id]);
        assert!(arena.children_of(&a_id).is_empty());
    }

    #[test]
    fn test_orphan_component_is_refused() {
        let mut arena = UnitArena::new();
        assert!(arena.insert(unit(Some(Uuid::new_v4()))).is_err());
        assert!(arena.is_empty());
    }

    #[test]
    fn test_duplicate_id_is_refused() {
        let mut arena = UnitArena::new();
        let u = unit(None);
        arena.insert(u.clone()).unwrap();
        assert!(arena.insert(u).is_err());
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn test_cascade_delete_removes_only_descendants() {
        let mut arena = UnitArena::new();
        let deal = unit(None);
        let other = unit(None);
        let deal_id = deal.unit_id;
        let other_id = other.unit_id;
        arena.insert(deal).unwrap();
        arena.insert(other).unwrap();

        let kids: Vec<FulfillmentUnit> = (0..3).map(|_| unit(Some(deal_id))).collect();
        let other_kid = unit(Some(other_id));
        let other_kid_id = other_kid.unit_id;
        for kid in kids {
            arena.insert(kid).unwrap();
        }
        arena.insert(other_kid).unwrap();

        let removed = arena.remove_cascade(&deal_id);

        assert_eq!(removed.len(), 4);
        assert!(removed.iter().all(|u| u.unit_id == deal_id || u.parent_unit_id == Some(deal_id)));
        assert_eq!(arena.len(), 2);
        assert!(arena.contains(&other_id));
        assert!(arena.contains(&other_kid_id));
        assert!(arena.children_of(&deal_id).is_empty());
        assert_eq!(arena.iter().count(), 2);
    }

    #[test]
    fn test_removing_a_child_updates_parent_index() {
        let mut arena = UnitArena::new();
        let deal = unit(None);
        let deal_id = deal.unit_id;
        arena.insert(deal).unwrap();
        let kid = unit(Some(deal_id));
        let kid_id = kid.unit_id;
        arena.insert(kid).unwrap();

        assert_eq!(arena.remove_cascade(&kid_id).len(), 1);
        assert!(arena.children_of(&deal_id).is_empty());
        assert!(arena.remove_cascade(&kid_id).is_empty());
    }
}
