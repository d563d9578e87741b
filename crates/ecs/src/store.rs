use std::any::{Any, TypeId, type_name};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use stride_common::EntityId;

/// Errors from store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("entity {0} not found")]
    EntityNotFound(EntityId),
}

/// Storage for every component of one concrete type.
#[derive(Debug)]
pub struct Table<T> {
    rows: BTreeMap<EntityId, T>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
        }
    }
}

impl<T> Table<T> {
    pub fn get(&self, entity: EntityId) -> Option<&T> {
        self.rows.get(&entity)
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.rows.contains_key(&entity)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows in entity id order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &T)> {
        self.rows.iter().map(|(id, c)| (*id, c))
    }
}

/// Type-erased view of a `Table<T>` so the store can clean up on despawn.
trait ErasedTable {
    fn remove_entity(&mut self, entity: EntityId) -> bool;
    fn len(&self) -> usize;
    fn component_name(&self) -> &'static str;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: 'static> ErasedTable for Table<T> {
    fn remove_entity(&mut self, entity: EntityId) -> bool {
        self.rows.remove(&entity).is_some()
    }

    fn len(&self) -> usize {
        self.rows.len()
    }

    fn component_name(&self) -> &'static str {
        type_name::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Owns entities and one table per component type.
#[derive(Default)]
pub struct ComponentStore {
    next_id: u64,
    entities: BTreeSet<EntityId>,
    tables: HashMap<TypeId, Box<dyn ErasedTable>>,
}

impl fmt::Debug for ComponentStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tables: Vec<(&'static str, usize)> = self
            .tables
            .values()
            .map(|t| (t.component_name(), t.len()))
            .collect();
        tables.sort();
        f.debug_struct("ComponentStore")
            .field("entities", &self.entities.len())
            .field("tables", &tables)
            .finish()
    }
}

impl ComponentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new entity with no components.
    pub fn spawn(&mut self) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        self.entities.insert(id);
        tracing::trace!(%id, "spawned entity");
        id
    }

    /// Destroy an entity and every component it owns. Returns false if it
    /// did not exist.
    pub fn despawn(&mut self, entity: EntityId) -> bool {
        if !self.entities.remove(&entity) {
            return false;
        }
        for table in self.tables.values_mut() {
            table.remove_entity(entity);
        }
        tracing::trace!(id = %entity, "despawned entity");
        true
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.entities.contains(&entity)
    }

    /// Number of live entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Live entity ids in creation order.
    pub fn ids(&self) -> impl Iterator<Item = EntityId> {
        self.entities.iter().copied()
    }

    /// Attach a component, replacing and returning any previous one of the
    /// same type.
    pub fn insert<T: 'static>(
        &mut self,
        entity: EntityId,
        component: T,
    ) -> Result<Option<T>, StoreError> {
        if !self.entities.contains(&entity) {
            return Err(StoreError::EntityNotFound(entity));
        }
        Ok(self.table_entry::<T>().rows.insert(entity, component))
    }

    /// Detach a component from an entity.
    pub fn remove<T: 'static>(&mut self, entity: EntityId) -> Option<T> {
        self.table_mut::<T>()?.rows.remove(&entity)
    }

    pub fn get<T: 'static>(&self, entity: EntityId) -> Option<&T> {
        self.table::<T>()?.rows.get(&entity)
    }

    pub fn get_mut<T: 'static>(&mut self, entity: EntityId) -> Option<&mut T> {
        self.table_mut::<T>()?.rows.get_mut(&entity)
    }

    pub fn has<T: 'static>(&self, entity: EntityId) -> bool {
        self.table::<T>().is_some_and(|t| t.contains(entity))
    }

    /// Number of entities carrying a `T`.
    pub fn count<T: 'static>(&self) -> usize {
        self.table::<T>().map_or(0, Table::len)
    }

    /// The table for `T`, if any component of that type was ever inserted.
    pub fn table<T: 'static>(&self) -> Option<&Table<T>> {
        self.tables
            .get(&TypeId::of::<T>())
            .and_then(|t| t.as_any().downcast_ref::<Table<T>>())
    }

    /// All entities having a `T`, in id order.
    pub fn query<T: 'static>(&self) -> impl Iterator<Item = (EntityId, &T)> {
        self.table::<T>().into_iter().flat_map(Table::iter)
    }

    pub fn query_mut<T: 'static>(&mut self) -> impl Iterator<Item = (EntityId, &mut T)> {
        self.table_mut::<T>()
            .into_iter()
            .flat_map(|t| t.rows.iter_mut().map(|(id, c)| (*id, c)))
    }

    /// Entities having both an `A` and a `B`.
    pub fn query_pair<A: 'static, B: 'static>(&self) -> impl Iterator<Item = (EntityId, &A, &B)> {
        let other = self.table::<B>();
        self.query::<A>()
            .filter_map(move |(id, a)| other.and_then(|t| t.get(id)).map(|b| (id, a, b)))
    }

    /// Snapshot of the ids having a `T`. Use this when the loop body needs
    /// mutable access to the store.
    pub fn ids_with<T: 'static>(&self) -> Vec<EntityId> {
        self.query::<T>().map(|(id, _)| id).collect()
    }

    fn table_mut<T: 'static>(&mut self) -> Option<&mut Table<T>> {
        self.tables
            .get_mut(&TypeId::of::<T>())
            .and_then(|t| t.as_any_mut().downcast_mut::<Table<T>>())
    }

    fn table_entry<T: 'static>(&mut self) -> &mut Table<T> {
        self.tables
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(Table::<T>::default()))
            .as_any_mut()
            .downcast_mut::<Table<T>>()
            .expect("table keyed by TypeId::of::<T>() always holds Table<T>")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Health(i32);

    #[derive(Debug, PartialEq)]
    struct Tag(&'static str);

    #[test]
    fn spawn_allocates_sequential_ids() {
        let mut store = ComponentStore::new();
        let a = store.spawn();
        let b = store.spawn();
        assert_eq!(a, EntityId(0));
        assert_eq!(b, EntityId(1));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn insert_get_remove() {
        let mut store = ComponentStore::new();
        let id = store.spawn();
        assert!(store.insert(id, Health(10)).unwrap().is_none());
        assert_eq!(store.get::<Health>(id), Some(&Health(10)));
        assert!(store.has::<Health>(id));
        assert!(!store.has::<Tag>(id));

        assert_eq!(store.remove::<Health>(id), Some(Health(10)));
        assert!(store.get::<Health>(id).is_none());
        assert!(store.contains(id));
    }

    #[test]
    fn insert_replaces_same_type() {
        let mut store = ComponentStore::new();
        let id = store.spawn();
        store.insert(id, Health(1)).unwrap();
        let previous = store.insert(id, Health(2)).unwrap();
        assert_eq!(previous, Some(Health(1)));
        assert_eq!(store.count::<Health>(), 1);
        assert_eq!(store.get::<Health>(id), Some(&Health(2)));
    }

    #[test]
    fn insert_on_missing_entity_fails() {
        let mut store = ComponentStore::new();
        let err = store.insert(EntityId(99), Health(1)).unwrap_err();
        assert!(matches!(err, StoreError::EntityNotFound(EntityId(99))));
    }

    #[test]
    fn despawn_removes_all_components() {
        let mut store = ComponentStore::new();
        let id = store.spawn();
        store.insert(id, Health(5)).unwrap();
        store.insert(id, Tag("enemy")).unwrap();

        assert!(store.despawn(id));
        assert!(!store.contains(id));
        assert_eq!(store.count::<Health>(), 0);
        assert_eq!(store.count::<Tag>(), 0);
        assert!(!store.despawn(id));
    }

    #[test]
    fn query_filters_by_presence_in_id_order() {
        let mut store = ComponentStore::new();
        let a = store.spawn();
        let b = store.spawn();
        let c = store.spawn();
        store.insert(c, Health(3)).unwrap();
        store.insert(a, Health(1)).unwrap();
        store.insert(b, Tag("no health")).unwrap();

        let found: Vec<(EntityId, i32)> = store.query::<Health>().map(|(id, h)| (id, h.0)).collect();
        assert_eq!(found, vec![(a, 1), (c, 3)]);
    }

    #[test]
    fn query_unknown_type_is_empty() {
        let store = ComponentStore::new();
        assert_eq!(store.query::<Health>().count(), 0);
        assert!(store.ids_with::<Tag>().is_empty());
    }

    #[test]
    fn query_mut_updates_in_place() {
        let mut store = ComponentStore::new();
        for i in 0..3 {
            let id = store.spawn();
            store.insert(id, Health(i)).unwrap();
        }
        for (_, h) in store.query_mut::<Health>() {
            h.0 *= 10;
        }
        let values: Vec<i32> = store.query::<Health>().map(|(_, h)| h.0).collect();
        assert_eq!(values, vec![0, 10, 20]);
    }

    #[test]
    fn query_pair_intersects() {
        let mut store = ComponentStore::new();
        let both = store.spawn();
        let only_health = store.spawn();
        let only_tag = store.spawn();
        store.insert(both, Health(1)).unwrap();
        store.insert(both, Tag("both")).unwrap();
        store.insert(only_health, Health(2)).unwrap();
        store.insert(only_tag, Tag("tag")).unwrap();

        let pairs: Vec<EntityId> = store.query_pair::<Health, Tag>().map(|(id, _, _)| id).collect();
        assert_eq!(pairs, vec![both]);
    }

    #[test]
    fn debug_lists_tables() {
        let mut store = ComponentStore::new();
        let id = store.spawn();
        store.insert(id, Health(1)).unwrap();
        let text = format!("{store:?}");
        assert!(text.contains("entities: 1"));
        assert!(text.contains("Health"));
    }
}
