//! [`Context`] and related types/traits.

use std::hash::Hash;
use std::ops;

/// Read-only compilation context, shared by every [`Shader`](crate::Shader)
/// compiled for the same device.
///
/// Unlike the per-shader arenas, nothing in here is mutated by compilation,
/// so a single `Rc<Context>` can be handed to any number of shaders.
pub struct Context {
    pub device: DeviceInfo,
}

impl Context {
    pub fn new(device: DeviceInfo) -> Self {
        Self { device }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new(DeviceInfo::default())
    }
}

/// Hardware capabilities relevant to the backend.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Size of the temporary register file available to a single shader.
    pub num_temps: u32,

    /// Number of dependency counters the backend units can signal through.
    pub num_drcs: u8,

    /// Instruction-cache line size, in bytes, every function must end on.
    pub icache_align: usize,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self { num_temps: 248, num_drcs: 2, icache_align: 8 }
    }
}

/// Entity handle, i.e. an index into some [`EntityDefs`].
///
/// Entities are only ever pushed into their [`EntityDefs`], and a removed
/// definition leaves a vacant slot behind, so that an index is never reused
/// (and handles of removed entities can't alias newer ones).
pub trait Entity: Copy + Eq + Ord + Hash + std::fmt::Debug + 'static {
    type Def;

    #[doc(hidden)]
    fn from_idx(idx: u32) -> Self;
    #[doc(hidden)]
    fn to_idx(self) -> u32;
}

macro_rules! entities {
    ($($(#[$attr:meta])* $name:ident => $def:ty),+ $(,)?) => {
        $(
            $(#[$attr])*
            #[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
            pub struct $name(u32);

            impl Entity for $name {
                type Def = $def;

                fn from_idx(idx: u32) -> Self {
                    $name(idx)
                }
                fn to_idx(self) -> u32 {
                    self.0
                }
            }

            impl std::fmt::Debug for $name {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    write!(f, concat!(stringify!($name), "#{}"), self.0)
                }
            }
        )+
    };
}

entities! {
    /// Function handle (see [`FuncDef`](crate::FuncDef)).
    Func => crate::FuncDef,

    /// Control-flow tree node handle (see [`NodeDef`](crate::NodeDef)).
    Node => crate::NodeDef,

    /// Instruction handle (see [`InstDef`](crate::InstDef)).
    Inst => crate::InstDef,

    /// Instruction group handle (see [`InstGroupDef`](crate::InstGroupDef)).
    InstGroup => crate::InstGroupDef,
}

struct Slot<E: Entity> {
    def: E::Def,

    // Intrusive `EntityList` links (unused if the entity isn't in a list).
    prev: Option<E>,
    next: Option<E>,
}

/// Push-only arena of entity definitions, indexed by `E`.
pub struct EntityDefs<E: Entity> {
    slots: Vec<Option<Slot<E>>>,
}

impl<E: Entity> Default for EntityDefs<E> {
    fn default() -> Self {
        Self { slots: vec![] }
    }
}

impl<E: Entity> EntityDefs<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(&mut self, def: E::Def) -> E {
        let entity = E::from_idx(u32::try_from(self.slots.len()).unwrap());
        self.slots.push(Some(Slot { def, prev: None, next: None }));
        entity
    }

    /// Discard the definition of `entity`, which must not be part of any
    /// [`EntityList`] (see [`EntityList::remove`]).
    pub fn remove(&mut self, entity: E) -> E::Def {
        let slot = self.slots[entity.to_idx() as usize].take().unwrap();
        assert!(
            slot.prev.is_none() && slot.next.is_none(),
            "EntityDefs::remove: {entity:?} is still linked into a list"
        );
        slot.def
    }

    pub fn get(&self, entity: E) -> Option<&E::Def> {
        self.slots.get(entity.to_idx() as usize)?.as_ref().map(|slot| &slot.def)
    }

    pub fn contains(&self, entity: E) -> bool {
        self.get(entity).is_some()
    }

    /// Iterate over all live (i.e. not removed) entities, in definition order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (E, &E::Def)> + '_ {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.as_ref().map(|slot| (E::from_idx(i as u32), &slot.def))
        })
    }

    pub fn iter_mut(&mut self) -> impl DoubleEndedIterator<Item = (E, &mut E::Def)> + '_ {
        self.slots.iter_mut().enumerate().filter_map(|(i, slot)| {
            slot.as_mut().map(|slot| (E::from_idx(i as u32), &mut slot.def))
        })
    }

    pub fn keys(&self) -> impl DoubleEndedIterator<Item = E> + '_ {
        self.iter().map(|(e, _)| e)
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|slot| slot.is_none())
    }

    /// The entity following `entity` in whichever [`EntityList`] it's part of.
    pub fn next_sibling(&self, entity: E) -> Option<E> {
        self.slot(entity).next
    }

    /// The entity preceding `entity` in whichever [`EntityList`] it's part of.
    pub fn prev_sibling(&self, entity: E) -> Option<E> {
        self.slot(entity).prev
    }

    fn slot(&self, entity: E) -> &Slot<E> {
        self.slots[entity.to_idx() as usize].as_ref().unwrap()
    }

    fn slot_mut(&mut self, entity: E) -> &mut Slot<E> {
        self.slots[entity.to_idx() as usize].as_mut().unwrap()
    }
}

impl<E: Entity> ops::Index<E> for EntityDefs<E> {
    type Output = E::Def;

    fn index(&self, entity: E) -> &E::Def {
        &self.slot(entity).def
    }
}

impl<E: Entity> ops::IndexMut<E> for EntityDefs<E> {
    fn index_mut(&mut self, entity: E) -> &mut E::Def {
        &mut self.slot_mut(entity).def
    }
}

/// Doubly-linked list, "intrusively" going through the `EntityDefs<E>` slots
/// of its elements (so every entity can be in at most one list at a time).
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct EntityList<E: Entity>(Option<FirstLast<E>>);

#[derive(Copy, Clone, PartialEq, Eq, Hash)]
struct FirstLast<E> {
    first: E,
    last: E,
}

impl<E: Entity> Default for EntityList<E> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<E: Entity> std::fmt::Debug for EntityList<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Some(FirstLast { first, last }) => write!(f, "EntityList({first:?}..={last:?})"),
            None => f.write_str("EntityList(empty)"),
        }
    }
}

impl<E: Entity> EntityList<E> {
    pub fn empty() -> Self {
        Self(None)
    }

    pub fn is_empty(self) -> bool {
        self.0.is_none()
    }

    pub fn first(self) -> Option<E> {
        Some(self.0?.first)
    }

    pub fn last(self) -> Option<E> {
        Some(self.0?.last)
    }

    pub fn iter(self) -> EntityListIter<E> {
        EntityListIter { first: self.first(), last: self.last() }
    }

    pub fn insert_first(&mut self, new_node: E, defs: &mut EntityDefs<E>) {
        match self.first() {
            Some(first) => self.insert_before(new_node, first, defs),
            None => self.insert_only(new_node, defs),
        }
    }

    pub fn insert_last(&mut self, new_node: E, defs: &mut EntityDefs<E>) {
        match self.last() {
            Some(last) => self.insert_after(new_node, last, defs),
            None => self.insert_only(new_node, defs),
        }
    }

    fn insert_only(&mut self, new_node: E, defs: &mut EntityDefs<E>) {
        Self::assert_unlinked(new_node, defs);
        *self = Self(Some(FirstLast { first: new_node, last: new_node }));
    }

    /// Insert `new_node` right before `next`, which must be in `self`.
    pub fn insert_before(&mut self, new_node: E, next: E, defs: &mut EntityDefs<E>) {
        Self::assert_unlinked(new_node, defs);
        let prev = defs.slot(next).prev;
        {
            let new_slot = defs.slot_mut(new_node);
            new_slot.prev = prev;
            new_slot.next = Some(next);
        }
        defs.slot_mut(next).prev = Some(new_node);
        match prev {
            Some(prev) => defs.slot_mut(prev).next = Some(new_node),
            None => {
                let list = self.0.as_mut().unwrap();
                assert!(list.first == next, "EntityList::insert_before: {next:?} not in list");
                list.first = new_node;
            }
        }
    }

    /// Insert `new_node` right after `prev`, which must be in `self`.
    pub fn insert_after(&mut self, new_node: E, prev: E, defs: &mut EntityDefs<E>) {
        Self::assert_unlinked(new_node, defs);
        let next = defs.slot(prev).next;
        {
            let new_slot = defs.slot_mut(new_node);
            new_slot.prev = Some(prev);
            new_slot.next = next;
        }
        defs.slot_mut(prev).next = Some(new_node);
        match next {
            Some(next) => defs.slot_mut(next).prev = Some(new_node),
            None => {
                let list = self.0.as_mut().unwrap();
                assert!(list.last == prev, "EntityList::insert_after: {prev:?} not in list");
                list.last = new_node;
            }
        }
    }

    /// Unlink `node` (which must be in `self`) from the list, leaving its
    /// definition in place (so it can be reinserted elsewhere, or removed).
    pub fn remove(&mut self, node: E, defs: &mut EntityDefs<E>) {
        let (prev, next) = {
            let slot = defs.slot_mut(node);
            (slot.prev.take(), slot.next.take())
        };
        match prev {
            Some(prev) => defs.slot_mut(prev).next = next,
            None => {
                let list = self.0.as_mut().unwrap();
                assert!(list.first == node, "EntityList::remove: {node:?} not in list");
                match next {
                    Some(next) => list.first = next,
                    None => {
                        self.0 = None;
                        return;
                    }
                }
            }
        }
        match next {
            Some(next) => defs.slot_mut(next).prev = prev,
            None => self.0.as_mut().unwrap().last = prev.unwrap(),
        }
    }

    fn assert_unlinked(node: E, defs: &EntityDefs<E>) {
        let slot = defs.slot(node);
        assert!(
            slot.prev.is_none() && slot.next.is_none(),
            "EntityList: {node:?} is already linked into a list"
        );
    }
}

/// [`EntityList<E>`] iterator, but with a different API than [`Iterator`].
///
/// This can also be considered a (non-random-access) "subslice" of the list.
#[derive(Copy, Clone)]
pub struct EntityListIter<E: Entity> {
    pub first: Option<E>,
    pub last: Option<E>,
}

impl<E: Entity> EntityListIter<E> {
    #[must_use]
    pub fn split_first(self, defs: &EntityDefs<E>) -> Option<(E, Self)> {
        let Self { first, last } = self;
        let current = first?;
        let next = defs.slot(current).next;
        Some((
            current,
            if Some(current) == last { Self { first: None, last: None } } else { Self { first: next, last } },
        ))
    }

    #[must_use]
    pub fn split_last(self, defs: &EntityDefs<E>) -> Option<(E, Self)> {
        let Self { first, last } = self;
        let current = last?;
        let prev = defs.slot(current).prev;
        Some((
            current,
            if Some(current) == first { Self { first: None, last: None } } else { Self { first, last: prev } },
        ))
    }

    /// Collect the remaining entities, for when `defs` has to be mutated.
    pub fn collect_vec(self, defs: &EntityDefs<E>) -> Vec<E> {
        let mut entities = vec![];
        let mut iter = self;
        while let Some((e, rest)) = iter.split_first(defs) {
            entities.push(e);
            iter = rest;
        }
        entities
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // A tiny entity type, to exercise the lists without building any IR.
    #[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
    struct E(u32);
    impl Entity for E {
        type Def = char;
        fn from_idx(idx: u32) -> Self {
            E(idx)
        }
        fn to_idx(self) -> u32 {
            self.0
        }
    }

    fn chars(list: EntityList<E>, defs: &EntityDefs<E>) -> String {
        list.iter().collect_vec(defs).into_iter().map(|e| defs[e]).collect()
    }

    #[test]
    fn list_editing() {
        let mut defs = EntityDefs::<E>::new();
        let [a, b, c, d] = ['a', 'b', 'c', 'd'].map(|ch| defs.define(ch));

        let mut list = EntityList::empty();
        list.insert_last(b, &mut defs);
        list.insert_first(a, &mut defs);
        list.insert_last(d, &mut defs);
        list.insert_before(c, d, &mut defs);
        assert_eq!(chars(list, &defs), "abcd");

        list.remove(a, &mut defs);
        list.remove(d, &mut defs);
        assert_eq!(chars(list, &defs), "bc");
        assert_eq!(defs.remove(a), 'a');

        list.insert_after(d, b, &mut defs);
        assert_eq!(chars(list, &defs), "bdc");
        assert_eq!(defs.next_sibling(b), Some(d));
        assert_eq!(defs.prev_sibling(b), None);

        // Removed slots stay vacant, new entities get fresh indices.
        let e = defs.define('e');
        assert_eq!(e, E(4));
        assert!(!defs.contains(a));
    }

    #[test]
    fn list_iter_back() {
        let mut defs = EntityDefs::<E>::new();
        let mut xs = EntityList::empty();
        for ch in ['x', 'y', 'z'] {
            let e = defs.define(ch);
            xs.insert_last(e, &mut defs);
        }
        assert_eq!(chars(xs, &defs), "xyz");

        let mut rev = String::new();
        let mut iter = xs.iter();
        while let Some((e, rest)) = iter.split_last(&defs) {
            rev.push(defs[e]);
            iter = rest;
        }
        assert_eq!(rev, "zyx");
    }
}
