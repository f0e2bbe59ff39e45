use crate::capability::TypeKey;
use crate::item::{Item, ItemKey};
use std::collections::HashMap;

/// Maps every capability to the items satisfying it, in storage order.
///
/// Items are indexed eagerly under each declared capability when they are
/// inserted, so a query is a single map access.
#[derive(Default)]
pub(crate) struct Index {
    by_type: HashMap<TypeKey, Vec<Item>>,
}

impl Index {
    pub(crate) fn rebuild(items: &[Item]) -> Self {
        let mut index = Self::default();
        for item in items {
            index.insert(item);
        }
        index
    }

    pub(crate) fn insert(&mut self, item: &Item) {
        for key in item.capability_keys() {
            self.by_type.entry(key).or_default().push(item.clone());
        }
    }

    pub(crate) fn remove(&mut self, item: &Item) {
        for key in item.capability_keys() {
            self.remove_from(&key, item.key());
        }
    }

    fn remove_from(&mut self, key: &TypeKey, item: &ItemKey) {
        if let Some(items) = self.by_type.get_mut(key) {
            items.retain(|existing| existing.key() != item);
            if items.is_empty() {
                self.by_type.remove(key);
            }
        }
    }

    /// Swaps `old` for `new` keeping its position; both share the same key
    pub(crate) fn replace(&mut self, old: &Item, new: &Item) {
        for key in old.capability_keys() {
            if !new.satisfies_key(&key) {
                self.remove_from(&key, old.key());
                continue;
            }
            if let Some(slot) = self
                .by_type
                .get_mut(&key)
                .and_then(|items| items.iter_mut().find(|existing| existing.key() == old.key()))
            {
                *slot = new.clone();
            }
        }
        for key in new.capability_keys() {
            if !old.satisfies_key(&key) {
                self.by_type.entry(key).or_default().push(new.clone());
            }
        }
    }

    pub(crate) fn items(&self, key: &TypeKey) -> &[Item] {
        self.by_type.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    #[cfg(test)]
    fn contains(&self, key: &TypeKey, item: &ItemKey) -> bool {
        self.items(key).iter().any(|existing| existing.key() == item)
    }
}

/// Returns true if both snapshots hold the same items by identity, ignoring order
pub(crate) fn same_members(left: &[Item], right: &[Item]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    let keys: std::collections::HashSet<&ItemKey> = left.iter().map(Item::key).collect();
    right.iter().all(|item| keys.contains(item.key()))
}

/// Drops later items whose key was already seen, keeping first-seen order
pub(crate) fn dedup_items(items: impl IntoIterator<Item = Item>) -> Vec<Item> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.key().clone()))
        .collect()
}
