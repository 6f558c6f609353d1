use bevy::prelude::*;
use std::collections::BTreeSet;

/// Collected quest item identifiers. Items in this game are unique, so the
/// inventory is a set rather than stacked slots.
#[derive(Component, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Inventory {
    pub items: BTreeSet<String>,
}

impl Inventory {
    pub fn add(&mut self, item_id: &str) -> bool {
        self.items.insert(item_id.to_string())
    }

    pub fn remove(&mut self, item_id: &str) -> bool {
        self.items.remove(item_id)
    }

    pub fn has(&self, item_id: &str) -> bool {
        self.items.contains(item_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_pickup_is_a_no_op() {
        let mut inv = Inventory::default();
        assert!(inv.add("rusty_key"));
        assert!(!inv.add("rusty_key"));
        assert!(inv.has("rusty_key"));
        assert!(inv.remove("rusty_key"));
        assert!(!inv.has("rusty_key"));
    }
}
