//! Symbol name index for cross-file resolution

use crate::model::NodeId;
use dashmap::DashMap;

/// Maps symbol names (exact and lowercased) to the nodes defining them. Thread-safe for concurrent access.
pub struct SymbolTable {
    by_name: DashMap<String, Vec<NodeId>>,
    /// Lowercased name -> nodes, for case-insensitive lookups.
    by_lower: DashMap<String, Vec<NodeId>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            by_name: DashMap::new(),
            by_lower: DashMap::new(),
        }
    }

    /// Insert a symbol.
    pub fn insert(&self, name: &str, node_id: NodeId) {
        let mut exact = self.by_name.entry(name.to_string()).or_default();
        if !exact.contains(&node_id) {
            exact.push(node_id);
        }
        drop(exact);
        let mut lower = self.by_lower.entry(name.to_lowercase()).or_default();
        if !lower.contains(&node_id) {
            lower.push(node_id);
        }
    }

    /// Remove one symbol's entries.
    pub fn remove(&self, name: &str, node_id: NodeId) {
        remove_from(&self.by_name, name, node_id);
        remove_from(&self.by_lower, &name.to_lowercase(), node_id);
    }

    /// Look up symbols by exact name.
    pub fn lookup(&self, name: &str) -> Vec<NodeId> {
        self.by_name
            .get(name)
            .map(|r| r.value().clone())
            .unwrap_or_default()
    }

    /// Look up symbols whose name equals `name` ignoring case.
    pub fn lookup_case_insensitive(&self, name: &str) -> Vec<NodeId> {
        self.by_lower
            .get(&name.to_lowercase())
            .map(|r| r.value().clone())
            .unwrap_or_default()
    }

    /// Look up symbols whose lowercased name contains `needle` (lowercased).
    pub fn lookup_substring(&self, needle: &str) -> Vec<NodeId> {
        let needle = needle.to_lowercase();
        self.by_lower
            .iter()
            .filter(|entry| entry.key().contains(&needle))
            .flat_map(|entry| entry.value().clone())
            .collect()
    }

    /// All distinct names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.by_name.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.by_name.iter().map(|e| e.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub fn clear(&self) {
        self.by_name.clear();
        self.by_lower.clear();
    }
}

fn remove_from(map: &DashMap<String, Vec<NodeId>>, key: &str, node_id: NodeId) {
    let now_empty = match map.get_mut(key) {
        Some(mut ids) => {
            ids.retain(|id| *id != node_id);
            ids.is_empty()
        }
        None => false,
    };
    if now_empty {
        map.remove(key);
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_tiers() {
        let table = SymbolTable::new();
        table.insert("parseConfig", NodeId(1));
        table.insert("ParseConfig", NodeId(2));
        table.insert("reparseConfigFile", NodeId(3));

        assert_eq!(table.lookup("parseConfig"), vec![NodeId(1)]);
        let mut ci = table.lookup_case_insensitive("PARSECONFIG");
        ci.sort();
        assert_eq!(ci, vec![NodeId(1), NodeId(2)]);
        let mut sub = table.lookup_substring("parseconfig");
        sub.sort();
        assert_eq!(sub, vec![NodeId(1), NodeId(2), NodeId(3)]);
    }

    #[test]
    fn test_remove_drops_empty_keys() {
        let table = SymbolTable::new();
        table.insert("helper", NodeId(7));
        table.remove("helper", NodeId(7));
        assert!(table.lookup("helper").is_empty());
        assert!(table.is_empty());
        assert!(table.lookup_case_insensitive("HELPER").is_empty());
    }
}
