use std::collections::HashMap;

/// Bidirectional mapping between names and dense ids, assigned in insertion
/// order.
#[derive(Debug, Clone, Default)]
pub(crate) struct Vocabulary {
    ids: HashMap<String, usize>,
    names: Vec<String>,
}

impl Vocabulary {
    pub(crate) fn from_names(names: Vec<String>) -> Self {
        let ids = names
            .iter()
            .enumerate()
            .map(|(id, name)| (name.clone(), id))
            .collect();
        Self { ids, names }
    }

    pub(crate) fn get(&self, name: &str) -> Option<usize> {
        self.ids.get(name).copied()
    }

    pub(crate) fn insert(&mut self, name: &str) -> usize {
        if let Some(id) = self.get(name) {
            return id;
        }
        let id = self.names.len();
        self.ids.insert(name.to_string(), id);
        self.names.push(name.to_string());
        id
    }

    pub(crate) fn len(&self) -> usize {
        self.names.len()
    }

    pub(crate) fn names(&self) -> &[String] {
        &self.names
    }

    pub(crate) fn into_names(self) -> Vec<String> {
        self.names
    }

    /// Renumbers entries in ascending `key` order (stable for equal keys)
    /// and returns the old-to-new id mapping.
    pub(crate) fn reorder_by<K, F>(&mut self, key: F) -> Vec<usize>
    where
        K: Ord,
        F: Fn(&str) -> K,
    {
        let mut order = (0..self.names.len()).collect::<Vec<_>>();
        order.sort_by_key(|&id| key(&self.names[id]));
        let mut mapping = vec![0; order.len()];
        for (new_id, &old_id) in order.iter().enumerate() {
            mapping[old_id] = new_id;
        }
        let mut names = std::mem::take(&mut self.names)
            .into_iter()
            .map(Some)
            .collect::<Vec<_>>();
        self.names = order
            .iter()
            .filter_map(|&old_id| names[old_id].take())
            .collect();
        for id in self.ids.values_mut() {
            *id = mapping[*id];
        }
        mapping
    }
}
