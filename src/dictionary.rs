use std::collections::HashMap;
use std::hash::Hash;

/// A bidirectional dictionary between values and dense integer IDs
///
/// IDs are handed out in insertion order starting at 0; the first insertion
/// of a value keeps its ID and its stored copy.
#[derive(Debug, Clone)]
pub struct Dictionary<K> {
    /// Map from value to ID
    to_id: HashMap<K, usize>,
    /// Map from ID to value
    values: Vec<K>,
}

impl<K: Hash + Eq + Clone> Dictionary<K> {
    /// Create a new empty dictionary
    pub fn new() -> Self {
        Self {
            to_id: HashMap::new(),
            values: Vec::new(),
        }
    }

    /// Get the number of entries in the dictionary
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if the dictionary contains no entries
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get or create an ID for a value
    pub fn get_or_insert(&mut self, value: &K) -> usize {
        if let Some(&id) = self.to_id.get(value) {
            id
        } else {
            let id = self.values.len();
            self.to_id.insert(value.clone(), id);
            self.values.push(value.clone());
            id
        }
    }

    /// Like [`get_or_insert`](Self::get_or_insert), taking ownership of the value
    pub fn insert_owned(&mut self, value: K) -> usize {
        if let Some(&id) = self.to_id.get(&value) {
            id
        } else {
            let id = self.values.len();
            self.to_id.insert(value.clone(), id);
            self.values.push(value);
            id
        }
    }

    /// Look up the ID of a value
    pub fn id<Q>(&self, value: &Q) -> Option<usize>
    where
        K: std::borrow::Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.to_id.get(value).copied()
    }

    /// Look up the value stored under an ID
    pub fn get(&self, id: usize) -> Option<&K> {
        self.values.get(id)
    }

    /// Iterate over all (value, id) pairs in ID order
    pub fn iter(&self) -> impl Iterator<Item = (&K, usize)> + '_ {
        self.values.iter().enumerate().map(|(id, value)| (value, id))
    }
}

impl<K: Hash + Eq + Clone> Default for Dictionary<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Hash + Eq + Clone> FromIterator<K> for Dictionary<K> {
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        let mut dict = Dictionary::new();
        for value in iter {
            dict.insert_owned(value);
        }
        dict
    }
}
