//! Constant interning: every constant is stored once and tuples are keyed
//! by `ConstId` sequences.

use ahash::AHashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct ConstId(pub(crate) u32);

#[derive(Debug, Clone, Default)]
pub(crate) struct ConstInterner {
    ids: AHashMap<String, ConstId>,
    names: Vec<String>,
}

impl ConstInterner {
    /// Intern a constant, returning its ID
    pub(crate) fn intern(&mut self, name: &str) -> ConstId {
        if let Some(id) = self.ids.get(name) {
            return *id;
        }
        let id = ConstId(self.names.len() as u32);
        self.ids.insert(name.to_string(), id);
        self.names.push(name.to_string());
        id
    }

    /// Look up an existing ID without inserting.
    pub(crate) fn id_of(&self, name: &str) -> Option<ConstId> {
        self.ids.get(name).copied()
    }

    pub(crate) fn name(&self, id: ConstId) -> Option<&str> {
        self.names.get(id.0 as usize).map(String::as_str)
    }
}
