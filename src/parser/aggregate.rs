use crate::macros::MacroMap;

/// Merges per-file macro maps into one.
///
/// Files must be merged in input order: a later definition of a name
/// replaces an earlier one.
#[derive(Debug, Default)]
pub struct Aggregator {
    macros: MacroMap,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(&mut self, file_macros: MacroMap) {
        self.macros.extend(file_macros);
    }

    pub fn len(&self) -> usize {
        self.macros.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }

    pub fn finish(self) -> MacroMap {
        self.macros
    }
}
