use std::collections::HashMap;

use crate::shared::person_name::PersonName;

/// Dense classifier label assigned to a person for one training run.
pub type Label = u32;

/// Bidirectional mapping between dense labels `0..N-1` and person names.
///
/// Built fresh for every training run from the sorted set of names, so
/// the same corpus always yields the same labels.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LabelMap {
    names: Vec<PersonName>,
    labels: HashMap<PersonName, Label>,
}

impl LabelMap {
    pub fn new(names: impl IntoIterator<Item = PersonName>) -> Self {
        let mut names: Vec<PersonName> = names.into_iter().collect();
        names.sort();
        names.dedup();
        let labels = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), i as Label))
            .collect();
        Self { names, labels }
    }

    pub fn name(&self, label: Label) -> Option<&PersonName> {
        self.names.get(label as usize)
    }

    pub fn label(&self, name: &PersonName) -> Option<Label> {
        self.labels.get(name).copied()
    }

    pub fn contains(&self, label: Label) -> bool {
        (label as usize) < self.names.len()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Names in label order.
    pub fn names(&self) -> &[PersonName] {
        &self.names
    }
}
