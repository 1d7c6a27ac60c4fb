use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::properties::is_reserved_property;
use crate::store::NoteStore;
use crate::{PropertyMap, Result, VaultPath};

/// Property name -> normalized value -> notes carrying that value.
///
/// Rebuilt from scratch on every request; map order carries no meaning, use
/// [`PropertyGroups::sorted`] for display.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyGroups {
    groups: HashMap<String, HashMap<String, Vec<VaultPath>>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyGroup {
    pub property: String,
    pub values: Vec<ValueGroup>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueGroup {
    pub value: String,
    pub notes: Vec<VaultPath>,
}

impl PropertyGroups {
    /// Group notes by property value.
    ///
    /// Excluded and reserved names are skipped, as are values that normalize to nothing.
    /// A note listing the same value twice appears twice in that bucket.
    pub fn build<'a, I>(notes: I, excluded: &HashSet<String>) -> Self
    where
        I: IntoIterator<Item = (&'a VaultPath, &'a PropertyMap)>,
    {
        let mut groups: HashMap<String, HashMap<String, Vec<VaultPath>>> = HashMap::new();
        for (path, props) in notes {
            for (name, value) in props {
                if excluded.contains(name) || is_reserved_property(name) {
                    continue;
                }
                let values = value.normalize();
                if values.is_empty() {
                    continue;
                }
                let by_value = groups.entry(name.clone()).or_default();
                for v in values {
                    by_value.entry(v).or_default().push(path.clone());
                }
            }
        }
        Self { groups }
    }

    pub fn from_store<S: NoteStore + ?Sized>(store: &S, excluded: &HashSet<String>) -> Result<Self> {
        let notes = store.snapshot()?;
        Ok(Self::build(
            notes.iter().filter_map(|(p, m)| m.as_ref().map(|m| (p, m))),
            excluded,
        ))
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn properties(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    pub fn values(&self, property: &str) -> Option<&HashMap<String, Vec<VaultPath>>> {
        self.groups.get(property)
    }

    pub fn notes(&self, property: &str, value: &str) -> &[VaultPath] {
        self.groups
            .get(property)
            .and_then(|m| m.get(value))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Display order: properties and values alphabetically, notes by basename.
    pub fn sorted(&self) -> Vec<PropertyGroup> {
        let mut out: Vec<PropertyGroup> = self
            .groups
            .iter()
            .map(|(property, by_value)| {
                let mut values: Vec<ValueGroup> = by_value
                    .iter()
                    .map(|(value, notes)| {
                        let mut notes = notes.clone();
                        notes.sort_by(|a, b| {
                            display_cmp(&a.basename(), &b.basename()).then_with(|| a.cmp(b))
                        });
                        ValueGroup {
                            value: value.clone(),
                            notes,
                        }
                    })
                    .collect();
                values.sort_by(|a, b| display_cmp(&a.value, &b.value));
                PropertyGroup {
                    property: property.clone(),
                    values,
                }
            })
            .collect();
        out.sort_by(|a, b| display_cmp(&a.property, &b.property));
        out
    }
}

fn display_cmp(a: &str, b: &str) -> std::cmp::Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

/// Candidate lists for the settings form fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SuggestionData {
    /// Sorted names of properties that have at least one non-empty value.
    pub property_names: Vec<String>,
    pub property_values: BTreeMap<String, BTreeSet<String>>,
    /// Sorted note paths without extension, usable as target pages.
    pub page_names: Vec<String>,
}

impl SuggestionData {
    pub fn build<'a, I>(notes: I) -> Self
    where
        I: IntoIterator<Item = (&'a VaultPath, Option<&'a PropertyMap>)>,
    {
        let mut pages = BTreeSet::new();
        let mut values: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

        for (path, props) in notes {
            pages.insert(path.link_target());
            let Some(props) = props else {
                continue;
            };
            for (name, value) in props {
                if is_reserved_property(name) || value.is_empty() {
                    continue;
                }
                values
                    .entry(name.clone())
                    .or_default()
                    .extend(value.normalize());
            }
        }

        Self {
            property_names: values.keys().cloned().collect(),
            property_values: values,
            page_names: pages.into_iter().collect(),
        }
    }

    pub fn from_store<S: NoteStore + ?Sized>(store: &S) -> Result<Self> {
        let notes = store.snapshot()?;
        Ok(Self::build(notes.iter().map(|(p, m)| (p, m.as_ref()))))
    }

    pub fn values_for(&self, property: &str) -> Vec<String> {
        self.property_values
            .get(property)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }
}
