use std::collections::BTreeMap;

/// A frontmatter property value, coerced to strings.
///
/// YAML numbers and booleans become `Scalar` with their natural string form;
/// nested mappings are not supported and become `Empty`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PropertyValue {
    Empty,
    Scalar(String),
    List(Vec<PropertyValue>),
}

pub type PropertyMap = BTreeMap<String, PropertyValue>;

impl PropertyValue {
    pub fn scalar(s: impl Into<String>) -> Self {
        Self::Scalar(s.into())
    }

    pub fn list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::List(items.into_iter().map(|s| Self::Scalar(s.into())).collect())
    }

    /// Empty when absent, all-whitespace, or a list whose every element is empty.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Scalar(s) => s.trim().is_empty(),
            Self::List(items) => items.iter().all(Self::is_empty),
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Self::List(_))
    }

    /// Flattened, trimmed, non-empty strings in original order. Duplicates are kept.
    pub fn normalize(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_normalized(&mut out);
        out
    }

    fn collect_normalized(&self, out: &mut Vec<String>) {
        match self {
            Self::Empty => {}
            Self::Scalar(s) => {
                let s = s.trim();
                if !s.is_empty() {
                    out.push(s.to_string());
                }
            }
            Self::List(items) => {
                for item in items {
                    item.collect_normalized(out);
                }
            }
        }
    }

    /// Untrimmed string form used when comparing against a value being replaced.
    ///
    /// Lists join their elements with `,`; `Empty` has no string form.
    pub fn stringify(&self) -> Option<String> {
        match self {
            Self::Empty => None,
            Self::Scalar(s) => Some(s.clone()),
            Self::List(items) => Some(
                items
                    .iter()
                    .map(|i| i.stringify().unwrap_or_default())
                    .collect::<Vec<_>>()
                    .join(","),
            ),
        }
    }
}

/// Free-function form of [`PropertyValue::normalize`].
pub fn normalize(value: &PropertyValue) -> Vec<String> {
    value.normalize()
}

pub fn yaml_to_property_value(v: &serde_yaml::Value) -> PropertyValue {
    match v {
        serde_yaml::Value::Null => PropertyValue::Empty,
        serde_yaml::Value::Bool(b) => PropertyValue::Scalar(b.to_string()),
        serde_yaml::Value::Number(n) => PropertyValue::Scalar(n.to_string()),
        serde_yaml::Value::String(s) => PropertyValue::Scalar(s.clone()),
        serde_yaml::Value::Sequence(seq) => {
            PropertyValue::List(seq.iter().map(yaml_to_property_value).collect())
        }
        serde_yaml::Value::Mapping(_) => PropertyValue::Empty,
        serde_yaml::Value::Tagged(tagged) => yaml_to_property_value(&tagged.value),
    }
}

/// Top-level frontmatter keys and their values. Keys keep their original case.
pub fn extract_properties(fm: &serde_yaml::Value) -> PropertyMap {
    let mut out = PropertyMap::new();
    let Some(map) = fm.as_mapping() else {
        return out;
    };

    for (k, v) in map {
        let key = match k {
            serde_yaml::Value::String(s) => s.clone(),
            serde_yaml::Value::Number(n) => n.to_string(),
            serde_yaml::Value::Bool(b) => b.to_string(),
            _ => continue,
        };
        out.insert(key, yaml_to_property_value(v));
    }

    out
}

/// Internal names that never show up in groupings.
pub fn is_reserved_property(name: &str) -> bool {
    name.starts_with("__") || name == "position"
}
