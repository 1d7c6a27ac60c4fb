use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::{PropertyMap, Result, VaultPath};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    #[default]
    Equals,
    Contains,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Combinator {
    #[default]
    #[serde(rename = "AND", alias = "and")]
    And,
    #[serde(rename = "OR", alias = "or")]
    Or,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(alias = "propertyName")]
    pub property_name: String,
    #[serde(default)]
    pub operator: Operator,
    #[serde(alias = "propertyValue")]
    pub value: String,
}

impl Condition {
    pub fn equals(property_name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            property_name: property_name.into(),
            operator: Operator::Equals,
            value: value.into(),
        }
    }

    pub fn contains(property_name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            property_name: property_name.into(),
            operator: Operator::Contains,
            value: value.into(),
        }
    }

    /// A condition with a blank property name can never be evaluated.
    pub fn is_usable(&self) -> bool {
        !self.property_name.trim().is_empty()
    }

    pub fn evaluate(&self, properties: &PropertyMap) -> bool {
        let Some(raw) = properties.get(&self.property_name) else {
            return false;
        };
        let values = raw.normalize();
        if values.is_empty() {
            return false;
        }

        match self.operator {
            Operator::Equals => values.iter().any(|v| *v == self.value),
            Operator::Contains => {
                let needle = self.value.to_lowercase();
                values.iter().any(|v| v.to_lowercase().contains(&needle))
            }
        }
    }
}

/// One linking rule: when a note matches, it is listed on `target_page` under `target_heading`.
///
/// Older settings carry a single `property_name`/`property_value` pair instead of a
/// condition list; that shape is read as one `equals` condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(
        default,
        alias = "propertyName",
        skip_serializing_if = "Option::is_none"
    )]
    pub property_name: Option<String>,
    #[serde(
        default,
        alias = "propertyValue",
        skip_serializing_if = "Option::is_none"
    )]
    pub property_value: Option<String>,
    /// Page name without extension; may include folders.
    #[serde(alias = "targetPage")]
    pub target_page: String,
    /// Full heading line, including its `#` prefix.
    #[serde(alias = "targetHeading")]
    pub target_heading: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default, alias = "logic", alias = "logicalOperator")]
    pub combinator: Combinator,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

fn default_enabled() -> bool {
    true
}

impl SourceConfig {
    pub fn new(target_page: impl Into<String>, target_heading: impl Into<String>) -> Self {
        Self {
            conditions: Vec::new(),
            combinator: Combinator::And,
            property_name: None,
            property_value: None,
            target_page: target_page.into(),
            target_heading: target_heading.into(),
            enabled: true,
        }
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_combinator(mut self, combinator: Combinator) -> Self {
        self.combinator = combinator;
        self
    }

    pub fn legacy(
        property_name: impl Into<String>,
        property_value: impl Into<String>,
        target_page: impl Into<String>,
        target_heading: impl Into<String>,
    ) -> Self {
        Self {
            property_name: Some(property_name.into()),
            property_value: Some(property_value.into()),
            ..Self::new(target_page, target_heading)
        }
    }

    /// The condition list, falling back to the legacy single pair.
    pub fn effective_conditions(&self) -> Cow<'_, [Condition]> {
        if !self.conditions.is_empty() {
            return Cow::Borrowed(&self.conditions);
        }
        match (&self.property_name, &self.property_value) {
            (Some(name), Some(value)) if !name.trim().is_empty() => {
                Cow::Owned(vec![Condition::equals(name.clone(), value.clone())])
            }
            _ => Cow::Owned(Vec::new()),
        }
    }

    pub fn hub_path(&self) -> Result<VaultPath> {
        VaultPath::from_page_name(&self.target_page)
    }

    /// Whether a note with these properties belongs on this rule's hub page.
    pub fn matches(&self, properties: &PropertyMap) -> bool {
        let conditions = self.effective_conditions();
        let usable: Vec<&Condition> = conditions.iter().filter(|c| c.is_usable()).collect();
        if usable.is_empty() {
            return false;
        }

        match self.combinator {
            Combinator::And => usable.iter().all(|c| c.evaluate(properties)),
            Combinator::Or => usable.iter().any(|c| c.evaluate(properties)),
        }
    }

    /// Human-readable summary, e.g. `project = SO1 AND tag ~ x`.
    pub fn describe(&self) -> String {
        let joiner = match self.combinator {
            Combinator::And => " AND ",
            Combinator::Or => " OR ",
        };
        let parts: Vec<String> = self
            .effective_conditions()
            .iter()
            .map(|c| {
                let op = match c.operator {
                    Operator::Equals => "=",
                    Operator::Contains => "~",
                };
                format!("{} {op} {}", c.property_name, c.value)
            })
            .collect();
        if parts.is_empty() {
            return "(no conditions)".into();
        }
        parts.join(joiner)
    }
}

/// Free-function form of [`SourceConfig::matches`].
pub fn matches(properties: &PropertyMap, config: &SourceConfig) -> bool {
    config.matches(properties)
}
