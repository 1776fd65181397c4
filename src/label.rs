//! Diagnostic labels shared by every entity.

use std::fmt;

/// Optional human-readable name attached to an entity and forwarded to the
/// GPU objects it creates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Label(Option<String>);

impl Label {
    #[must_use]
    pub fn new(label: Option<String>) -> Self {
        Self(label)
    }

    #[must_use]
    pub fn get(&self) -> Option<&str> {
        self.0.as_deref()
    }

    pub fn set(&mut self, label: impl Into<String>) {
        self.0 = Some(label.into());
    }

    /// Builds the label of a derived GPU object, e.g. `"Grid Uniform Buffer"`.
    #[must_use]
    pub fn derive(&self, suffix: &str) -> String {
        format!("{} {suffix}", self.0.as_deref().unwrap_or("Unlabelled"))
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_deref().unwrap_or("Unlabelled"))
    }
}

impl From<&str> for Label {
    fn from(value: &str) -> Self {
        Self(Some(value.to_owned()))
    }
}

impl From<String> for Label {
    fn from(value: String) -> Self {
        Self(Some(value))
    }
}

impl From<Option<String>> for Label {
    fn from(value: Option<String>) -> Self {
        Self(value)
    }
}
