use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::RetrievalError;

/// Whether a retrieval preprocesses raw lists into the canonical layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PreprocessMode {
    /// Preprocess whenever the canonicalizer supports the current platform.
    #[default]
    Auto,
    Always,
    Never,
}

impl fmt::Display for PreprocessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreprocessMode::Auto => write!(f, "auto"),
            PreprocessMode::Always => write!(f, "always"),
            PreprocessMode::Never => write!(f, "never"),
        }
    }
}

/// A raw column, addressed either by position or by its header name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnRef {
    Number(usize),
    Name(String),
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnRef::Number(number) => write!(f, "#{number}"),
            ColumnRef::Name(name) => write!(f, "{name}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct GraphName(String);

impl GraphName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GraphName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GraphName {
    type Err = RetrievalError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        if !is_path_safe(normalized) {
            return Err(RetrievalError::InvalidGraphName(value.to_string()));
        }
        Ok(Self(normalized.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DatasetNamespace(String);

impl DatasetNamespace {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DatasetNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DatasetNamespace {
    type Err = RetrievalError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_lowercase();
        let is_valid = !normalized.is_empty()
            && normalized
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_');
        if !is_valid {
            return Err(RetrievalError::InvalidNamespace(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct GraphVersion(String);

impl GraphVersion {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GraphVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GraphVersion {
    type Err = RetrievalError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        if !is_path_safe(normalized) {
            return Err(RetrievalError::InvalidVersion(value.to_string()));
        }
        Ok(Self(normalized.to_string()))
    }
}

/// `namespace:graph` with an optional `@version` suffix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetSpecifier {
    pub namespace: DatasetNamespace,
    pub name: GraphName,
    pub version: Option<GraphVersion>,
}

impl fmt::Display for DatasetSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.name)?;
        if let Some(version) = &self.version {
            write!(f, "@{version}")?;
        }
        Ok(())
    }
}

impl FromStr for DatasetSpecifier {
    type Err = RetrievalError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let (namespace, rest) = trimmed
            .split_once(':')
            .ok_or_else(|| RetrievalError::InvalidSpecifier(value.to_string()))?;
        let (name, version) = match rest.split_once('@') {
            Some((name, version)) => (name, Some(version.parse()?)),
            None => (rest, None),
        };
        Ok(Self {
            namespace: namespace.parse()?,
            name: name.parse()?,
            version,
        })
    }
}

pub fn directedness_label(directed: bool) -> &'static str {
    if directed { "directed" } else { "undirected" }
}

// Identity components become directory names inside the cache.
fn is_path_safe(value: &str) -> bool {
    !value.is_empty()
        && value != "."
        && value != ".."
        && !value.contains(['/', '\\', ':', '@'])
        && !value.chars().any(char::is_control)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn namespace_is_lowercased() {
        let namespace: DatasetNamespace = "LINQS".parse().unwrap();
        assert_eq!(namespace.as_str(), "linqs");
    }

    #[test]
    fn graph_name_rejects_path_separators() {
        let err = "../etc".parse::<GraphName>().unwrap_err();
        assert_matches!(err, RetrievalError::InvalidGraphName(_));
    }

    #[test]
    fn parse_specifier_with_version() {
        let spec: DatasetSpecifier = "linqs:Cora@2020-01-01".parse().unwrap();
        assert_eq!(spec.namespace.as_str(), "linqs");
        assert_eq!(spec.name.as_str(), "Cora");
        assert_eq!(spec.version.unwrap().as_str(), "2020-01-01");
    }
}
