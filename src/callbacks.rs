use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RetrievalError;
use crate::fs_util::is_contained_relative;

pub type CallbackFn =
    Arc<dyn Fn(&CallbackArguments) -> Result<(), RetrievalError> + Send + Sync + 'static>;

/// A declared callback argument. Paths are relative to the dataset directory
/// and are rewritten to absolute paths before the callback runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallbackArg {
    Path(Utf8PathBuf),
    Value(Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CallbackDocument {
    pub name: String,
    #[serde(default)]
    pub arguments: BTreeMap<String, CallbackArg>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedArg {
    Path(Utf8PathBuf),
    Value(Value),
}

/// Arguments handed to a callback, with every path already absolute.
#[derive(Debug, Clone)]
pub struct CallbackArguments {
    callback: String,
    values: BTreeMap<String, ResolvedArg>,
}

impl CallbackArguments {
    pub fn path(&self, key: &str) -> Result<&Utf8Path, RetrievalError> {
        match self.values.get(key) {
            Some(ResolvedArg::Path(path)) => Ok(path.as_path()),
            Some(ResolvedArg::Value(_)) => Err(self.error(format!("`{key}` must be a path"))),
            None => Err(self.error(format!("missing argument `{key}`"))),
        }
    }

    pub fn optional_path(&self, key: &str) -> Result<Option<&Utf8Path>, RetrievalError> {
        if self.values.contains_key(key) {
            return self.path(key).map(Some);
        }
        Ok(None)
    }

    pub fn value(&self, key: &str) -> Result<&Value, RetrievalError> {
        match self.values.get(key) {
            Some(ResolvedArg::Value(value)) => Ok(value),
            Some(ResolvedArg::Path(_)) => Err(self.error(format!("`{key}` must be a value"))),
            None => Err(self.error(format!("missing argument `{key}`"))),
        }
    }

    pub fn str(&self, key: &str) -> Result<&str, RetrievalError> {
        self.value(key)?
            .as_str()
            .ok_or_else(|| self.error(format!("`{key}` must be a string")))
    }

    pub fn error(&self, message: impl Into<String>) -> RetrievalError {
        RetrievalError::Callback {
            name: self.callback.clone(),
            message: message.into(),
        }
    }
}

#[derive(Clone)]
pub struct CallbackInvocation {
    name: String,
    function: CallbackFn,
    arguments: BTreeMap<String, CallbackArg>,
}

impl fmt::Debug for CallbackInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackInvocation")
            .field("name", &self.name)
            .field("arguments", &self.arguments)
            .finish_non_exhaustive()
    }
}

impl CallbackInvocation {
    pub fn new(
        name: impl Into<String>,
        function: CallbackFn,
        arguments: BTreeMap<String, CallbackArg>,
    ) -> Result<Self, RetrievalError> {
        let name = name.into();
        for (key, argument) in &arguments {
            if let CallbackArg::Path(path) = argument {
                if !is_contained_relative(path) {
                    return Err(RetrievalError::InvalidRecipe(format!(
                        "callback `{name}` argument `{key}` must be a relative path inside the dataset directory: {path}"
                    )));
                }
            }
        }
        Ok(Self {
            name,
            function,
            arguments,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resolve_arguments(&self, dataset_dir: &Utf8Path) -> CallbackArguments {
        let values = self
            .arguments
            .iter()
            .map(|(key, argument)| {
                let resolved = match argument {
                    CallbackArg::Path(path) => ResolvedArg::Path(dataset_dir.join(path)),
                    CallbackArg::Value(value) => ResolvedArg::Value(value.clone()),
                };
                (key.clone(), resolved)
            })
            .collect();
        CallbackArguments {
            callback: self.name.clone(),
            values,
        }
    }

    pub fn run(&self, dataset_dir: &Utf8Path) -> Result<(), RetrievalError> {
        let arguments = self.resolve_arguments(dataset_dir);
        (self.function)(&arguments)
    }
}

/// Named callbacks that recipe documents may reference.
#[derive(Clone, Default)]
pub struct CallbackRegistry {
    callbacks: HashMap<String, CallbackFn>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("regex_replace", regex_replace);
        registry.register("drop_lines_matching", drop_lines_matching);
        registry
    }

    pub fn register<F>(&mut self, name: impl Into<String>, function: F)
    where
        F: Fn(&CallbackArguments) -> Result<(), RetrievalError> + Send + Sync + 'static,
    {
        self.callbacks.insert(name.into(), Arc::new(function));
    }

    pub fn get(&self, name: &str) -> Option<CallbackFn> {
        self.callbacks.get(name).cloned()
    }

    pub fn instantiate(
        &self,
        document: &CallbackDocument,
    ) -> Result<CallbackInvocation, RetrievalError> {
        let function = self
            .get(&document.name)
            .ok_or_else(|| RetrievalError::UnknownCallback(document.name.clone()))?;
        CallbackInvocation::new(document.name.clone(), function, document.arguments.clone())
    }
}

/// Rewrites `path` (or writes to `output`) replacing every match of `pattern`
/// on each line with `replacement`. In-place rewrites must be idempotent since
/// callbacks run on every resolution.
pub fn regex_replace(arguments: &CallbackArguments) -> Result<(), RetrievalError> {
    let input = arguments.path("path")?;
    let output = arguments.optional_path("output")?.unwrap_or(input);
    let pattern = compile(arguments, arguments.str("pattern")?)?;
    let replacement = arguments.str("replacement")?;
    rewrite_lines(arguments, input, output, |line| {
        Some(pattern.replace_all(line, replacement).into_owned())
    })
}

pub fn drop_lines_matching(arguments: &CallbackArguments) -> Result<(), RetrievalError> {
    let input = arguments.path("path")?;
    let output = arguments.optional_path("output")?.unwrap_or(input);
    let pattern = compile(arguments, arguments.str("pattern")?)?;
    rewrite_lines(arguments, input, output, |line| {
        (!pattern.is_match(line)).then(|| line.to_string())
    })
}

fn compile(arguments: &CallbackArguments, pattern: &str) -> Result<Regex, RetrievalError> {
    Regex::new(pattern).map_err(|err| arguments.error(format!("invalid pattern: {err}")))
}

fn rewrite_lines<F>(
    arguments: &CallbackArguments,
    input: &Utf8Path,
    output: &Utf8Path,
    mut transform: F,
) -> Result<(), RetrievalError>
where
    F: FnMut(&str) -> Option<String>,
{
    let source = File::open(input.as_std_path())
        .map_err(|err| arguments.error(format!("open {input}: {err}")))?;
    let parent = output
        .parent()
        .ok_or_else(|| arguments.error(format!("invalid output path {output}")))?;
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| RetrievalError::Filesystem(err.to_string()))?;
    let temp = tempfile::Builder::new()
        .prefix(".callback")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| RetrievalError::Filesystem(err.to_string()))?;
    {
        let mut writer = BufWriter::new(temp.as_file());
        for line in BufReader::new(source).lines() {
            let line = line.map_err(|err| arguments.error(format!("read {input}: {err}")))?;
            if let Some(rewritten) = transform(&line) {
                writeln!(writer, "{rewritten}")
                    .map_err(|err| RetrievalError::Filesystem(err.to_string()))?;
            }
        }
        writer
            .flush()
            .map_err(|err| RetrievalError::Filesystem(err.to_string()))?;
    }
    temp.persist(output.as_std_path())
        .map_err(|err| RetrievalError::Filesystem(err.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    #[test]
    fn unknown_callback_is_rejected() {
        let registry = CallbackRegistry::with_builtins();
        let document = CallbackDocument {
            name: "does_not_exist".to_string(),
            arguments: BTreeMap::new(),
        };
        let err = registry.instantiate(&document).unwrap_err();
        assert_matches!(err, RetrievalError::UnknownCallback(_));
    }

    #[test]
    fn path_arguments_are_resolved_against_dataset_dir() {
        let registry = CallbackRegistry::with_builtins();
        let mut arguments = BTreeMap::new();
        arguments.insert(
            "path".to_string(),
            CallbackArg::Path(Utf8PathBuf::from("raw/edges.tsv")),
        );
        arguments.insert(
            "edge_path".to_string(),
            CallbackArg::Value(json!("kept/as/value")),
        );
        let invocation = registry
            .instantiate(&CallbackDocument {
                name: "regex_replace".to_string(),
                arguments,
            })
            .unwrap();

        let resolved = invocation.resolve_arguments(Utf8Path::new("/cache/linqs/Cora/latest"));
        assert_eq!(
            resolved.path("path").unwrap(),
            Utf8Path::new("/cache/linqs/Cora/latest/raw/edges.tsv")
        );
        assert_eq!(resolved.str("edge_path").unwrap(), "kept/as/value");
    }

    #[test]
    fn escaping_path_argument_is_rejected() {
        let registry = CallbackRegistry::with_builtins();
        let mut arguments = BTreeMap::new();
        arguments.insert(
            "path".to_string(),
            CallbackArg::Path(Utf8PathBuf::from("../other/edges.tsv")),
        );
        let err = registry
            .instantiate(&CallbackDocument {
                name: "regex_replace".to_string(),
                arguments,
            })
            .unwrap_err();
        assert_matches!(err, RetrievalError::InvalidRecipe(_));
    }
}
