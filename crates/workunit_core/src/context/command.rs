use super::SqlValue;
use crate::params::{bind_parameters, Parameters};

/// One parameter attached to a statement.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementParameter {
    name: String,
    value: SqlValue,
    ordinal: Option<usize>,
}

impl StatementParameter {
    /// Creates a named parameter bound by name only.
    pub fn named(name: impl Into<String>, value: SqlValue) -> Self {
        Self {
            name: name.into(),
            value,
            ordinal: None,
        }
    }

    /// Creates a positional parameter named `@{ordinal}`.
    pub fn positional(ordinal: usize, value: SqlValue) -> Self {
        Self {
            name: format!("@{ordinal}"),
            value,
            ordinal: Some(ordinal),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &SqlValue {
        &self.value
    }

    /// Zero-based position for parameters produced from an ordered sequence.
    pub fn ordinal(&self) -> Option<usize> {
        self.ordinal
    }
}

/// Ordered parameter collection of one statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSet {
    items: Vec<StatementParameter>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, parameter: StatementParameter) {
        self.items.push(parameter);
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, StatementParameter> {
        self.items.iter()
    }

    /// Returns the first parameter with exactly this name.
    pub fn get(&self, name: &str) -> Option<&StatementParameter> {
        self.items.iter().find(|parameter| parameter.name == name)
    }
}

impl<'a> IntoIterator for &'a ParameterSet {
    type Item = &'a StatementParameter;
    type IntoIter = std::slice::Iter<'a, StatementParameter>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// A text statement plus its bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    sql: String,
    parameters: ParameterSet,
}

impl Command {
    /// Creates a text command with no parameters.
    pub fn text(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            parameters: ParameterSet::new(),
        }
    }

    /// Creates a text command and binds `parameters` onto it.
    pub fn with_parameters(sql: impl Into<String>, parameters: Parameters) -> Self {
        let mut command = Self::text(sql);
        bind_parameters(&mut command, parameters);
        command
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }

    pub fn parameters_mut(&mut self) -> &mut ParameterSet {
        &mut self.parameters
    }
}
