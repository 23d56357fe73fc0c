//! Statement parameter binding.
//!
//! # Responsibility
//! - Turn caller-supplied values into the parameter set of a raw statement.
//! - Support ordered (positional) and structured (named) input shapes.
//!
//! # Invariants
//! - Binding always starts from an empty parameter set.
//! - Positional parameters are named `@{index}` with zero-based indices.
//! - Absent values are bound as `SqlValue::Null`, never dropped.
//! - The binder does not inspect SQL text; matching placeholders is the
//!   caller's job.

mod record;

pub use record::{BindError, ParameterRecord};

use crate::context::{Command, SqlValue, StatementParameter};
use log::trace;

/// A value on its way into a statement; `None` becomes the engine null.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterValue(Option<SqlValue>);

impl ParameterValue {
    pub fn null() -> Self {
        Self(None)
    }

    pub fn is_null(&self) -> bool {
        matches!(self.0, None | Some(SqlValue::Null))
    }

    /// Resolves the value to what the driver receives.
    pub fn into_sql(self) -> SqlValue {
        self.0.unwrap_or(SqlValue::Null)
    }
}

macro_rules! parameter_value_from {
    ($($source:ty => |$value:ident| $convert:expr),+ $(,)?) => {
        $(
            impl From<$source> for ParameterValue {
                fn from($value: $source) -> Self {
                    Self(Some($convert))
                }
            }
        )+
    };
}

parameter_value_from! {
    SqlValue => |value| value,
    i64 => |value| SqlValue::Integer(value),
    i32 => |value| SqlValue::Integer(i64::from(value)),
    u32 => |value| SqlValue::Integer(i64::from(value)),
    bool => |value| SqlValue::Integer(i64::from(value)),
    f64 => |value| SqlValue::Real(value),
    String => |value| SqlValue::Text(value),
    &str => |value| SqlValue::Text(value.to_string()),
    Vec<u8> => |value| SqlValue::Blob(value),
}

impl<T: Into<ParameterValue>> From<Option<T>> for ParameterValue {
    fn from(value: Option<T>) -> Self {
        value.map_or_else(Self::null, Into::into)
    }
}

/// Input shapes accepted by the binder.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Parameters {
    /// No parameters at all.
    #[default]
    None,
    /// Ordered values bound as `@0`, `@1`, ...
    Positional(Vec<ParameterValue>),
    /// Named members in declaration order.
    Named(Vec<(String, ParameterValue)>),
}

impl Parameters {
    pub fn positional<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<ParameterValue>,
    {
        Self::Positional(values.into_iter().map(Into::into).collect())
    }

    pub fn named<I, K, V>(members: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<ParameterValue>,
    {
        Self::Named(
            members
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        )
    }

    /// Number of parameters this input will produce.
    pub fn len(&self) -> usize {
        match self {
            Self::None => 0,
            Self::Positional(values) => values.len(),
            Self::Named(members) => members.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Option<Parameters>> for Parameters {
    fn from(value: Option<Parameters>) -> Self {
        value.unwrap_or_default()
    }
}

/// Replaces the parameters of `command` with the ones derived from
/// `parameters` and returns how many were attached.
pub fn bind_parameters(command: &mut Command, parameters: Parameters) -> usize {
    let set = command.parameters_mut();
    set.clear();

    match parameters {
        Parameters::None => {}
        Parameters::Positional(values) => {
            for (index, value) in values.into_iter().enumerate() {
                set.push(StatementParameter::positional(index, value.into_sql()));
            }
        }
        Parameters::Named(members) => {
            for (name, value) in members {
                set.push(StatementParameter::named(name, value.into_sql()));
            }
        }
    }

    trace!(
        "event=params_bind module=params status=ok count={}",
        set.len()
    );
    set.len()
}
