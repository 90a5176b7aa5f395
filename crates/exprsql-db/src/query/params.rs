//! The parameter sink.
//!
//! [`Parameters`] is an ordered, append-only list of placeholder entries.
//! Entries are appended while SQL text is emitted, so the ordinal of each
//! entry always matches the position of its placeholder in the text.

use std::fmt;

use exprsql_core::{SqlError, SqlResult};

use crate::value::{NativeType, Value};

/// One bound parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    /// The placeholder token including its prefix, e.g. `@p0` or `@kId1`.
    pub name: String,
    /// The value to bind.
    pub value: Value,
    /// The declared database type.
    pub native_type: NativeType,
    /// Zero-based emission position.
    pub ordinal: usize,
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={} ({:?})", self.name, self.value, self.native_type)
    }
}

/// An ordered parameter sink.
///
/// Anonymous entries are named `{prefix}{stem}{n}` with a counter that never
/// repeats within one sink. Named entries (`@Gender`, `@Price0`) are
/// de-duplicated: adding a name that already exists returns the existing
/// token without appending.
///
/// Inside a batch the sink knows the position of the statement being
/// written. A named entry that a previous statement bound to a different
/// value is then renamed to `{name}_{position}`; outside a batch the
/// conflict is an error.
///
/// # Examples
///
/// ```
/// use exprsql_db::query::params::Parameters;
/// use exprsql_db::value::{NativeType, Value};
///
/// let mut params = Parameters::new('@', "p");
/// assert_eq!(params.add_anonymous(Value::Int(1), NativeType::Int32), "@p0");
/// assert_eq!(params.add_named("Gender", Value::Int(1), NativeType::Byte), "@Gender");
/// assert_eq!(params.add_named("Gender", Value::Int(1), NativeType::Byte), "@Gender");
/// assert_eq!(params.len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Parameters {
    prefix: char,
    stem: String,
    next_anonymous: usize,
    entries: Vec<Parameter>,
    /// Entries of the enclosing sink, consulted for name conflicts only.
    outer: Vec<Parameter>,
    statement: Option<usize>,
}

impl Default for Parameters {
    fn default() -> Self {
        Self::new('@', "p")
    }
}

impl Parameters {
    /// Creates an empty sink with the given prefix and anonymous name stem.
    pub fn new(prefix: char, stem: impl Into<String>) -> Self {
        Self {
            prefix,
            stem: stem.into(),
            next_anonymous: 0,
            entries: Vec::new(),
            outer: Vec::new(),
            statement: None,
        }
    }

    /// Creates an empty sink that shares this sink's naming scheme and batch
    /// position, continues its anonymous counter, and sees this sink's
    /// entries when resolving name conflicts.
    pub fn child(&self) -> Self {
        let mut outer = self.outer.clone();
        outer.extend(self.entries.iter().cloned());
        Self {
            prefix: self.prefix,
            stem: self.stem.clone(),
            next_anonymous: self.next_anonymous,
            entries: Vec::new(),
            outer,
            statement: self.statement,
        }
    }

    /// Marks the start of the statement at `position` within a batch.
    pub fn begin_statement(&mut self, position: usize) {
        self.statement = Some(position);
    }

    /// Appends every entry of `child` not already present by name and adopts
    /// its anonymous counter.
    pub fn merge(&mut self, child: &Self) {
        for entry in &child.entries {
            if !self.contains(&entry.name) {
                self.push(entry.name.clone(), entry.value.clone(), entry.native_type);
            }
        }
        self.next_anonymous = self.next_anonymous.max(child.next_anonymous);
    }

    /// Appends an anonymous entry and returns its placeholder token.
    pub fn add_anonymous(&mut self, value: Value, native_type: NativeType) -> String {
        let name = format!("{}{}{}", self.prefix, self.stem, self.next_anonymous);
        self.next_anonymous += 1;
        self.push(name.clone(), value, native_type);
        name
    }

    /// Appends a named entry unless one with the same name exists, and
    /// returns its placeholder token.
    pub fn add_named(&mut self, name: &str, value: Value, native_type: NativeType) -> String {
        let token = format!("{}{name}", self.prefix);
        if !self.contains(&token) {
            self.push(token.clone(), value, native_type);
        }
        token
    }

    /// Binds a named entry and returns its placeholder token.
    ///
    /// An existing entry with an equal value is shared. A conflicting one is
    /// renamed to `{name}_{position}` inside a batch.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError::InvalidExpression`] when the name is already bound
    /// to a different value and no batch rename resolves the conflict.
    pub fn bind_named(
        &mut self,
        name: &str,
        value: Value,
        native_type: NativeType,
    ) -> SqlResult<String> {
        let token = format!("{}{name}", self.prefix);
        match self.lookup(&token).map(|existing| existing.value == value) {
            None => {
                self.push(token.clone(), value, native_type);
                return Ok(token);
            }
            Some(true) => {
                if !self.contains(&token) {
                    self.push(token.clone(), value, native_type);
                }
                return Ok(token);
            }
            Some(false) => {}
        }
        let Some(position) = self.statement else {
            return Err(conflict(&token));
        };
        let renamed = format!("{}{name}_{position}", self.prefix);
        match self.lookup(&renamed).map(|existing| existing.value == value) {
            Some(false) => Err(conflict(&renamed)),
            Some(true) if self.contains(&renamed) => Ok(renamed),
            _ => {
                self.push(renamed.clone(), value, native_type);
                Ok(renamed)
            }
        }
    }

    fn lookup(&self, token: &str) -> Option<&Parameter> {
        self.get(token)
            .or_else(|| self.outer.iter().find(|p| p.name == token))
    }

    fn push(&mut self, name: String, value: Value, native_type: NativeType) {
        let ordinal = self.entries.len();
        self.entries.push(Parameter {
            name,
            value,
            native_type,
            ordinal,
        });
    }

    /// Returns `true` if a placeholder token is already present.
    pub fn contains(&self, token: &str) -> bool {
        self.entries.iter().any(|p| p.name == token)
    }

    /// Returns an entry by placeholder token.
    pub fn get(&self, token: &str) -> Option<&Parameter> {
        self.entries.iter().find(|p| p.name == token)
    }

    /// Iterates over entries in ordinal order.
    pub fn iter(&self) -> std::slice::Iter<'_, Parameter> {
        self.entries.iter()
    }

    /// Returns the placeholder tokens in ordinal order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|p| p.name.as_str()).collect()
    }

    /// Returns the values in ordinal order.
    pub fn values(&self) -> Vec<&Value> {
        self.entries.iter().map(|p| &p.value).collect()
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no entry has been added.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The placeholder prefix.
    pub const fn prefix(&self) -> char {
        self.prefix
    }
}

fn conflict(token: &str) -> SqlError {
    SqlError::InvalidExpression(format!(
        "Placeholder '{token}' is bound to two different values"
    ))
}

impl<'a> IntoIterator for &'a Parameters {
    type Item = &'a Parameter;
    type IntoIter = std::slice::Iter<'a, Parameter>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
