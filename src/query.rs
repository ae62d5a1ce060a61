use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use thiserror::Error;

use crate::value::{self, ParseError, Value, ValueType};

/// Raw query string values keyed by parameter name
pub type QueryValues = HashMap<String, Vec<String>>;

/// Split a raw query string into its name → values map
pub fn parse_query_string(raw: Option<&str>) -> QueryValues {
    let mut values = QueryValues::new();
    if let Some(raw) = raw {
        for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
            values
                .entry(key.into_owned())
                .or_default()
                .push(value.into_owned());
        }
    }
    values
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("cannot parse query parameter \"{0}\" from an empty query map")]
    EmptyQuery(String),

    #[error("query parameter \"{0}\" is required")]
    Missing(String),

    #[error("query parameter \"{0}\" has multiple values, arrays are not implemented")]
    NotImplemented(String),

    #[error("query parameter \"{name}\": {source}")]
    Invalid {
        name: String,
        #[source]
        source: ParseError,
    },
}

/// Declaration of one expected query parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryPair {
    pub value_type: ValueType,
    pub required: bool,
}

/// The query parameters a route expects, declared once at registration
#[derive(Debug, Clone, Default)]
pub struct QueryPairs {
    pairs: BTreeMap<String, QueryPair>,
}

impl QueryPairs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, value_type: ValueType, required: bool) {
        self.pairs.insert(
            name.into(),
            QueryPair {
                value_type,
                required,
            },
        );
    }

    pub fn with(mut self, name: impl Into<String>, value_type: ValueType, required: bool) -> Self {
        self.register(name, value_type, required);
        self
    }

    pub fn get(&self, name: &str) -> Option<&QueryPair> {
        self.pairs.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Names of the required pairs, in name order
    pub fn required(&self) -> impl Iterator<Item = &str> {
        self.pairs
            .iter()
            .filter(|(_, pair)| pair.required)
            .map(|(name, _)| name.as_str())
    }

    /// Parse the declared parameter `name` out of `values`.
    ///
    /// Panics when `name` was never declared: that is a route misconfiguration,
    /// not something a request can trigger.
    pub fn parse(&self, name: &str, values: &QueryValues) -> Result<Value, QueryError> {
        let pair = self
            .pairs
            .get(name)
            .unwrap_or_else(|| panic!("query parameter \"{}\" is not declared on this route", name));

        if values.is_empty() {
            return Err(QueryError::EmptyQuery(name.to_string()));
        }

        let raw = match values.get(name).map(Vec::as_slice) {
            None | Some([]) => return Err(QueryError::Missing(name.to_string())),
            Some([raw]) => raw,
            Some(_) => return Err(QueryError::NotImplemented(name.to_string())),
        };

        if raw.is_empty() && !pair.required {
            return Ok(pair.value_type.zero());
        }

        value::parse(raw, pair.value_type).map_err(|source| QueryError::Invalid {
            name: name.to_string(),
            source,
        })
    }
}

/// Per-request query state: the route's declarations, the raw values and
/// whatever has been resolved so far
#[derive(Debug, Clone)]
pub struct Query {
    pairs: Arc<QueryPairs>,
    values: QueryValues,
    resolved: HashMap<String, Result<Value, QueryError>>,
}

impl Query {
    pub fn new(pairs: Arc<QueryPairs>, values: QueryValues) -> Self {
        Self {
            pairs,
            values,
            resolved: HashMap::new(),
        }
    }

    /// Resolve `name`, storing the outcome for later lookups
    pub fn parse(&mut self, name: &str) -> Result<&Value, QueryError> {
        if !self.resolved.contains_key(name) {
            let outcome = self.pairs.parse(name, &self.values);
            self.resolved.insert(name.to_string(), outcome);
        }

        match &self.resolved[name] {
            Ok(value) => Ok(value),
            Err(err) => Err(err.clone()),
        }
    }

    /// Parse every required pair, stopping at the first failure
    pub fn parse_required(&mut self) -> Result<(), QueryError> {
        let pairs = Arc::clone(&self.pairs);
        for name in pairs.required() {
            self.parse(name)?;
        }
        Ok(())
    }

    pub fn values(&self) -> &QueryValues {
        &self.values
    }
}
