use chrono::NaiveDate;
use thiserror::Error;

/// Date format accepted by [`ValueType::Date`]
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Types a raw query string value can be parsed into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    String,
    Int,
    Int64,
    Uint64,
    /// Simple calendar date of the form 2006-01-02
    Date,
}

impl ValueType {
    pub fn name(&self) -> &'static str {
        match self {
            ValueType::String => "String",
            ValueType::Int => "Int",
            ValueType::Int64 => "Int64",
            ValueType::Uint64 => "Uint64",
            ValueType::Date => "Date",
        }
    }

    /// Zero value of the type, used when an optional parameter is sent empty
    pub fn zero(&self) -> Value {
        match self {
            ValueType::String => Value::String(String::new()),
            ValueType::Int => Value::Int(0),
            ValueType::Int64 => Value::Int64(0),
            ValueType::Uint64 => Value::Uint64(0),
            ValueType::Date => Value::Date(NaiveDate::default()),
        }
    }
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("no value found")]
    NoValue,

    #[error("cannot parse the given input \"{input}\" into {target}")]
    Invalid { input: String, target: ValueType },
}

/// A parsed value. Accessors panic when called for a variant that is not stored,
/// check [`Value::value_type`] or use the `try_*` accessors when unsure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    String(String),
    Int(i32),
    Int64(i64),
    Uint64(u64),
    Date(NaiveDate),
}

/// Parse `input` into a value of type `ty`
pub fn parse(input: &str, ty: ValueType) -> Result<Value, ParseError> {
    if input.is_empty() {
        return Err(ParseError::NoValue);
    }

    let invalid = || ParseError::Invalid {
        input: input.to_string(),
        target: ty,
    };

    match ty {
        ValueType::String => Ok(Value::String(input.to_string())),
        ValueType::Int => input.parse().map(Value::Int).map_err(|_| invalid()),
        ValueType::Int64 => input.parse().map(Value::Int64).map_err(|_| invalid()),
        ValueType::Uint64 => input.parse().map(Value::Uint64).map_err(|_| invalid()),
        ValueType::Date if !is_date_shaped(input) => Err(invalid()),
        ValueType::Date => NaiveDate::parse_from_str(input, DATE_FORMAT)
            .map(Value::Date)
            .map_err(|_| invalid()),
    }
}

/// Exactly `YYYY-MM-DD`: chrono alone also takes unpadded fields and a leading sign
fn is_date_shaped(input: &str) -> bool {
    let bytes = input.as_bytes();
    bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        })
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::String(_) => ValueType::String,
            Value::Int(_) => ValueType::Int,
            Value::Int64(_) => ValueType::Int64,
            Value::Uint64(_) => ValueType::Uint64,
            Value::Date(_) => ValueType::Date,
        }
    }

    pub fn as_str(&self) -> &str {
        self.try_str().unwrap_or_else(|| self.mismatch(ValueType::String))
    }

    pub fn as_int(&self) -> i32 {
        self.try_int().unwrap_or_else(|| self.mismatch(ValueType::Int))
    }

    pub fn as_int64(&self) -> i64 {
        self.try_int64().unwrap_or_else(|| self.mismatch(ValueType::Int64))
    }

    pub fn as_uint64(&self) -> u64 {
        self.try_uint64().unwrap_or_else(|| self.mismatch(ValueType::Uint64))
    }

    pub fn as_date(&self) -> NaiveDate {
        self.try_date().unwrap_or_else(|| self.mismatch(ValueType::Date))
    }

    pub fn try_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn try_int(&self) -> Option<i32> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn try_int64(&self) -> Option<i64> {
        match self {
            Value::Int64(n) => Some(*n),
            _ => None,
        }
    }

    pub fn try_uint64(&self) -> Option<u64> {
        match self {
            Value::Uint64(n) => Some(*n),
            _ => None,
        }
    }

    pub fn try_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    fn mismatch(&self, wanted: ValueType) -> ! {
        panic!(
            "value holds {} but was accessed as {}",
            self.value_type(),
            wanted
        )
    }
}
