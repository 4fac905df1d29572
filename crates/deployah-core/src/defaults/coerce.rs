//! Conversion of schema default literals into typed field values
//!
//! Scalars are cast permissively (`"8080"` fills a `u16`, `1` fills a
//! `bool`). Composite values go through serde, so they use exactly the field
//! names the manifest is serialized with.

use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

/// A type that can be built from a schema default literal
pub trait Coerce: Sized {
    fn coerce(value: &JsonValue) -> Result<Self, String>;
}

/// Decode a composite value through serde
pub fn decode<T: DeserializeOwned>(value: &JsonValue) -> Result<T, String> {
    serde_json::from_value(value.clone()).map_err(|e| e.to_string())
}

/// Implement [`Coerce`] for serde types (enums, structs)
macro_rules! coerce_with_serde {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::defaults::Coerce for $ty {
                fn coerce(value: &::serde_json::Value) -> ::std::result::Result<Self, String> {
                    $crate::defaults::decode(value)
                }
            }
        )+
    };
}
pub(crate) use coerce_with_serde;

fn kind_of(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}

impl Coerce for String {
    fn coerce(value: &JsonValue) -> Result<Self, String> {
        match value {
            JsonValue::String(s) => Ok(s.clone()),
            JsonValue::Number(n) => Ok(n.to_string()),
            JsonValue::Bool(b) => Ok(b.to_string()),
            other => Err(format!("expected a string, found {}", kind_of(other))),
        }
    }
}

impl Coerce for bool {
    fn coerce(value: &JsonValue) -> Result<Self, String> {
        match value {
            JsonValue::Bool(b) => Ok(*b),
            JsonValue::Number(n) => Ok(n.as_f64().map(|f| f != 0.0).unwrap_or(false)),
            JsonValue::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "t" | "1" => Ok(true),
                "false" | "f" | "0" => Ok(false),
                _ => Err(format!("cannot read '{}' as a boolean", s)),
            },
            other => Err(format!("expected a boolean, found {}", kind_of(other))),
        }
    }
}

/// Read any scalar as an integer, rejecting fractions
fn integer_of(value: &JsonValue) -> Result<i128, String> {
    match value {
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i as i128)
            } else if let Some(u) = n.as_u64() {
                Ok(u as i128)
            } else {
                let f = n.as_f64().unwrap_or(f64::NAN);
                if f.fract() == 0.0 && f.is_finite() {
                    Ok(f as i128)
                } else {
                    Err(format!("{} is not a whole number", n))
                }
            }
        }
        JsonValue::String(s) => {
            let s = s.trim();
            if let Ok(i) = s.parse::<i128>() {
                return Ok(i);
            }
            match s.parse::<f64>() {
                Ok(f) if f.fract() == 0.0 && f.is_finite() => Ok(f as i128),
                _ => Err(format!("cannot read '{}' as an integer", s)),
            }
        }
        JsonValue::Bool(b) => Ok(i128::from(*b)),
        other => Err(format!("expected an integer, found {}", kind_of(other))),
    }
}

macro_rules! coerce_integer {
    ($($ty:ty),+) => {
        $(
            impl Coerce for $ty {
                fn coerce(value: &JsonValue) -> Result<Self, String> {
                    let i = integer_of(value)?;
                    <$ty>::try_from(i).map_err(|_| {
                        format!("{} is out of range for {}", i, stringify!($ty))
                    })
                }
            }
        )+
    };
}

coerce_integer!(u8, u16, u32, u64, usize, i32, i64);

impl Coerce for f64 {
    fn coerce(value: &JsonValue) -> Result<Self, String> {
        match value {
            JsonValue::Number(n) => n
                .as_f64()
                .ok_or_else(|| format!("{} is not representable as a float", n)),
            JsonValue::String(s) => s
                .trim()
                .parse()
                .map_err(|_| format!("cannot read '{}' as a number", s)),
            JsonValue::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            other => Err(format!("expected a number, found {}", kind_of(other))),
        }
    }
}

impl Coerce for f32 {
    fn coerce(value: &JsonValue) -> Result<Self, String> {
        f64::coerce(value).map(|f| f as f32)
    }
}
