// Copyright Rouven Bauer
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

pub(crate) mod spatial;
pub(crate) mod time;

use std::collections::HashMap;

use thiserror::Error;

pub use spatial::{Point2D, Point3D};
pub use time::{Duration, DurationOutOfRangeError};

/// A dynamically typed value as sent to and received from the database.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(HashMap<String, Value>),
    Duration(Duration),
    Point2D(Point2D),
    Point3D(Point3D),
}

/// Used when a value could not be converted to the requested type using
/// one of the `try_into_*` methods.
#[derive(Debug, Error)]
#[error("{reason}")]
pub struct ValueConversionError {
    reason: &'static str,
}

impl From<&'static str> for ValueConversionError {
    fn from(reason: &'static str) -> Self {
        Self { reason }
    }
}

macro_rules! impl_value_from_into {
    ( $value:expr, $($ty:ty),* ) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    $value(value.into())
                }
            }
        )*
    };
}

macro_rules! impl_value_from_owned {
    ( $value:expr, $($ty:ty),* ) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    $value(value)
                }
            }
        )*
    };
}

impl_value_from_into!(Value::Boolean, bool);
impl_value_from_into!(Value::Integer, u8, u16, u32, i8, i16, i32, i64);
impl_value_from_into!(Value::Float, f32, f64);
impl_value_from_into!(Value::String, &str);

impl_value_from_owned!(Value::String, String);
impl_value_from_owned!(Value::Duration, Duration);
impl_value_from_owned!(Value::Point2D, Point2D);
impl_value_from_owned!(Value::Point3D, Point3D);

impl<T: Into<Value>> From<HashMap<String, T>> for Value {
    fn from(value: HashMap<String, T>) -> Self {
        Value::Map(value.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Value::List(value.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        match value {
            None => Value::Null,
            Some(value) => value.into(),
        }
    }
}

macro_rules! impl_value_accessors {
    ( $( ($is_name:ident, $as_name:ident, $try_name:ident, $variant:path, $ty:ty, $reason:literal) ),* $(,)? ) => {
        $(
            #[inline]
            pub fn $is_name(&self) -> bool {
                matches!(self, $variant(_))
            }

            #[inline]
            pub fn $as_name(&self) -> Option<&$ty> {
                match self {
                    $variant(value) => Some(value),
                    _ => None,
                }
            }

            pub fn $try_name(self) -> Result<$ty, ValueConversionError> {
                match self {
                    $variant(value) => Ok(value),
                    _ => Err($reason.into()),
                }
            }
        )*
    };
}

impl Value {
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    impl_value_accessors!(
        (is_bool, as_bool, try_into_bool, Value::Boolean, bool, "value was not a boolean"),
        (is_int, as_int, try_into_int, Value::Integer, i64, "value was not an integer"),
        (is_float, as_float, try_into_float, Value::Float, f64, "value was not a float"),
        (is_string, as_string, try_into_string, Value::String, String, "value was not a string"),
        (is_list, as_list, try_into_list, Value::List, Vec<Value>, "value was not a list"),
        (
            is_map,
            as_map,
            try_into_map,
            Value::Map,
            HashMap<String, Value>,
            "value was not a map"
        ),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::*;

    #[rstest]
    fn conversions_round_trip() {
        assert_eq!(Value::from(true), Value::Boolean(true));
        assert_eq!(Value::from(42u8), Value::Integer(42));
        assert_eq!(Value::from(-1i64), Value::Integer(-1));
        assert_eq!(Value::from(0.5f64), Value::Float(0.5));
        assert_eq!(Value::from("x"), Value::String(String::from("x")));
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(
            Value::from(vec![1i64, 2]),
            Value::List(vec![Value::Integer(1), Value::Integer(2)])
        );
    }

    #[rstest]
    fn fallible_extraction() {
        assert_eq!(Value::Integer(7).try_into_int().unwrap(), 7);
        assert!(Value::Null.try_into_int().is_err());
        assert_eq!(Value::from("s").as_string().unwrap(), "s");
        assert!(Value::Integer(7).as_string().is_none());
        assert!(Value::Null.is_null());
    }
}
