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

// heavily inspired by [serde_json]'s `json!` macro
// [serde_json]: https://github.com/serde-rs/json

#[cfg(doc)]
use crate::value::Value;

macro_rules! hash_map {
    () => {std::collections::HashMap::new()};
    ( $($key:expr => $value:expr),* $(,)? ) => {
        {
            let mut m =
                std::collections::HashMap::with_capacity(hash_map!(_capacity($($value),*)));
            $(
                m.insert($key, $value);
            )*
            m
        }
    };
    ( _capacity() ) => (0usize);
    ( _capacity($x:tt) ) => (1usize);
    ( _capacity($x:tt, $($xs:tt),*) ) => (1usize + hash_map!(_capacity($($xs),*)));
}

pub(crate) use hash_map;

/// Short notation for creating a [`Value`].
///
/// # Examples
///
/// Special values:
/// ```
/// use graphium::{value, Value};
///
/// assert_eq!(Value::Null, value!(null));
/// assert_eq!(Value::Boolean(true), value!(true));
/// ```
///
/// Any value that implements `Into<Value>`:
/// ```
/// use graphium::{value, Value};
///
/// assert_eq!(Value::Integer(1), value!(1));
/// assert_eq!(Value::Float(1.234), value!(1.234));
/// assert_eq!(Value::String(String::from("foo")), value!("foo"));
/// ```
///
/// Create a [`Value::List`]:
/// ```
/// use graphium::{value, Value};
///
/// assert_eq!(
///     Value::List(vec![Value::Integer(1), Value::Float(2.), Value::Null]),
///     value!([1, 2., null])
/// );
/// ```
///
/// Create a [`Value::Map`]:
/// ```
/// use std::collections::HashMap;
///
/// use graphium::{value, Value};
///
/// let mut map = HashMap::new();
/// map.insert(String::from("foo"), Value::Integer(1));
/// map.insert(String::from("bar"), Value::Null);
///
/// assert_eq!(Value::Map(map), value!({"foo": 1, "bar": null}));
/// ```
#[macro_export]
macro_rules! value {
    (null) => {
        $crate::value::Value::Null
    };
    (- $other:tt) => {
        $crate::value::Value::from(-$other)
    };
    ([ $($element:tt),* $(,)? ]) => {
        $crate::value::Value::List(vec![ $($crate::value!($element)),* ])
    };
    ({ $($key:literal : $val:tt),* $(,)? }) => {
        $crate::value::Value::Map($crate::value_map!({ $($key: $val),* }))
    };
    ($other:expr) => {
        $crate::value::Value::from($other)
    };
}

/// Short notation for creating a map of [`Value`]s as used for statement
/// parameters and transaction metadata.
///
/// # Example
/// ```
/// use std::collections::HashMap;
///
/// use graphium::{value_map, Value};
///
/// let mut map = HashMap::new();
/// map.insert(String::from("x"), Value::Integer(123));
/// map.insert(String::from("y"), Value::List(vec![Value::Boolean(false)]));
///
/// assert_eq!(map, value_map!({"x": 123, "y": [false]}));
/// ```
#[macro_export]
macro_rules! value_map {
    (@inner $m:ident;) => {};
    (@inner $m:ident; $key:literal : - $val:tt $(, $($rest:tt)*)?) => {
        $m.insert(::std::string::String::from($key), $crate::value!(-$val));
        $crate::value_map!(@inner $m; $($($rest)*)?);
    };
    (@inner $m:ident; $key:literal : $val:tt $(, $($rest:tt)*)?) => {
        $m.insert(::std::string::String::from($key), $crate::value!($val));
        $crate::value_map!(@inner $m; $($($rest)*)?);
    };
    ({ $($t:tt)* }) => {
        {
            #[allow(unused_mut)]
            let mut m = ::std::collections::HashMap::new();
            $crate::value_map!(@inner m; $($t)*);
            m
        }
    };
}
