use std::fmt;

#[cfg(feature = "serde")]
use serde::{de, ser};

use crate::dictionary::Dictionary;

/// The declared width of an integer node, independent of the magnitude of
/// the value it carries. The binary dialect must round-trip this width
/// exactly: a value written as an `I16` always reads back as an `I16`,
/// even if its magnitude would fit in an `I8`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Width {
    I8,
    I16,
    I32,
    I64,
}

impl Width {
    /// The narrowest width that can hold `value` without truncation.
    pub fn smallest_for(value: i64) -> Width {
        if value >= i8::MIN as i64 && value <= i8::MAX as i64 {
            Width::I8
        } else if value >= i16::MIN as i64 && value <= i16::MAX as i64 {
            Width::I16
        } else if value >= i32::MIN as i64 && value <= i32::MAX as i64 {
            Width::I32
        } else {
            Width::I64
        }
    }

    pub fn byte_len(self) -> usize {
        match self {
            Width::I8 => 1,
            Width::I16 => 2,
            Width::I32 => 4,
            Width::I64 => 8,
        }
    }
}

/// A width-hinted integer. Two `Integer`s with equal `value()` but
/// different `width()` are unequal, and the binary dialect preserves that
/// distinction across a write/read round trip.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Integer {
    value: i64,
    width: Width,
}

impl Integer {
    /// Constructs an `Integer` with the narrowest width that fits `value`.
    pub fn new(value: i64) -> Integer {
        Integer {
            value,
            width: Width::smallest_for(value),
        }
    }

    /// Constructs an `Integer` with an explicit width. `width` must be
    /// large enough to hold `value`; callers that read a width off the
    /// wire and a value that doesn't fit it have already hit a protocol
    /// violation before reaching this constructor.
    pub fn with_width(value: i64, width: Width) -> Integer {
        debug_assert!(Width::smallest_for(value) <= width);
        Integer { value, width }
    }

    pub fn value(self) -> i64 {
        self.value
    }

    pub fn width(self) -> Width {
        self.width
    }
}

macro_rules! integer_from {
    ($($ty:ty => $width:expr),* $(,)?) => {
        $(
            impl From<$ty> for Integer {
                fn from(value: $ty) -> Integer {
                    Integer::with_width(value as i64, $width)
                }
            }
        )*
    };
}

integer_from! {
    i8 => Width::I8,
    i16 => Width::I16,
    i32 => Width::I32,
    i64 => Width::I64,
}

impl fmt::Display for Integer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.value, f)
    }
}

/// How a `Timestamp`'s integer payload is to be interpreted, matching the
/// `LongConversion`/`NanoTime` style annotations a method parameter can
/// carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimeConversion {
    Seconds,
    Millis,
    Micros,
    Nanos,
}

/// A point in time, stored as an integer count since the Unix epoch plus
/// the unit that integer is denominated in. Kept distinct from a plain
/// `Int` node so dialects can render it with the conversion-specific
/// textual form (e.g. an ISO-8601 string in the text dialect).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Timestamp {
    pub since_epoch: i64,
    pub conversion: TimeConversion,
}

impl Timestamp {
    pub fn new(since_epoch: i64, conversion: TimeConversion) -> Timestamp {
        Timestamp {
            since_epoch,
            conversion,
        }
    }
}

/// A node in the value tree every dialect reads and writes.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(Integer),
    Float32(f32),
    Float64(f64),
    Text(String),
    /// Pre-encoded text emitted verbatim, never quoted or escaped by a
    /// dialect writer. Used for values a caller has already rendered in
    /// the dialect's own syntax.
    RawText(String),
    Blob(Vec<u8>),
    Timestamp(Timestamp),
    Mapping(Dictionary),
    Sequence(Vec<Value>),
    /// A mapping tagged with a type alias, read back into the aliased
    /// type's factory rather than a plain `Mapping`.
    Typed(String, Box<Dictionary>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<Integer> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) | Value::RawText(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&Dictionary> {
        match self {
            Value::Mapping(m) => Some(m),
            Value::Typed(_, m) => Some(m),
            _ => None,
        }
    }

    pub fn as_mapping_mut(&mut self) -> Option<&mut Dictionary> {
        match self {
            Value::Mapping(m) => Some(m),
            Value::Typed(_, m) => Some(m),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            Value::Sequence(s) => Some(s),
            _ => None,
        }
    }

    /// The type alias this value is tagged with, if any.
    pub fn type_alias(&self) -> Option<&str> {
        match self {
            Value::Typed(name, _) => Some(name),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Value {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Value {
        Value::Int(Integer::new(i))
    }
}

impl From<Integer> for Value {
    fn from(i: Integer) -> Value {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Value {
        Value::Float64(f)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Value {
        Value::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Value {
        Value::Text(s.to_owned())
    }
}

impl From<Dictionary> for Value {
    fn from(d: Dictionary) -> Value {
        Value::Mapping(d)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Value {
        Value::Sequence(v)
    }
}

/// Structural `serde` support for [`Value`], so a `Dictionary` (and thus
/// any `Value::Mapping`/`Value::Typed`) can serialize through an
/// arbitrary serde format, and so [`crate::serde::to_value`]/
/// [`crate::serde::from_value`] have something to bridge arbitrary
/// `Serialize`/`Deserialize` types through.
///
/// This is necessarily lossy relative to the dialects in `crate::wire`:
/// a generic serde format has no way to express an integer's declared
/// width, a timestamp's conversion unit, raw-text, or a typed-object tag
/// distinct from an ordinary mapping with an `@type` entry. Dialect
/// round-trips go through `Wire::write_value`/`read_value` instead, which
/// preserve all of that; this impl exists for interop with the rest of
/// the serde ecosystem, not as a second wire format.
#[cfg(feature = "serde")]
impl ser::Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: ser::Serializer,
    {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(i.value()),
            Value::Float32(f) => serializer.serialize_f32(*f),
            Value::Float64(f) => serializer.serialize_f64(*f),
            Value::Text(s) | Value::RawText(s) => serializer.serialize_str(s),
            Value::Blob(b) => serializer.serialize_bytes(b),
            Value::Timestamp(ts) => serializer.serialize_i64(ts.since_epoch),
            Value::Sequence(items) => {
                use ser::SerializeSeq;
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Mapping(dict) => serialize_dict(serializer, dict, None),
            Value::Typed(alias, dict) => serialize_dict(serializer, dict, Some(alias)),
        }
    }
}

#[cfg(feature = "serde")]
fn serialize_dict<S>(
    serializer: S,
    dict: &Dictionary,
    typed: Option<&str>,
) -> std::result::Result<S::Ok, S::Error>
where
    S: ser::Serializer,
{
    use ser::SerializeMap;
    let mut map = serializer.serialize_map(Some(dict.len() + typed.is_some() as usize))?;
    if let Some(alias) = typed {
        map.serialize_entry("@type", alias)?;
    }
    for (k, v) in dict {
        map.serialize_entry(&k.to_string(), v)?;
    }
    map.end()
}

#[cfg(feature = "serde")]
impl<'de> de::Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        struct ValueVisitor;

        impl<'de> de::Visitor<'de> for ValueVisitor {
            type Value = Value;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a value representable in the eventwire value tree")
            }

            fn visit_unit<E>(self) -> std::result::Result<Value, E> {
                Ok(Value::Null)
            }

            fn visit_none<E>(self) -> std::result::Result<Value, E> {
                Ok(Value::Null)
            }

            fn visit_some<D2>(self, deserializer: D2) -> std::result::Result<Value, D2::Error>
            where
                D2: de::Deserializer<'de>,
            {
                de::Deserialize::deserialize(deserializer)
            }

            fn visit_bool<E>(self, v: bool) -> std::result::Result<Value, E> {
                Ok(Value::Bool(v))
            }

            fn visit_i64<E>(self, v: i64) -> std::result::Result<Value, E> {
                Ok(Value::from(v))
            }

            fn visit_u64<E>(self, v: u64) -> std::result::Result<Value, E> {
                if v <= i64::MAX as u64 {
                    Ok(Value::from(v as i64))
                } else {
                    Ok(Value::Float64(v as f64))
                }
            }

            fn visit_f64<E>(self, v: f64) -> std::result::Result<Value, E> {
                Ok(Value::Float64(v))
            }

            fn visit_str<E>(self, v: &str) -> std::result::Result<Value, E> {
                Ok(Value::Text(v.to_owned()))
            }

            fn visit_string<E>(self, v: String) -> std::result::Result<Value, E> {
                Ok(Value::Text(v))
            }

            fn visit_bytes<E>(self, v: &[u8]) -> std::result::Result<Value, E> {
                Ok(Value::Blob(v.to_owned()))
            }

            fn visit_byte_buf<E>(self, v: Vec<u8>) -> std::result::Result<Value, E> {
                Ok(Value::Blob(v))
            }

            fn visit_seq<A>(self, mut seq: A) -> std::result::Result<Value, A::Error>
            where
                A: de::SeqAccess<'de>,
            {
                let mut items = Vec::new();
                while let Some(item) = seq.next_element()? {
                    items.push(item);
                }
                Ok(Value::Sequence(items))
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<Value, A::Error>
            where
                A: de::MapAccess<'de>,
            {
                let mut dict = Dictionary::new();
                while let Some((k, v)) = map.next_entry::<String, Value>()? {
                    dict.insert(k, v);
                }
                Ok(Value::Mapping(dict))
            }
        }

        deserializer.deserialize_any(ValueVisitor)
    }
}

#[cfg(all(test, feature = "serde"))]
mod serde_tests {
    use super::*;

    #[test]
    fn value_round_trips_through_serde_json() {
        let mut dict = Dictionary::new();
        dict.insert("a", Value::from(1i64));
        dict.insert("b", Value::Text("x".into()));
        let value = Value::Mapping(dict);

        let json = serde_json::to_string(&value).unwrap();
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, value);
    }
}
