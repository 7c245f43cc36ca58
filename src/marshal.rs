//! Mapping between user structs and the value tree (§4.4).
//!
//! Rust has no runtime reflection, so the "declared fields" §4.4 asks for
//! are an explicit, once-per-type table instead of a reflective walk —
//! the REDESIGN FLAGS resolution this crate takes: "each marshallable
//! type registers an ordered field list (name, accessor, writer,
//! annotations) once; generic codecs iterate descriptors."
//!
//! A type opts in by implementing [`Marshallable`] and listing its
//! fields via [`Field`]. [`to_value`]/[`populate`] are the generic codecs
//! every dialect and the method-writer build on.

use crate::dictionary::Dictionary;
use crate::error::{Error, Result};
use crate::value::Value;

/// A bijection between a 64-bit integer subdomain and a textual alphabet,
/// the `LongConversion` annotation of §4.4. Implementations must be total
/// over whatever subdomain they accept; a value outside it is a write
/// failure, not a panic.
pub trait LongConversion: Send + Sync {
    fn encode(&self, value: i64) -> Result<String>;
    fn decode(&self, text: &str) -> Result<i64>;
}

/// A `LongConversion` over base-36 (digits + lowercase letters), the
/// textual-alphabet form the spec's example ("a `LongConversion` mapping
/// a long to a textual alphabet") describes most literally. Negative
/// values are outside its subdomain.
#[derive(Debug, Default, Clone, Copy)]
pub struct Base36Conversion;

const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

impl LongConversion for Base36Conversion {
    fn encode(&self, value: i64) -> Result<String> {
        if value < 0 {
            return Err(Error::invalid_marshallable(
                "Base36Conversion cannot encode a negative value",
            ));
        }
        if value == 0 {
            return Ok("0".to_owned());
        }
        let mut digits = Vec::new();
        let mut n = value as u64;
        while n > 0 {
            digits.push(ALPHABET[(n % 36) as usize]);
            n /= 36;
        }
        digits.reverse();
        Ok(String::from_utf8(digits).expect("ALPHABET is ASCII"))
    }

    fn decode(&self, text: &str) -> Result<i64> {
        if text.is_empty() {
            return Err(Error::invalid_marshallable("empty base-36 text"));
        }
        let mut value: i64 = 0;
        for c in text.chars() {
            let digit = c
                .to_ascii_lowercase()
                .to_digit(36)
                .ok_or_else(|| Error::invalid_marshallable(format!("invalid base-36 digit {:?}", c)))?;
            value = value
                .checked_mul(36)
                .and_then(|v| v.checked_add(digit as i64))
                .ok_or_else(|| Error::invalid_marshallable("base-36 text overflows i64"))?;
        }
        Ok(value)
    }
}

/// How a field's raw value is transformed before it reaches the wire, and
/// the dual on the way back (§4.4 "Annotations").
pub enum Annotation {
    /// No transform: the field's `Value` is written/read as-is.
    None,
    /// A 64-bit integer field rendered as text via a declared alphabet in
    /// the text/JSON dialects, and as a raw integer in binary.
    LongConversion(&'static dyn LongConversion),
    /// A 64-bit nanosecond timestamp rendered as ISO-8601 in text/JSON,
    /// and as a raw integer in binary.
    NanoTime,
}

/// One declared field of a [`Marshallable`] type: its wire name, how its
/// raw value is transformed, and how to read/write it on `T` itself.
pub struct Field<T> {
    pub name: &'static str,
    pub annotation: Annotation,
    pub get: fn(&T) -> Value,
    pub set: fn(&mut T, Value) -> Result<()>,
}

/// A user type whose serialized shape is a mapping of declared fields.
///
/// `Default` backs the reset-on-read invariant: a `Marshallable::IS_CONFIGURATION`
/// type is reset to `Self::default()` before each read populates it
/// (§4.4, §8 scenario 3), rather than accumulating state across reads of
/// a reused destination object.
pub trait Marshallable: Default {
    /// The ordered field list this type declares. Declaration order is
    /// the order fields are written in; reads match by name regardless
    /// of order.
    fn fields() -> &'static [Field<Self>]
    where
        Self: Sized;

    /// The type alias this type writes itself under as a `Value::Typed`
    /// tag, or `None` to write a plain `Value::Mapping`.
    fn type_alias() -> Option<&'static str> {
        None
    }

    /// `true` for "configuration" subtypes, which reset to
    /// `Self::default()` before each read populates them (§4.4).
    const IS_CONFIGURATION: bool = false;
}

fn encode_field(annotation: &Annotation, raw: Value, is_binary: bool) -> Result<Value> {
    match annotation {
        Annotation::None => Ok(raw),
        Annotation::LongConversion(conv) => {
            let n = raw
                .as_int()
                .ok_or_else(|| Error::invalid_marshallable("LongConversion field is not an integer"))?
                .value();
            if is_binary {
                Ok(raw)
            } else {
                Ok(Value::Text(conv.encode(n)?))
            }
        }
        Annotation::NanoTime => {
            let n = raw
                .as_int()
                .ok_or_else(|| Error::invalid_marshallable("NanoTime field is not an integer"))?
                .value();
            if is_binary {
                Ok(raw)
            } else {
                Ok(Value::Text(crate::date::format_nanos_iso8601(n)?))
            }
        }
    }
}

fn decode_field(annotation: &Annotation, raw: Value) -> Result<Value> {
    match annotation {
        Annotation::None => Ok(raw),
        Annotation::LongConversion(conv) => match raw {
            Value::Int(i) => Ok(Value::Int(i)),
            Value::Text(s) | Value::RawText(s) => Ok(Value::from(conv.decode(&s)?)),
            other => Err(Error::invalid_marshallable(format!(
                "LongConversion field has unexpected shape {:?}",
                other
            ))),
        },
        Annotation::NanoTime => match raw {
            Value::Int(i) => Ok(Value::Int(i)),
            Value::Text(s) | Value::RawText(s) => {
                Ok(Value::from(crate::date::parse_nanos_iso8601(&s)?))
            }
            other => Err(Error::invalid_marshallable(format!(
                "NanoTime field has unexpected shape {:?}",
                other
            ))),
        },
    }
}

/// Builds the value tree for `value`, applying each declared field's
/// annotation. `is_binary` selects between a `LongConversion`/`NanoTime`
/// field's text form and its raw-integer binary form.
pub fn to_value<T: Marshallable>(value: &T, is_binary: bool) -> Result<Value> {
    let mut dict = Dictionary::new();
    for field in T::fields() {
        let raw = (field.get)(value);
        dict.insert(field.name, encode_field(&field.annotation, raw, is_binary)?);
    }
    Ok(match T::type_alias() {
        Some(alias) => Value::Typed(alias.to_owned(), Box::new(dict)),
        None => Value::Mapping(dict),
    })
}

/// Populates `dest` from `value`'s mapping entries.
///
/// If `T::IS_CONFIGURATION`, `dest` is reset to `T::default()` first
/// (§4.4's reset-on-read invariant) so stale state from a reused
/// destination never leaks into the newly decoded object. Unknown
/// mapping entries are ignored; fields absent from the mapping are left
/// at whatever `dest` already held (its defaults, for a freshly reset
/// configuration object).
pub fn populate<T: Marshallable>(dest: &mut T, value: &Value) -> Result<()> {
    if T::IS_CONFIGURATION {
        *dest = T::default();
    }
    let dict = value
        .as_mapping()
        .ok_or_else(|| Error::invalid_marshallable("expected a mapping to populate a marshallable"))?;
    for field in T::fields() {
        if let Some(raw) = dict.get(field.name) {
            let decoded = decode_field(&field.annotation, raw.clone())?;
            (field.set)(dest, decoded)?;
        }
    }
    Ok(())
}
