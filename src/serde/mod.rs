//! Bridges arbitrary `serde::Serialize`/`Deserialize` types to and from
//! the value tree (§3 "value tree"), for callers whose types already
//! derive `Serialize`/`Deserialize` and would rather not declare a
//! [`crate::marshal::Marshallable`] field table by hand.
//!
//! The JSON dialect's own JSON conversion (`crate::wire::json`) is reused
//! as the intermediate data model: it is already the widest structural
//! mapping between [`Value`] and an ecosystem-standard representation,
//! so a type that round-trips through the JSON dialect round-trips
//! through [`to_value`]/[`from_value`] too. This trades perfect fidelity
//! for width hints and raw-text/blob/typed-object distinctions (a plain
//! `serde::Serialize` type has no way to express those) for the
//! convenience of not writing a field table — `Marshallable` remains the
//! way to get exact control over a type's wire shape.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::value::Value;
use crate::wire::json::{json_to_value, value_to_json};

/// Converts any `Serialize` type into a [`Value`].
pub fn to_value<T: Serialize>(value: &T) -> Result<Value> {
    let json = serde_json::to_value(value)
        .map_err(|e| Error::invalid_marshallable(format!("failed to serialize: {}", e)))?;
    Ok(json_to_value(json))
}

/// The inverse of [`to_value`].
pub fn from_value<T: DeserializeOwned>(value: &Value) -> Result<T> {
    let json = value_to_json(value, false);
    serde_json::from_value(json)
        .map_err(|e| Error::invalid_marshallable(format!("failed to deserialize: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Order {
        symbol: String,
        quantity: i64,
        limit: Option<f64>,
    }

    #[test]
    fn round_trips_an_arbitrary_serde_struct_through_value() {
        let order = Order {
            symbol: "AAPL".to_owned(),
            quantity: 100,
            limit: Some(142.5),
        };
        let value = to_value(&order).unwrap();
        assert_eq!(value.as_mapping().unwrap().get("symbol").unwrap().as_text(), Some("AAPL"));
        let back: Order = from_value(&value).unwrap();
        assert_eq!(back, order);
    }

    #[test]
    fn round_trips_through_none() {
        let order = Order {
            symbol: "MSFT".to_owned(),
            quantity: 1,
            limit: None,
        };
        let value = to_value(&order).unwrap();
        let back: Order = from_value(&value).unwrap();
        assert_eq!(back, order);
    }
}
