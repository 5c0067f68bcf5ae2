//! Hermes (Pyth) latest-price payload parsing.
//!
//! Payload shapes seen in the wild:
//! - `{ "parsed": [ { "id": "...", "price": { "price": "6400012345", "expo": -8 } } ] }`
//! - `{ "price_feeds": [ { "price_feed": { "id": ..., "latest_price": {...} } } ] }`
//!
//! The real price is `price * 10^expo`; `price` may arrive as a string.

use serde_json::Value;

use super::catalog::canon_feed_id;

/// Parse a single feed entry into `(canonical_feed_id, price)`.
pub fn parse_hermes_price(entry: &Value) -> Option<(String, f64)> {
    let feed = entry.get("price_feed").unwrap_or(entry);
    let id = ["id", "price_feed_id", "feed_id"]
        .iter()
        .find_map(|k| feed.get(*k).and_then(Value::as_str))?;
    let price_obj = ["price", "latest_price", "price_info"]
        .iter()
        .find_map(|k| feed.get(*k).filter(|v| v.is_object()))?;

    let mantissa = number_field(price_obj.get("price")?)?;
    let expo = number_field(price_obj.get("expo")?)?;
    let real = mantissa * 10f64.powi(expo as i32);
    real.is_finite().then(|| (canon_feed_id(id), real))
}

/// Parse every entry of a latest-price response.
pub fn parse_hermes_batch(body: &Value) -> Vec<(String, f64)> {
    let entries = if let Some(arr) = body.as_array() {
        arr
    } else {
        match ["parsed", "price_feeds", "feeds"]
            .iter()
            .find_map(|k| body.get(*k).and_then(Value::as_array))
        {
            Some(arr) => arr,
            None => return Vec::new(),
        }
    };
    entries.iter().filter_map(parse_hermes_price).collect()
}

fn number_field(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::Market;
    use serde_json::json;

    #[test]
    fn test_parsed_envelope_with_string_mantissa() {
        let body = json!({
            "parsed": [
                {
                    "id": "e62df6c8b4a85fe1a67db44dc12de5db330f7ac66b72dc658afedf0f4a415b43",
                    "price": { "price": "6400012345678", "conf": "1", "expo": -8 }
                },
                { "id": "bad", "price": { "price": null, "expo": -8 } }
            ]
        });
        let parsed = parse_hermes_batch(&body);
        assert_eq!(parsed.len(), 1);
        let (id, price) = &parsed[0];
        assert_eq!(Market::from_feed_id(id), Some(Market::BtcUsd));
        assert!((price - 64_000.12345678).abs() < 1e-6);
    }

    #[test]
    fn test_nested_price_feed_shape() {
        let entry = json!({
            "price_feed": {
                "id": "0xFF61491A931112DDF1BD8147CD1B641375F79F5825126D665480874634FD0ACE",
                "latest_price": { "price": 312345, "expo": -2 }
            }
        });
        let (id, price) = parse_hermes_price(&entry).unwrap();
        assert_eq!(Market::from_feed_id(&id), Some(Market::EthUsd));
        assert!((price - 3123.45).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_envelope_yields_nothing() {
        assert!(parse_hermes_batch(&json!({ "data": 1 })).is_empty());
        assert!(parse_hermes_price(&json!({ "id": "x" })).is_none());
    }
}
