//! Serializes `u64` monetary fields as decimal strings, per the wire schema's
//! bignum-safety rule ("every numeric field decimal-stringified").

use serde::{de::Error as DeError, Deserialize, Deserializer, Serializer};

pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.to_string())
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    let s = String::deserialize(deserializer)?;
    s.parse::<u64>().map_err(D::Error::custom)
}

#[cfg(test)]
mod tests {
    #[derive(serde::Serialize, serde::Deserialize)]
    struct Wrapper {
        #[serde(with = "super")]
        amount: u64,
    }

    #[test]
    fn amount_is_stringified() {
        let w = Wrapper { amount: 1_024_000_000 };
        let json = serde_json::to_string(&w).unwrap();
        assert_eq!(json, r#"{"amount":"1024000000"}"#);
        let back: Wrapper = serde_json::from_str(&json).unwrap();
        assert_eq!(back.amount, 1_024_000_000);
    }
}
