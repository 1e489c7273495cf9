/// Serde adapter storing `U256` as a base-10 string. Document stores have no
/// native 256-bit integer and hex strings do not read well in the explorer.
pub mod u256_decimal {
    use alloy_primitives::U256;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let raw = String::deserialize(deserializer)?;
        U256::from_str_radix(&raw, 10).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::U256;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Wrapper {
        #[serde(with = "super::u256_decimal")]
        value: U256,
    }

    #[test]
    fn test_beyond_u128_survives() {
        let value = U256::from(u128::MAX) * U256::from(1_000u64);
        let json = serde_json::to_string(&Wrapper { value }).unwrap();
        assert_eq!(
            json,
            r#"{"value":"340282366920938463463374607431768211455000"}"#
        );
        let back: Wrapper = serde_json::from_str(&json).unwrap();
        assert_eq!(back.value, value);
    }

    #[test]
    fn test_rejects_non_decimal() {
        assert!(serde_json::from_str::<Wrapper>(r#"{"value":"12ab"}"#).is_err());
    }
}
