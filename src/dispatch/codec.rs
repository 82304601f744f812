use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::errors::DispatchError;

/// Wire encoding of action messages
pub trait Codec: Send + Sync + 'static {
    fn marshal<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, DispatchError>;

    fn unmarshal<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, DispatchError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn marshal<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, DispatchError> {
        serde_json::to_vec(value).map_err(|e| DispatchError::Encode(e.to_string()))
    }

    fn unmarshal<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, DispatchError> {
        serde_json::from_slice(data).map_err(|e| DispatchError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_json_codec() {
        let codec = JsonCodec;
        let mut value = HashMap::new();
        value.insert("X".to_string(), 1);

        let data = codec.marshal(&value).unwrap();
        assert_eq!(data, br#"{"X":1}"#.to_vec());

        let err = codec.unmarshal::<HashMap<String, i32>>(b"{oops").unwrap_err();
        assert!(matches!(err, DispatchError::Decode(_)));
    }
}
