// JSON is the one structured-text encoding used for blocks on the wire and on disk
use crate::error::{BlockchainError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Serialize data to compact JSON bytes
pub fn serialize<T: Serialize>(data: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(data)
        .map_err(|e| BlockchainError::Serialization(format!("Serialization failed: {e}")))
}

/// Deserialize data from JSON bytes
pub fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| BlockchainError::Decode(format!("Deserialization failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct TestData {
        id: u64,
        name: String,
        values: Vec<i32>,
    }

    #[test]
    fn test_serialize_deserialize() {
        let original = TestData {
            id: 42,
            name: "test".to_string(),
            values: vec![1, 2, 3, 4, 5],
        };

        let serialized = serialize(&original).expect("Serialization should work");
        let deserialized: TestData = deserialize(&serialized).expect("Deserialization should work");

        assert_eq!(original, deserialized);
    }

    #[test]
    fn test_serialize_keeps_field_order() {
        let data = TestData {
            id: 1,
            name: "a".to_string(),
            values: vec![],
        };
        let bytes = serialize(&data).unwrap();
        assert_eq!(bytes, br#"{"id":1,"name":"a","values":[]}"#.to_vec());
    }

    #[test]
    fn test_deserialize_invalid_data() {
        let invalid_bytes = vec![0xFF, 0xFF, 0xFF, 0xFF];
        let result: Result<TestData> = deserialize(&invalid_bytes);
        assert!(matches!(result, Err(BlockchainError::Decode(_))));
    }
}
