//! Raw messages as delivered by the transport.

use crate::uptime::types::CheckResult;

/// One message from a partitioned results stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamMessage {
    pub partition: u32,
    pub offset: u64,
    pub payload: Vec<u8>,
}

impl StreamMessage {
    pub fn new(partition: u32, offset: u64, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            partition,
            offset,
            payload: payload.into(),
        }
    }

    pub fn decode(&self) -> serde_json::Result<CheckResult> {
        serde_json::from_slice(&self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uptime::types::CheckStatus;

    #[test]
    fn test_decode() {
        let msg = StreamMessage::new(
            0,
            12,
            r#"{"guid":"a","subscription_id":"s","status":"failure","scheduled_check_time_ms":1,"actual_check_time_ms":2}"#,
        );
        let result = msg.decode().unwrap();
        assert_eq!(result.status, CheckStatus::Failure);
        assert_eq!(result.subscription_id.as_str(), "s");

        assert!(StreamMessage::new(0, 13, "not json").decode().is_err());
    }
}
