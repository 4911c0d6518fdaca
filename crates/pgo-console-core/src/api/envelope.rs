use serde::{Deserialize, Serialize};

/// Wrapper the backend puts around every response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEnvelope<T> {
    pub status: bool,
    #[serde(default)]
    pub status_code: u16,
    #[serde(default)]
    pub message: String,
    pub data: Option<T>,
}

impl<T> ApiEnvelope<T> {
    /// The payload of a successful envelope, or the backend's message.
    pub fn into_data(self) -> Result<T, String> {
        match (self.status, self.data) {
            (true, Some(data)) => Ok(data),
            _ if self.message.is_empty() => Err("Request was not successful".to_string()),
            _ => Err(self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_successful_envelope() {
        let json = r#"{"status":true,"statusCode":200,"message":"OK","data":true}"#;
        let envelope: ApiEnvelope<bool> = serde_json::from_str(json).expect("valid envelope");
        assert_eq!(envelope.status_code, 200);
        assert_eq!(envelope.into_data(), Ok(true));
    }

    #[test]
    fn test_failed_envelope_keeps_message() {
        let json = r#"{"status":false,"statusCode":400,"message":"Current password is incorrect","data":null}"#;
        let envelope: ApiEnvelope<bool> = serde_json::from_str(json).expect("valid envelope");
        assert_eq!(envelope.into_data(), Err("Current password is incorrect".to_string()));
    }

    #[test]
    fn test_failed_envelope_without_message() {
        let json = r#"{"status":false,"data":null}"#;
        let envelope: ApiEnvelope<bool> = serde_json::from_str(json).expect("valid envelope");
        assert!(envelope.into_data().is_err());
    }
}
