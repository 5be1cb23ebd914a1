//! Short identifier sources.

use std::time::Duration;

use tracing::debug;
use uuid::Uuid;

use crate::error::MintingError;

/// Fields reported back to the minting service once a record exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintUpdate<'a> {
    pub long_url: &'a str,
    pub short_url: &'a str,
    pub short_id: &'a str,
    pub created_at: &'a str,
}

/// External service handing out candidate short identifiers.
pub trait MintingService: Send + Sync {
    /// Produce one candidate; callers check it for collisions.
    fn mint(&self) -> Result<String, MintingError>;

    /// Tell the service where a minted identifier now points.
    fn update(&self, update: &MintUpdate<'_>) -> Result<(), MintingError>;
}

/// Offline minting: 8 hex characters drawn from a random UUID.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalNoidService;

impl MintingService for LocalNoidService {
    fn mint(&self) -> Result<String, MintingError> {
        let raw = Uuid::new_v4().simple().to_string();
        Ok(raw[..8].to_string())
    }

    fn update(&self, _update: &MintUpdate<'_>) -> Result<(), MintingError> {
        Ok(())
    }
}

/// Client for the HTTP NOID service (`GET <endpoint>mint`, `POST <endpoint>update`).
#[derive(Debug, Clone)]
pub struct HttpNoidService {
    client: reqwest::blocking::Client,
    endpoint: String,
    api_key: String,
}

impl HttpNoidService {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Result<Self, MintingError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        })
    }
}

impl MintingService for HttpNoidService {
    fn mint(&self) -> Result<String, MintingError> {
        let url = format!("{}mint", self.endpoint);
        let response = self
            .client
            .get(&url)
            .header("x-api-key", &self.api_key)
            .send()
            .map_err(|e| MintingError::Unavailable(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(MintingError::Unavailable(format!("mint returned {status}")));
        }
        let body: serde_json::Value = response.json()?;
        let message = body
            .get("message")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| MintingError::InvalidResponse(body.to_string()))?;
        debug!(message, "mint response");
        parse_mint_message(message)
    }

    fn update(&self, update: &MintUpdate<'_>) -> Result<(), MintingError> {
        let url = format!("{}update", self.endpoint);
        let form = [
            ("long_url", update.long_url),
            ("short_url", update.short_url),
            ("noid", update.short_id),
            ("create_date", update.created_at),
        ];
        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .form(&form)
            .send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(MintingError::InvalidResponse(format!("update returned {status}")));
        }
        Ok(())
    }
}

/// Extract `<id>` from `"New NOID: <id> is created."`.
pub fn parse_mint_message(message: &str) -> Result<String, MintingError> {
    const PREFIX: &str = "New NOID: ";
    const SUFFIX: &str = " is created.";
    let start = message
        .find(PREFIX)
        .map(|i| i + PREFIX.len())
        .ok_or_else(|| MintingError::InvalidResponse(message.to_string()))?;
    let end = message[start..]
        .find(SUFFIX)
        .map(|i| start + i)
        .ok_or_else(|| MintingError::InvalidResponse(message.to_string()))?;
    let id = message[start..end].trim();
    if id.is_empty() {
        return Err(MintingError::InvalidResponse(message.to_string()));
    }
    Ok(id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mint_message() {
        assert_eq!(parse_mint_message("New NOID: 3c5a9b7e is created.").unwrap(), "3c5a9b7e");
        assert!(parse_mint_message("quota exceeded").is_err());
        assert!(parse_mint_message("New NOID:  is created.").is_err());
    }

    #[test]
    fn local_ids_are_eight_hex_chars() {
        let id = LocalNoidService.mint().unwrap();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
