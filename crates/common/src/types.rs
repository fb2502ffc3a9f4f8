use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of an event-sourced aggregate.
///
/// For the order lifecycle this is the order attempt id: it is assigned when
/// checkout starts and stays the key of the order once payment is confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregateId(Uuid);

impl AggregateId {
    /// Creates a new random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Parses an id from its hyphenated string form.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }

    /// All 32 hex digits, upper-cased and without hyphens. Distinct ids
    /// always give distinct codes, so external references built from it
    /// stay unique.
    pub fn reference_code(&self) -> String {
        self.0.simple().to_string().to_ascii_uppercase()
    }
}

impl Default for AggregateId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AggregateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for AggregateId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<AggregateId> for Uuid {
    fn from(id: AggregateId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ids_are_unique() {
        assert_ne!(AggregateId::new(), AggregateId::new());
    }

    #[test]
    fn parse_accepts_display_output() {
        let id = AggregateId::new();
        assert_eq!(AggregateId::parse(&id.to_string()).unwrap(), id);
        assert!(AggregateId::parse("not-a-uuid").is_err());
    }

    #[test]
    fn reference_code_is_whole_id_in_upper_hex() {
        let id = AggregateId::from_uuid(
            Uuid::parse_str("0a1b2c3d-4e5f-6789-abcd-ef0123456789").unwrap(),
        );
        assert_eq!(id.reference_code(), "0A1B2C3D4E5F6789ABCDEF0123456789");
    }

    #[test]
    fn serializes_as_plain_uuid_string() {
        let id = AggregateId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
    }
}
