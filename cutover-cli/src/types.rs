//! Common types used across CLI modules

use uuid::Uuid;

/// Identifier that can be either a full UUID or an unambiguous prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdOrPrefix {
    /// Full UUID
    Full(Uuid),
    /// Prefix that should uniquely identify a resource
    Prefix(String),
}

impl IdOrPrefix {
    /// Parse a string into an IdOrPrefix
    ///
    /// Attempts to parse as a full UUID first, otherwise treats as a prefix
    pub fn parse(input: &str) -> Self {
        match Uuid::parse_str(input) {
            Ok(uuid) => IdOrPrefix::Full(uuid),
            Err(_) => IdOrPrefix::Prefix(input.trim().to_lowercase()),
        }
    }

    /// Get the UUID if this is a full ID
    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            IdOrPrefix::Full(uuid) => Some(*uuid),
            IdOrPrefix::Prefix(_) => None,
        }
    }

    /// Pick the single id in `ids` this prefix identifies
    ///
    /// `kind` names the resource in error messages.
    pub fn pick(&self, kind: &str, ids: impl IntoIterator<Item = Uuid>) -> anyhow::Result<Uuid> {
        if let Some(uuid) = self.as_uuid() {
            return Ok(uuid);
        }

        let prefix = self.to_string();
        let matches: Vec<Uuid> = ids
            .into_iter()
            .filter(|id| id.to_string().starts_with(&prefix))
            .collect();

        match matches.as_slice() {
            [] => anyhow::bail!("No {} found with ID starting with '{}'", kind, prefix),
            [id] => Ok(*id),
            _ => {
                let ids: Vec<String> = matches.iter().map(|id| id.to_string()).collect();
                anyhow::bail!(
                    "Ambiguous prefix '{}' matches multiple {}s: {}",
                    prefix,
                    kind,
                    ids.join(", ")
                )
            }
        }
    }
}

impl std::fmt::Display for IdOrPrefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdOrPrefix::Full(uuid) => write!(f, "{}", uuid),
            IdOrPrefix::Prefix(prefix) => write!(f, "{}", prefix),
        }
    }
}
