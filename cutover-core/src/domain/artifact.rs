//! Artifact domain types

use serde::{Deserialize, Serialize};

/// Content address of an artifact blob
///
/// Always of the form `sha256:<64 lowercase hex digits>`. A reference
/// resolves to exactly the bytes that were hashed to produce it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ArtifactRef(String);

pub const ARTIFACT_REF_PREFIX: &str = "sha256:";

impl ArtifactRef {
    /// Builds a reference from a raw sha256 digest
    pub fn from_sha256(digest: [u8; 32]) -> Self {
        let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
        Self(format!("{ARTIFACT_REF_PREFIX}{hex}"))
    }

    /// Builds a reference from a hex-encoded sha256 digest
    pub fn from_digest_hex(hex: &str) -> Result<Self, InvalidArtifactRef> {
        Self::parse(&format!("{ARTIFACT_REF_PREFIX}{hex}"))
    }

    /// Parses and validates a reference string
    pub fn parse(s: &str) -> Result<Self, InvalidArtifactRef> {
        let digest = s
            .strip_prefix(ARTIFACT_REF_PREFIX)
            .ok_or_else(|| InvalidArtifactRef(s.to_string()))?;

        let valid = digest.len() == 64
            && digest
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c));

        if !valid {
            return Err(InvalidArtifactRef(s.to_string()));
        }

        Ok(Self(s.to_string()))
    }

    /// The hex digest without the algorithm prefix
    pub fn digest(&self) -> &str {
        &self.0[ARTIFACT_REF_PREFIX.len()..]
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for ArtifactRef {
    type Error = InvalidArtifactRef;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ArtifactRef> for String {
    fn from(value: ArtifactRef) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid artifact reference '{0}'")]
pub struct InvalidArtifactRef(pub String);

/// Build output handed from the Build stage to the Deploy stage
///
/// The build executor writes this JSON document to its output; the Deploy
/// stage substitutes `image` into the service's task template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDefinition {
    pub image: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIGEST: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    #[test]
    fn test_parse_valid_ref() {
        let r = ArtifactRef::parse(&format!("sha256:{DIGEST}")).unwrap();
        assert_eq!(r.digest(), DIGEST);
        assert_eq!(r.to_string(), format!("sha256:{DIGEST}"));
    }

    #[test]
    fn test_from_sha256_matches_parse() {
        let mut digest = [0u8; 32];
        digest[0] = 0xab;
        digest[31] = 0x01;
        let r = ArtifactRef::from_sha256(digest);
        assert_eq!(ArtifactRef::parse(r.as_str()).unwrap(), r);
        assert!(r.digest().starts_with("ab00"));
        assert!(r.digest().ends_with("01"));
    }

    #[test]
    fn test_parse_rejects_bad_refs() {
        assert!(ArtifactRef::parse(DIGEST).is_err());
        assert!(ArtifactRef::parse("sha256:abc").is_err());
        assert!(ArtifactRef::parse(&format!("sha256:{}", DIGEST.to_uppercase())).is_err());
        assert!(ArtifactRef::parse("sha256:../../etc/passwd").is_err());
    }

    #[test]
    fn test_serde_validates() {
        let json = format!("\"sha256:{DIGEST}\"");
        let r: ArtifactRef = serde_json::from_str(&json).unwrap();
        assert_eq!(serde_json::to_string(&r).unwrap(), json);

        let bad: Result<ArtifactRef, _> = serde_json::from_str("\"md5:1234\"");
        assert!(bad.is_err());
    }
}
