use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::VaultError;

/// Dataset reference in `owner/dataset-name` form, as used by the hosting
/// provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetName(String);

impl DatasetName {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn owner(&self) -> &str {
        self.0.split_once('/').map(|(owner, _)| owner).unwrap_or("")
    }

    pub fn slug(&self) -> DatasetSlug {
        DatasetSlug(self.0.replace('/', "_"))
    }
}

impl fmt::Display for DatasetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DatasetName {
    type Err = VaultError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let Some((owner, name)) = trimmed.split_once('/') else {
            return Err(VaultError::InvalidDatasetName(value.to_string()));
        };
        let segment_ok = |segment: &str| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || ch == '.')
        };
        if !segment_ok(owner) || !segment_ok(name) {
            return Err(VaultError::InvalidDatasetName(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

/// Filesystem-safe identifier for a dataset: slashes replaced by underscores.
/// Used as the folder segment of a blob path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetSlug(String);

impl DatasetSlug {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Listing prefix for this dataset under a user's namespace.
    pub fn prefix(&self, user: &UserId) -> String {
        format!("{}/{}", user.namespace(), self.0)
    }

    /// Full blob path `user_<id>/<slug>/<file_name>`.
    pub fn blob_path(&self, user: &UserId, file_name: &str) -> String {
        format!("{}/{}/{}", user.namespace(), self.0, file_name)
    }
}

impl fmt::Display for DatasetSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque identity-provider user id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn namespace(&self) -> String {
        format!("user_{}", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = VaultError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let is_valid = !trimmed.is_empty()
            && trimmed
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '-');
        if !is_valid {
            return Err(VaultError::AuthFailed(format!("invalid user id: {value}")));
        }
        Ok(Self(trimmed.to_string()))
    }
}

/// One dataset visible in a user's storage namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetEntry {
    /// Display name, `<folder>/<file>` for nested blobs or the bare file name
    /// for blobs at the namespace root.
    pub name: String,
    /// Full blob path usable with the object store.
    pub path: String,
}

impl DatasetEntry {
    pub fn file_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_dataset_name_valid() {
        let name: DatasetName = "NUFORC/ufo-sightings".parse().unwrap();
        assert_eq!(name.as_str(), "NUFORC/ufo-sightings");
        assert_eq!(name.owner(), "NUFORC");
        assert_eq!(name.slug().as_str(), "NUFORC_ufo-sightings");
    }

    #[test]
    fn parse_dataset_name_invalid() {
        let err = "no-slash".parse::<DatasetName>().unwrap_err();
        assert_matches!(err, VaultError::InvalidDatasetName(_));

        let err = "a/b/c".parse::<DatasetName>().unwrap_err();
        assert_matches!(err, VaultError::InvalidDatasetName(_));

        let err = "/empty-owner".parse::<DatasetName>().unwrap_err();
        assert_matches!(err, VaultError::InvalidDatasetName(_));
    }

    #[test]
    fn blob_path_layout() {
        let user: UserId = "42ab".parse().unwrap();
        let name: DatasetName = "org/demo".parse().unwrap();
        let slug = name.slug();
        assert_eq!(slug.prefix(&user), "user_42ab/org_demo");
        assert_eq!(
            slug.blob_path(&user, "scrubbed.csv"),
            "user_42ab/org_demo/scrubbed.csv"
        );
    }

    #[test]
    fn dataset_entry_file_name() {
        let entry = DatasetEntry {
            name: "org_demo/scrubbed.csv".to_string(),
            path: "user_42ab/org_demo/scrubbed.csv".to_string(),
        };
        assert_eq!(entry.file_name(), "scrubbed.csv");
    }
}
