/// S3 target configuration for the release origin bucket
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    /// S3 bucket name (created by the provisioning tool, never by the pipeline)
    pub bucket: String,
    /// AWS region
    pub region: String,
    /// Custom endpoint (S3-compatible stores, local testing)
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Whether to use path-style URLs (false = virtual-hosted-style)
    #[serde(default)]
    pub path_style: bool,
}

impl S3Config {
    pub fn new(bucket: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            region: region.into(),
            endpoint: None,
            path_style: false,
        }
    }
}

/// Validate an S3 bucket name against the general-purpose bucket naming rules
pub fn is_valid_bucket_name(name: &str) -> bool {
    let len_ok = (3..=63).contains(&name.len());
    let chars_ok = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.');
    let edges_ok = name
        .chars()
        .next()
        .map(|c| c.is_ascii_alphanumeric())
        .unwrap_or(false)
        && name
            .chars()
            .last()
            .map(|c| c.is_ascii_alphanumeric())
            .unwrap_or(false);

    len_ok && chars_ok && edges_ok && !name.contains("..")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_name_rules() {
        assert!(is_valid_bucket_name("asadalikhan.co.uk"));
        assert!(is_valid_bucket_name("site-origin-01"));
        assert!(!is_valid_bucket_name("ab"));
        assert!(!is_valid_bucket_name("Uppercase"));
        assert!(!is_valid_bucket_name("-leading-dash"));
        assert!(!is_valid_bucket_name("double..dot"));
        assert!(!is_valid_bucket_name("*"));
    }
}
