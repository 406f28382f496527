//! Embedded descriptor parsing.
//!
//! Modules carry their product metadata as a plain byte block so the host can
//! read it without loading or running the module:
//!
//! ```text
//! @@KINDLING-DESCRIPTOR@@ProductName=Kindling Plugin\0ProductVersion=1.2.0\0\0
//! ```

use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::debug;

use super::api::{DEFAULT_PRODUCT_NAME, DESCRIPTOR_MAGIC};
use super::legacy::find_marker;

/// Upper bound on a descriptor block, magic excluded
pub const MAX_DESCRIPTOR_LEN: usize = 4096;

/// Product/version information a module declares about itself
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ModuleMetadata {
    pub product_name: String,
    pub product_version: Option<String>,
    pub file_description: Option<String>,
    pub company_name: Option<String>,
    pub file_version: Option<String>,
}

impl ModuleMetadata {
    #[must_use]
    pub fn new(product_name: impl Into<String>) -> Self {
        Self {
            product_name: product_name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.product_version = Some(version.into());
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.file_description = Some(description.into());
        self
    }
}

/// Find and parse the first well-formed descriptor block in `bytes`.
#[must_use]
pub fn read_descriptor(bytes: &[u8]) -> Option<ModuleMetadata> {
    let mut offset = 0;
    while let Some(found) = find_marker(&bytes[offset..], DESCRIPTOR_MAGIC) {
        let start = offset + found + DESCRIPTOR_MAGIC.len();
        if let Some(metadata) = parse_block(&bytes[start..]) {
            return Some(metadata);
        }
        offset = start;
    }
    None
}

fn parse_block(block: &[u8]) -> Option<ModuleMetadata> {
    let mut rest = &block[..block.len().min(MAX_DESCRIPTOR_LEN)];
    let mut metadata = ModuleMetadata::default();
    let mut product_name = None;

    loop {
        let end = rest.iter().position(|&b| b == 0)?;
        if end == 0 {
            break;
        }

        let field = std::str::from_utf8(&rest[..end]).ok()?;
        let (key, value) = field.split_once('=')?;
        if key.is_empty() || !key.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return None;
        }

        let value = Some(value.to_string());
        match key {
            "ProductName" => product_name = value,
            "ProductVersion" => metadata.product_version = value,
            "FileDescription" => metadata.file_description = value,
            "CompanyName" => metadata.company_name = value,
            "FileVersion" => metadata.file_version = value,
            _ => {}
        }

        rest = &rest[end + 1..];
    }

    metadata.product_name = product_name?;
    Some(metadata)
}

/// Serialize metadata as a descriptor block, magic included.
#[must_use]
pub fn encode_descriptor(metadata: &ModuleMetadata) -> Vec<u8> {
    let mut block = DESCRIPTOR_MAGIC.to_vec();
    let fields = [
        ("ProductName", Some(&metadata.product_name)),
        ("ProductVersion", metadata.product_version.as_ref()),
        ("FileDescription", metadata.file_description.as_ref()),
        ("CompanyName", metadata.company_name.as_ref()),
        ("FileVersion", metadata.file_version.as_ref()),
    ];
    for (key, value) in fields {
        if let Some(value) = value {
            block.extend_from_slice(key.as_bytes());
            block.push(b'=');
            block.extend_from_slice(value.as_bytes());
            block.push(0);
        }
    }
    block.push(0);
    block
}

/// Accepts modules whose descriptor names this host's extension family.
#[derive(Debug, Clone)]
pub struct MetadataValidator {
    product_name: String,
}

impl MetadataValidator {
    #[must_use]
    pub fn new(product_name: impl Into<String>) -> Self {
        Self {
            product_name: product_name.into(),
        }
    }

    #[must_use]
    pub fn product_name(&self) -> &str {
        &self.product_name
    }

    /// Metadata of `path` if it declares our product name. Unreadable files,
    /// missing descriptors and foreign products are all `None`.
    pub fn validate(&self, path: &Path) -> Option<ModuleMetadata> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!("Skipping {}: {}", path.display(), e);
                return None;
            }
        };

        let Some(metadata) = read_descriptor(&bytes) else {
            debug!("Skipping {}: no descriptor", path.display());
            return None;
        };

        if metadata.product_name != self.product_name {
            debug!(
                "Skipping {}: product '{}' is not '{}'",
                path.display(),
                metadata.product_name,
                self.product_name
            );
            return None;
        }

        Some(metadata)
    }
}

impl Default for MetadataValidator {
    fn default() -> Self {
        Self::new(DEFAULT_PRODUCT_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module_bytes(descriptor: &[u8]) -> Vec<u8> {
        let mut bytes = b"\x7fELF\x02\x01\x01\x00 some code \x00".to_vec();
        bytes.extend_from_slice(descriptor);
        bytes.extend_from_slice(b"\x00\x00trailing sections");
        bytes
    }

    #[test]
    fn test_read_descriptor_all_fields() {
        let raw = b"@@KINDLING-DESCRIPTOR@@ProductName=Kindling Plugin\0ProductVersion=1.2.0\0\
FileDescription=Clock\0CompanyName=Acme\0FileVersion=1.2.0.7\0\0";
        let metadata = read_descriptor(&module_bytes(raw)).unwrap();
        assert_eq!(metadata.product_name, "Kindling Plugin");
        assert_eq!(metadata.product_version.as_deref(), Some("1.2.0"));
        assert_eq!(metadata.file_description.as_deref(), Some("Clock"));
        assert_eq!(metadata.company_name.as_deref(), Some("Acme"));
        assert_eq!(metadata.file_version.as_deref(), Some("1.2.0.7"));
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let raw = b"@@KINDLING-DESCRIPTOR@@Comments=hi\0ProductName=X\0\0";
        assert_eq!(read_descriptor(raw).unwrap().product_name, "X");
    }

    #[test]
    fn test_missing_product_name_is_rejected() {
        let raw = b"@@KINDLING-DESCRIPTOR@@ProductVersion=1.0\0\0";
        assert!(read_descriptor(raw).is_none());
    }

    #[test]
    fn test_unterminated_block_is_rejected() {
        let mut raw = b"@@KINDLING-DESCRIPTOR@@ProductName=".to_vec();
        raw.extend(std::iter::repeat(b'a').take(MAX_DESCRIPTOR_LEN + 16));
        assert!(read_descriptor(&raw).is_none());
    }

    #[test]
    fn test_first_well_formed_block_wins() {
        // A bare magic constant followed by unrelated data, then the real block
        let mut raw = b"@@KINDLING-DESCRIPTOR@@\x01\x02garbage".to_vec();
        raw.extend(encode_descriptor(&ModuleMetadata::new("Kindling Plugin").with_version("2.0")));
        raw.extend(encode_descriptor(&ModuleMetadata::new("Something Else")));

        let metadata = read_descriptor(&raw).unwrap();
        assert_eq!(metadata.product_name, "Kindling Plugin");
        assert_eq!(metadata.product_version.as_deref(), Some("2.0"));
    }

    #[test]
    fn test_encode_then_read_keeps_optional_fields_absent() {
        let metadata = ModuleMetadata::new("Kindling Plugin").with_description("Notes");
        let parsed = read_descriptor(&encode_descriptor(&metadata)).unwrap();
        assert_eq!(parsed, metadata);
        assert!(parsed.product_version.is_none());
    }

    #[test]
    fn test_validator_checks_product_name_exactly() {
        let dir = tempfile::tempdir().unwrap();
        let ours = dir.path().join("Ours.dll");
        let theirs = dir.path().join("Theirs.dll");
        let close = dir.path().join("Close.dll");
        let plain = dir.path().join("Plain.dll");

        std::fs::write(&ours, module_bytes(&encode_descriptor(&ModuleMetadata::new("Kindling Plugin")))).unwrap();
        std::fs::write(&theirs, module_bytes(&encode_descriptor(&ModuleMetadata::new("Other App")))).unwrap();
        std::fs::write(&close, module_bytes(&encode_descriptor(&ModuleMetadata::new("kindling plugin")))).unwrap();
        std::fs::write(&plain, b"no descriptor here").unwrap();

        let validator = MetadataValidator::default();
        assert!(validator.validate(&ours).is_some());
        assert!(validator.validate(&theirs).is_none());
        assert!(validator.validate(&close).is_none());
        assert!(validator.validate(&plain).is_none());
        assert!(validator.validate(&dir.path().join("Missing.dll")).is_none());
    }
}
