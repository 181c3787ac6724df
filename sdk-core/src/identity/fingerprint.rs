//! Device fingerprint derivation
//!
//! The device identifier is a pure function of an ordered tuple of hardware
//! attributes plus the digest of the app signing certificate:
//!
//! ```text
//! sha256(brand|manufacturer|model|device|product|hardware|signing_digest)
//! ```
//!
//! Missing attributes contribute the empty string, so every fingerprint has
//! exactly six separators and positions never shift.

use sha2::{Digest, Sha256};

use super::DeviceId;

/// Separator between fingerprint fields
pub const FIELD_SEPARATOR: &str = "|";

/// Ordered hardware and signing attributes of one device
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceAttributes {
    pub brand: Option<String>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub device: Option<String>,
    pub product: Option<String>,
    pub hardware: Option<String>,
    /// Lower-case hex SHA-256 of the app signing certificate
    pub signing_cert_digest: Option<String>,
}

impl DeviceAttributes {
    /// Set the signing digest from the raw (DER) certificate bytes
    pub fn with_signing_certificate(mut self, certificate: &[u8]) -> Self {
        self.signing_cert_digest = Some(hex::encode(Sha256::digest(certificate)));
        self
    }

    /// The `|`-joined fingerprint string
    pub fn raw_fingerprint(&self) -> String {
        [
            &self.brand,
            &self.manufacturer,
            &self.model,
            &self.device,
            &self.product,
            &self.hardware,
            &self.signing_cert_digest,
        ]
        .iter()
        .map(|field| field.as_deref().unwrap_or(""))
        .collect::<Vec<_>>()
        .join(FIELD_SEPARATOR)
    }

    pub fn derive_id(&self) -> DeviceId {
        DeviceId(hex::encode(Sha256::digest(self.raw_fingerprint().as_bytes())))
    }
}

/// Source of device attributes; collection is best-effort.
pub trait DeviceInfoSource: Send + Sync {
    fn attributes(&self) -> DeviceAttributes;
}

/// Fixed attributes, for tests and for platforms that collect them up front
#[derive(Debug, Clone, Default)]
pub struct StaticDeviceInfo(pub DeviceAttributes);

impl DeviceInfoSource for StaticDeviceInfo {
    fn attributes(&self) -> DeviceAttributes {
        self.0.clone()
    }
}

/// Attributes of the machine the process runs on.
///
/// On Linux the DMI strings under `/sys/class/dmi/id` are used; elsewhere
/// only the CPU architecture is known.
#[derive(Debug, Clone, Default)]
pub struct HostDeviceInfo {
    signing_certificate: Option<Vec<u8>>,
}

impl HostDeviceInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_signing_certificate(certificate: Vec<u8>) -> Self {
        Self {
            signing_certificate: Some(certificate),
        }
    }

    fn dmi(field: &str) -> Option<String> {
        let value = std::fs::read_to_string(format!("/sys/class/dmi/id/{field}")).ok()?;
        let value = value.trim();
        (!value.is_empty()).then(|| value.to_string())
    }
}

impl DeviceInfoSource for HostDeviceInfo {
    fn attributes(&self) -> DeviceAttributes {
        let attributes = DeviceAttributes {
            brand: Self::dmi("board_vendor"),
            manufacturer: Self::dmi("sys_vendor"),
            model: Self::dmi("product_name"),
            device: Self::dmi("board_name"),
            product: Self::dmi("product_family"),
            hardware: Some(std::env::consts::ARCH.to_string()),
            signing_cert_digest: None,
        };

        match &self.signing_certificate {
            Some(cert) => attributes.with_signing_certificate(cert),
            None => attributes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    fn pixel() -> DeviceAttributes {
        DeviceAttributes {
            brand: Some("google".into()),
            manufacturer: Some("Google".into()),
            model: Some("Pixel 7".into()),
            device: Some("panther".into()),
            product: Some("panther".into()),
            hardware: Some("panther".into()),
            signing_cert_digest: None,
        }
        .with_signing_certificate(b"release-cert")
    }

    #[test]
    fn test_raw_fingerprint_order() {
        assert_eq!(
            pixel().raw_fingerprint(),
            "google|Google|Pixel 7|panther|panther|panther|\
             58ef63f250bbb2b42fefdbaf1eb063d258ceb294ee2e85909ffa7b120a082c11"
        );
    }

    #[test]
    fn test_missing_fields_keep_position() {
        let attrs = DeviceAttributes {
            model: Some("X".into()),
            ..Default::default()
        };
        assert_eq!(attrs.raw_fingerprint(), "||X||||");
        assert_eq!(DeviceAttributes::default().raw_fingerprint(), "||||||");
    }

    #[test]
    fn test_known_digest() {
        let id = pixel().derive_id();
        assert_eq!(
            id.as_str(),
            "18e3c29694665abeec917ba621de973752d228fa4f18e9e6eed44e115e3c054e"
        );

        let empty = DeviceAttributes::default().derive_id();
        assert_eq!(
            hex::decode(empty.as_str()).unwrap(),
            hex!("2dca6397f6798483d79ea9e0dcd45477d3fed0547a9194bef7440cfee3b2bf32")
        );
    }

    #[test]
    fn test_signing_certificate_changes_id() {
        let other = DeviceAttributes {
            signing_cert_digest: None,
            ..pixel()
        }
        .with_signing_certificate(b"debug-cert");
        assert_ne!(pixel().derive_id(), other.derive_id());
    }

    #[test]
    fn test_host_info_is_stable() {
        let host = HostDeviceInfo::with_signing_certificate(b"cert".to_vec());
        let first = host.attributes();
        assert_eq!(first, host.attributes());
        assert_eq!(first.hardware.as_deref(), Some(std::env::consts::ARCH));
        assert!(DeviceId::parse(first.derive_id().as_str()).is_some());
    }
}
