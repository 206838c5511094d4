//! Typed operation set for the plugin's method channel.
//!
//! The host framework delivers string-keyed method calls; they are parsed into
//! [`Method`] at the boundary so the dispatch in
//! [`crate::bridge::ScanBridge::handle_method`] is exhaustive at compile time.
//! An unrecognized name never gets past [`Method::parse`].

use crate::bridge::ScanError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, uniffi::Enum, strum::EnumString, strum::IntoStaticStr)]
pub enum Method {
    #[strum(serialize = "scanBarcode")]
    ScanBarcode,

    #[strum(serialize = "getPlatformVersion")]
    GetPlatformVersion,
}

impl Method {
    pub fn parse(name: &str) -> Result<Self, ScanError> {
        name.parse().map_err(|_| ScanError::NotImplemented(name.to_string()))
    }

    /// The wire name of this method
    pub fn name(&self) -> &'static str {
        (*self).into()
    }
}

/// Reply to one method call, mirroring [`Method`] variant for variant
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Enum)]
pub enum MethodReply {
    /// `scanBarcode`: the decoded payload, or `None` when the scan was
    /// cancelled
    Barcode { payload: Option<String> },

    /// `getPlatformVersion`: host OS version string
    PlatformVersion { version: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_methods() {
        assert_eq!(Method::parse("scanBarcode"), Ok(Method::ScanBarcode));
        assert_eq!(Method::parse("getPlatformVersion"), Ok(Method::GetPlatformVersion));
    }

    #[test]
    fn test_parse_unknown_method() {
        let err = Method::parse("openSettings").unwrap_err();
        assert_eq!(err, ScanError::NotImplemented("openSettings".to_string()));
        assert_eq!(err.code(), "NOT_IMPLEMENTED");
    }

    #[test]
    fn test_wire_names_round_trip() {
        for method in [Method::ScanBarcode, Method::GetPlatformVersion] {
            assert_eq!(Method::parse(method.name()), Ok(method));
        }
    }
}
