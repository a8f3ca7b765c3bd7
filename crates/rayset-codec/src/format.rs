//! Format tags and extension mapping.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// A supported ray file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RayFormat {
    /// Zemax binary source file (`.dat`).
    ZemaxBinary,
    /// TracePro binary ray file (`.tpr`).
    TraceProBinary,
    /// Plain ASCII text (`.txt`); output target and diagnostic input.
    AsciiText,
    /// TracePro-importable ASCII (`.dat`); output target only.
    TraceProAscii,
}

impl RayFormat {
    /// Short lowercase tag used on the command line.
    pub fn tag(self) -> &'static str {
        match self {
            RayFormat::ZemaxBinary => "zemax",
            RayFormat::TraceProBinary => "tracepro",
            RayFormat::AsciiText => "ascii",
            RayFormat::TraceProAscii => "tracepro-ascii",
        }
    }

    /// Parse a command-line tag. Accepts the canonical tags plus a couple
    /// of obvious aliases.
    pub fn from_tag(tag: &str) -> Option<RayFormat> {
        match tag.to_ascii_lowercase().as_str() {
            "zemax" | "dat" => Some(RayFormat::ZemaxBinary),
            "tracepro" | "tpr" => Some(RayFormat::TraceProBinary),
            "ascii" | "txt" | "text" => Some(RayFormat::AsciiText),
            "tracepro-ascii" => Some(RayFormat::TraceProAscii),
            _ => None,
        }
    }

    /// Infer a format from a file extension.
    ///
    /// `.dat` maps to Zemax binary; the TracePro ASCII flavor also uses
    /// `.dat` in the wild and must be requested explicitly.
    pub fn from_extension(path: &Path) -> Option<RayFormat> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "dat" => Some(RayFormat::ZemaxBinary),
            "tpr" => Some(RayFormat::TraceProBinary),
            "txt" => Some(RayFormat::AsciiText),
            _ => None,
        }
    }

    /// Whether this format can be used as a decode source.
    pub fn supports_decode(self) -> bool {
        !matches!(self, RayFormat::TraceProAscii)
    }
}

impl fmt::Display for RayFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RayFormat::ZemaxBinary => "Zemax binary",
            RayFormat::TraceProBinary => "TracePro binary",
            RayFormat::AsciiText => "ASCII text",
            RayFormat::TraceProAscii => "TracePro ASCII",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_roundtrip() {
        for format in [
            RayFormat::ZemaxBinary,
            RayFormat::TraceProBinary,
            RayFormat::AsciiText,
            RayFormat::TraceProAscii,
        ] {
            assert_eq!(RayFormat::from_tag(format.tag()), Some(format));
        }
        assert_eq!(RayFormat::from_tag("step"), None);
    }

    #[test]
    fn test_from_extension() {
        assert_eq!(
            RayFormat::from_extension(Path::new("source.DAT")),
            Some(RayFormat::ZemaxBinary)
        );
        assert_eq!(
            RayFormat::from_extension(Path::new("out.tpr")),
            Some(RayFormat::TraceProBinary)
        );
        assert_eq!(
            RayFormat::from_extension(Path::new("rays.txt")),
            Some(RayFormat::AsciiText)
        );
        assert_eq!(RayFormat::from_extension(Path::new("rays")), None);
        assert_eq!(RayFormat::from_extension(Path::new("mesh.stl")), None);
    }

    #[test]
    fn test_decode_support() {
        assert!(RayFormat::ZemaxBinary.supports_decode());
        assert!(RayFormat::TraceProBinary.supports_decode());
        assert!(RayFormat::AsciiText.supports_decode());
        assert!(!RayFormat::TraceProAscii.supports_decode());
    }
}
