//! Human-readable byte sizes for upload limits (`"512MB"`, `"1.5GB"`, `1048576`)

use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Invalid size format: {0}")]
    InvalidFormat(String),

    #[error("Invalid unit: {0}")]
    InvalidUnit(String),

    #[error("Size overflows u64: {0}")]
    Overflow(String),
}

const KIB: u64 = 1024;
const UNITS: &[(&str, u64)] = &[
    ("TB", KIB * KIB * KIB * KIB),
    ("GB", KIB * KIB * KIB),
    ("MB", KIB * KIB),
    ("KB", KIB),
];

/// Byte count that parses from and prints as a binary-unit string
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ByteSize(pub u64);

impl ByteSize {
    pub const fn mib(n: u64) -> Self {
        Self(n * KIB * KIB)
    }

    pub const fn gib(n: u64) -> Self {
        Self(n * KIB * KIB * KIB)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Whether `len` bytes fit inside this limit
    pub fn admits(&self, len: u64) -> bool {
        len <= self.0
    }

    /// Largest unit that keeps the integer part non-zero, one decimal at most
    pub fn to_human_readable(&self) -> String {
        for &(unit, divisor) in UNITS {
            if self.0 >= divisor {
                let whole = self.0 / divisor;
                let tenth = (self.0 % divisor) * 10 / divisor;
                return if tenth == 0 {
                    format!("{whole}{unit}")
                } else {
                    format!("{whole}.{tenth}{unit}")
                };
            }
        }
        format!("{}B", self.0)
    }
}

fn unit_multiplier(unit: &str) -> Option<u64> {
    match unit {
        "" | "B" => Some(1),
        "K" | "KB" | "KIB" => Some(KIB),
        "M" | "MB" | "MIB" => Some(KIB * KIB),
        "G" | "GB" | "GIB" => Some(KIB * KIB * KIB),
        "T" | "TB" | "TIB" => Some(KIB * KIB * KIB * KIB),
        _ => None,
    }
}

impl FromStr for ByteSize {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase();
        let split = normalized
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(normalized.len());
        let (number, unit) = normalized.split_at(split);

        if number.is_empty() {
            return Err(ParseError::InvalidFormat(s.to_string()));
        }

        let multiplier =
            unit_multiplier(unit.trim()).ok_or_else(|| ParseError::InvalidUnit(unit.to_string()))?;

        // "1.5GB": whole and fractional parts are scaled separately to stay in integers
        let (whole, fraction) = match number.split_once('.') {
            Some((whole, fraction)) => (whole, fraction),
            None => (number, ""),
        };
        if fraction.contains('.') || (whole.is_empty() && fraction.is_empty()) {
            return Err(ParseError::InvalidFormat(s.to_string()));
        }

        let whole: u64 = if whole.is_empty() {
            0
        } else {
            whole
                .parse()
                .map_err(|_| ParseError::InvalidFormat(s.to_string()))?
        };
        let mut total = whole
            .checked_mul(multiplier)
            .ok_or_else(|| ParseError::Overflow(s.to_string()))?;

        if !fraction.is_empty() {
            let digits = fraction.len().min(6) as u32;
            let numerator: u64 = fraction[..digits as usize]
                .parse()
                .map_err(|_| ParseError::InvalidFormat(s.to_string()))?;
            total += numerator * multiplier / 10u64.pow(digits);
        }

        Ok(ByteSize(total))
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_human_readable())
    }
}

impl Serialize for ByteSize {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_human_readable())
    }
}

impl<'de> Deserialize<'de> for ByteSize {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct ByteSizeVisitor;

        impl serde::de::Visitor<'_> for ByteSizeVisitor {
            type Value = ByteSize;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a byte size such as \"512MB\" or an integer byte count")
            }

            fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<Self::Value, E> {
                Ok(ByteSize(v))
            }

            fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<Self::Value, E> {
                u64::try_from(v)
                    .map(ByteSize)
                    .map_err(|_| E::custom("byte size cannot be negative"))
            }

            fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Self::Value, E> {
                v.parse::<ByteSize>().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(ByteSizeVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_and_units() {
        assert_eq!("2048".parse::<ByteSize>().unwrap(), ByteSize(2048));
        assert_eq!("4k".parse::<ByteSize>().unwrap(), ByteSize(4 * 1024));
        assert_eq!("512MB".parse::<ByteSize>().unwrap(), ByteSize::mib(512));
        assert_eq!(" 2 GiB ".parse::<ByteSize>().unwrap(), ByteSize::gib(2));
    }

    #[test]
    fn test_parse_fractional() {
        assert_eq!(
            "1.5GB".parse::<ByteSize>().unwrap(),
            ByteSize(3 * 512 * 1024 * 1024)
        );
        assert_eq!("0.5KB".parse::<ByteSize>().unwrap(), ByteSize(512));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            "MB".parse::<ByteSize>(),
            Err(ParseError::InvalidFormat(_))
        ));
        assert!(matches!(
            "12 parsecs".parse::<ByteSize>(),
            Err(ParseError::InvalidUnit(_))
        ));
        assert!(matches!(
            "1.2.3MB".parse::<ByteSize>(),
            Err(ParseError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_human_readable() {
        assert_eq!(ByteSize(900).to_human_readable(), "900B");
        assert_eq!(ByteSize::mib(20).to_human_readable(), "20MB");
        assert_eq!(ByteSize(3 * 512 * 1024 * 1024).to_human_readable(), "1.5GB");
    }

    #[test]
    fn test_admits() {
        let limit = ByteSize::mib(1);
        assert!(limit.admits(1024 * 1024));
        assert!(!limit.admits(1024 * 1024 + 1));
    }

    #[test]
    fn test_serde_string_and_number() {
        #[derive(Deserialize, Serialize)]
        struct Limits {
            archive: ByteSize,
            page: ByteSize,
        }
        let parsed: Limits = serde_json::from_str(r#"{"archive": "1GB", "page": 4096}"#).unwrap();
        assert_eq!(parsed.archive, ByteSize::gib(1));
        assert_eq!(parsed.page, ByteSize(4096));

        let json = serde_json::to_value(&parsed).unwrap();
        assert_eq!(json["archive"], "1GB");
        assert_eq!(json["page"], "4KB");
    }
}
