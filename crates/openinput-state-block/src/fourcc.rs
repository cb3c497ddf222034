//! Four-character type codes.

use std::fmt;

/// A four-character code packed into a `u32`.
///
/// Used as the type tag for state formats and event records. The first
/// character occupies the most significant byte, so `FourCC::new(*b"STAT")`
/// compares equal to the integer `0x53544154`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct FourCC(u32);

impl FourCC {
    /// Pack four ASCII bytes, first byte most significant.
    pub const fn new(code: [u8; 4]) -> Self {
        Self(
            ((code[0] as u32) << 24)
                | ((code[1] as u32) << 16)
                | ((code[2] as u32) << 8)
                | (code[3] as u32),
        )
    }

    /// Wrap a raw packed value.
    pub const fn from_u32(value: u32) -> Self {
        Self(value)
    }

    /// The raw packed value.
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// The four characters, first character first.
    pub const fn as_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.as_bytes();
        match std::str::from_utf8(&bytes) {
            Ok(s) => f.write_str(s),
            Err(_) => write!(f, "{:#010x}", self.0),
        }
    }
}

impl fmt::Debug for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCC({self})")
    }
}

impl From<u32> for FourCC {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<FourCC> for u32 {
    fn from(value: FourCC) -> Self {
        value.0
    }
}

// Serialized as the four-character string so layouts and cached descriptors
// stay human-readable on disk.
impl serde::Serialize for FourCC {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let bytes = self.as_bytes();
        match std::str::from_utf8(&bytes) {
            Ok(s) => serializer.serialize_str(s),
            Err(_) => serializer.serialize_u32(self.0),
        }
    }
}

impl<'de> serde::Deserialize<'de> for FourCC {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct Visitor;

        impl serde::de::Visitor<'_> for Visitor {
            type Value = FourCC;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a string of up to four ASCII characters or a u32")
            }

            fn visit_str<E>(self, value: &str) -> Result<FourCC, E>
            where
                E: serde::de::Error,
            {
                let raw = value.as_bytes();
                if raw.is_empty() || raw.len() > 4 || !raw.is_ascii() {
                    return Err(E::custom(format!("invalid four-character code '{value}'")));
                }
                let mut code = [b' '; 4];
                code[..raw.len()].copy_from_slice(raw);
                Ok(FourCC::new(code))
            }

            fn visit_u32<E>(self, value: u32) -> Result<FourCC, E>
            where
                E: serde::de::Error,
            {
                Ok(FourCC::from_u32(value))
            }

            fn visit_u64<E>(self, value: u64) -> Result<FourCC, E>
            where
                E: serde::de::Error,
            {
                u32::try_from(value)
                    .map(FourCC::from_u32)
                    .map_err(|_| E::custom("four-character code out of u32 range"))
            }
        }

        deserializer.deserialize_any(Visitor)
    }
}
