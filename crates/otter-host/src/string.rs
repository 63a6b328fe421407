//! UTF-16 host strings

use std::fmt;
use std::rc::Rc;

/// An immutable host string stored as UTF-16 code units.
///
/// Unpaired surrogates are representable; conversion to UTF-8 is lossy
/// through [`JsString::to_string_lossy`] and checked through
/// [`JsString::to_utf8`].
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JsString(Rc<[u16]>);

impl JsString {
    /// Encode a Rust string.
    pub fn new(s: &str) -> Self {
        Self(s.encode_utf16().collect::<Vec<_>>().into())
    }

    /// Take ownership of raw code units.
    pub fn from_utf16(units: Vec<u16>) -> Self {
        Self(units.into())
    }

    /// Widen each byte to one code unit (Latin-1 interpretation).
    pub fn from_latin1(bytes: &[u8]) -> Self {
        Self(bytes.iter().map(|&b| b as u16).collect::<Vec<_>>().into())
    }

    /// Raw code units.
    pub fn as_utf16(&self) -> &[u16] {
        &self.0
    }

    /// Length in code units.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the string is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Decode to UTF-8, failing on unpaired surrogates.
    pub fn to_utf8(&self) -> Result<String, std::string::FromUtf16Error> {
        String::from_utf16(&self.0)
    }

    /// Decode to UTF-8, replacing unpaired surrogates.
    pub fn to_string_lossy(&self) -> String {
        String::from_utf16_lossy(&self.0)
    }

    /// Parse as a canonical array index (`"0"`, `"17"`, never `"01"`).
    pub fn as_array_index(&self) -> Option<u32> {
        let units = &self.0;
        if units.is_empty() || units.len() > 10 {
            return None;
        }
        if units.len() > 1 && units[0] == b'0' as u16 {
            return None;
        }
        let mut n: u64 = 0;
        for &u in units.iter() {
            if !(b'0' as u16..=b'9' as u16).contains(&u) {
                return None;
            }
            n = n * 10 + (u - b'0' as u16) as u64;
        }
        // 2^32 - 1 is not an array index
        if n >= u32::MAX as u64 {
            return None;
        }
        Some(n as u32)
    }

    /// Concatenate two strings.
    pub fn concat(&self, other: &JsString) -> JsString {
        let mut units = Vec::with_capacity(self.len() + other.len());
        units.extend_from_slice(&self.0);
        units.extend_from_slice(&other.0);
        Self::from_utf16(units)
    }
}

impl From<&str> for JsString {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for JsString {
    fn from(s: String) -> Self {
        Self::new(&s)
    }
}

impl PartialEq<str> for JsString {
    fn eq(&self, other: &str) -> bool {
        self.0.iter().copied().eq(other.encode_utf16())
    }
}

impl PartialEq<&str> for JsString {
    fn eq(&self, other: &&str) -> bool {
        self == *other
    }
}

impl fmt::Display for JsString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

impl fmt::Debug for JsString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.to_string_lossy())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_array_index_parsing() {
        assert_eq!(JsString::new("0").as_array_index(), Some(0));
        assert_eq!(JsString::new("42").as_array_index(), Some(42));
        assert_eq!(JsString::new("042").as_array_index(), None);
        assert_eq!(JsString::new("-1").as_array_index(), None);
        assert_eq!(JsString::new("4294967295").as_array_index(), None);
        assert_eq!(JsString::new("length").as_array_index(), None);
    }

    #[test]
    fn test_unpaired_surrogate_is_preserved() {
        let s = JsString::from_utf16(vec![0x61, 0xD800]);
        assert_eq!(s.len(), 2);
        assert!(s.to_utf8().is_err());
        assert_eq!(s.to_string_lossy(), "a\u{FFFD}");
    }

    #[test]
    fn test_latin1_widening() {
        let s = JsString::from_latin1(&[0x68, 0xE9]);
        assert_eq!(s.as_utf16(), &[0x68, 0xE9]);
        assert_eq!(s, "hé");
    }
}
