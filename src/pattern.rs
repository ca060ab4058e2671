// pattern.rs — AOB pattern compiler.
//
// Turns a human-authored hex string like "48 8B ?? 10" into a compiled
// byte/mask sequence the scanner can match against raw module memory.
// Wildcard tokens ("??" or "?") match any byte.

use std::fmt;

use crate::error::{Error, Result};

/// A compiled AOB pattern: one entry per token, `None` meaning wildcard.
/// Always non-empty; token order is preserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    bytes: Vec<Option<u8>>,
}

impl Pattern {
    /// Compile a whitespace-separated token string. Each token is either two
    /// hex digits (case-insensitive) or a wildcard marker. Rejects empty
    /// input and malformed tokens as a configuration error.
    pub fn compile(text: &str) -> Result<Self> {
        let mut bytes = Vec::new();
        for token in text.split_whitespace() {
            if token == "??" || token == "?" {
                bytes.push(None);
                continue;
            }
            if token.len() != 2 {
                return Err(Error::ConfigInvalid(format!(
                    "AOB token '{token}' must be two hex digits or a wildcard"
                )));
            }
            let value = u8::from_str_radix(token, 16).map_err(|e| {
                Error::ConfigInvalid(format!("Invalid AOB token '{token}': {e}"))
            })?;
            bytes.push(Some(value));
        }

        if bytes.is_empty() {
            return Err(Error::ConfigInvalid("AOB pattern is empty".to_string()));
        }

        Ok(Pattern { bytes })
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// True when `window` (exactly pattern-length bytes) matches: every
    /// position is either a wildcard or equal to the window byte.
    pub fn matches(&self, window: &[u8]) -> bool {
        debug_assert_eq!(window.len(), self.bytes.len());
        self.bytes
            .iter()
            .zip(window)
            .all(|(p, b)| p.map_or(true, |v| v == *b))
    }

    pub fn as_slice(&self) -> &[Option<u8>] {
        &self.bytes
    }
}

impl fmt::Display for Pattern {
    /// Canonical rendering: upper-case hex, "??" wildcards, space-separated.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .bytes
            .iter()
            .map(|b| match b {
                Some(v) => format!("{v:02X}"),
                None => "??".to_string(),
            })
            .collect();
        write!(f, "{}", rendered.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_preserves_order_and_count() {
        let p = Pattern::compile("48 8b ?? 10").unwrap();
        assert_eq!(p.len(), 4);
        assert_eq!(
            p.as_slice(),
            &[Some(0x48), Some(0x8B), None, Some(0x10)]
        );
    }

    #[test]
    fn test_compile_default_pattern() {
        let p = Pattern::compile(crate::constants::DEFAULT_AOB_PATTERN).unwrap();
        assert_eq!(p.len(), 27);
        assert_eq!(p.as_slice()[0], Some(0x48));
        assert_eq!(p.as_slice()[26], Some(0xD2));
    }

    #[test]
    fn test_compile_rejects_bad_input() {
        assert!(Pattern::compile("").is_err());
        assert!(Pattern::compile("   ").is_err());
        assert!(Pattern::compile("4").is_err());
        assert!(Pattern::compile("488B").is_err());
        assert!(Pattern::compile("GG").is_err());
        assert!(Pattern::compile("48 8B ?Z").is_err());
    }

    #[test]
    fn test_display_roundtrip() {
        let p = Pattern::compile("48 8d 0d ?? ff").unwrap();
        assert_eq!(p.to_string(), "48 8D 0D ?? FF");
        assert_eq!(Pattern::compile(&p.to_string()).unwrap(), p);
    }
}
