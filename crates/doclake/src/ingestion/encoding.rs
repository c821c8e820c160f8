//! Ordered-fallback text decoding
//!
//! Objects arrive without charset metadata, so bytes are decoded by trying a
//! BOM first, then each configured encoding strictly, then (optionally) a
//! lenient UTF-8 pass that replaces malformed sequences.
//!
//! The first candidate that decodes without error wins, which is not always
//! the encoding the bytes were written in. Shift_JIS text made only of
//! half-width katakana (single bytes 0xA1-0xDF) is also well-formed EUC-JP,
//! so with EUC-JP listed first it comes back as unrelated kanji labelled
//! EUC-JP. Put Shift_JIS first where such content is expected.

use encoding_rs::{Encoding, UTF_8};
use sha2::{Digest, Sha256};

use crate::config::EncodingConfig;
use crate::error::{Error, Result};

/// Label reported when the lenient pass was needed
pub const LENIENT_LABEL: &str = "lenient-utf-8";

/// How the text was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStrategy {
    /// Decoded without any malformed sequence
    Exact(&'static Encoding),
    /// UTF-8 with replacement characters
    LenientFallback,
}

impl DecodeStrategy {
    /// Name stored as `encoding_used`
    pub fn label(&self) -> &'static str {
        match self {
            DecodeStrategy::Exact(encoding) => encoding.name(),
            DecodeStrategy::LenientFallback => LENIENT_LABEL,
        }
    }
}

/// Decoded text and the strategy that produced it
#[derive(Debug, Clone)]
pub struct Decoded {
    pub text: String,
    pub strategy: DecodeStrategy,
}

impl Decoded {
    /// SHA-256 of the decoded text, hex encoded
    pub fn sha256(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.text.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Length in characters
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Tries a fixed, ordered list of encodings
#[derive(Debug, Clone)]
pub struct EncodingResolver {
    candidates: Vec<&'static Encoding>,
    lenient_fallback: bool,
}

impl EncodingResolver {
    /// Build from resolved encodings
    pub fn new(candidates: Vec<&'static Encoding>, lenient_fallback: bool) -> Self {
        Self {
            candidates,
            lenient_fallback,
        }
    }

    /// Build from configured labels
    pub fn from_config(config: &EncodingConfig) -> Result<Self> {
        let candidates = config
            .candidates
            .iter()
            .map(|label| {
                Encoding::for_label(label.as_bytes())
                    .ok_or_else(|| Error::Config(format!("Unknown encoding label: {}", label)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(candidates, config.lenient_fallback))
    }

    /// Candidate encodings in trial order
    pub fn candidates(&self) -> &[&'static Encoding] {
        &self.candidates
    }

    /// Decode bytes to text
    pub fn decode(&self, bytes: &[u8]) -> Result<Decoded> {
        if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
            if let Some(text) =
                encoding.decode_without_bom_handling_and_without_replacement(&bytes[bom_len..])
            {
                return Ok(Decoded {
                    text: text.into_owned(),
                    strategy: DecodeStrategy::Exact(encoding),
                });
            }
            tracing::debug!("{} BOM present but content is malformed", encoding.name());
        }

        for &encoding in &self.candidates {
            if let Some(text) = encoding.decode_without_bom_handling_and_without_replacement(bytes) {
                return Ok(Decoded {
                    text: text.into_owned(),
                    strategy: DecodeStrategy::Exact(encoding),
                });
            }
        }

        if self.lenient_fallback {
            let (text, _) = UTF_8.decode_without_bom_handling(bytes);
            return Ok(Decoded {
                text: text.into_owned(),
                strategy: DecodeStrategy::LenientFallback,
            });
        }

        Err(Error::DecodeExhausted {
            tried: self
                .candidates
                .iter()
                .map(|e| e.name())
                .collect::<Vec<_>>()
                .join(", "),
        })
    }
}

impl Default for EncodingResolver {
    fn default() -> Self {
        Self::new(
            vec![UTF_8, encoding_rs::EUC_JP, encoding_rs::SHIFT_JIS],
            true,
        )
    }
}

/// Longest prefix of `text` that fits in `max_bytes` without splitting a char
pub fn truncate_to_bytes(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoding_rs::{EUC_JP, SHIFT_JIS, UTF_16LE};

    const JAPANESE: &str = "こんにちは、世界。今日の会議の議事録です。";

    #[test]
    fn test_utf8() {
        let decoded = EncodingResolver::default().decode(JAPANESE.as_bytes()).unwrap();
        assert_eq!(decoded.text, JAPANESE);
        assert_eq!(decoded.strategy.label(), "UTF-8");
    }

    #[test]
    fn test_round_trip_legacy_encodings() {
        let resolver = EncodingResolver::default();
        for encoding in [EUC_JP, SHIFT_JIS] {
            let (bytes, _, had_errors) = encoding.encode(JAPANESE);
            assert!(!had_errors);
            let decoded = resolver.decode(&bytes).unwrap();
            assert_eq!(decoded.text, JAPANESE, "round trip through {}", encoding.name());
            assert_eq!(decoded.strategy, DecodeStrategy::Exact(encoding));
        }
    }

    #[test]
    fn test_bom_selects_encoding() {
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "hello".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        let decoded = EncodingResolver::default().decode(&bytes).unwrap();
        assert_eq!(decoded.text, "hello");
        assert_eq!(decoded.strategy, DecodeStrategy::Exact(UTF_16LE));
    }

    #[test]
    fn test_utf8_bom_is_stripped() {
        let bytes = [&[0xEF, 0xBB, 0xBF][..], b"plain"].concat();
        let decoded = EncodingResolver::default().decode(&bytes).unwrap();
        assert_eq!(decoded.text, "plain");
    }

    #[test]
    fn test_lenient_fallback() {
        let resolver = EncodingResolver::new(vec![UTF_8], true);
        let decoded = resolver.decode(&[b'o', b'k', 0xFF, b'!']).unwrap();
        assert_eq!(decoded.strategy, DecodeStrategy::LenientFallback);
        assert_eq!(decoded.strategy.label(), LENIENT_LABEL);
        assert_eq!(decoded.text, "ok\u{FFFD}!");
    }

    #[test]
    fn test_exhausted_without_fallback() {
        let resolver = EncodingResolver::new(vec![UTF_8], false);
        let err = resolver.decode(&[0xC3, 0x28, 0xFF]).unwrap_err();
        assert!(matches!(err, Error::DecodeExhausted { .. }));
    }

    #[test]
    fn test_from_config_rejects_unknown_label() {
        let config = EncodingConfig {
            candidates: vec!["not-a-charset".to_string()],
            lenient_fallback: true,
        };
        assert!(EncodingResolver::from_config(&config).is_err());
    }

    #[test]
    fn test_truncate_to_bytes() {
        assert_eq!(truncate_to_bytes("abc", 10), "abc");
        // "こ" is 3 bytes in UTF-8
        assert_eq!(truncate_to_bytes("ここ", 4), "こ");
        assert_eq!(truncate_to_bytes("ここ", 2), "");
    }

    #[test]
    fn test_sha256_stable() {
        let a = EncodingResolver::default().decode(b"same").unwrap();
        let b = EncodingResolver::default().decode(b"same").unwrap();
        assert_eq!(a.sha256(), b.sha256());
        assert_eq!(a.sha256().len(), 64);
    }

    #[test]
    fn test_halfwidth_katakana_shift_jis_reads_as_euc_jp() {
        let original = "ｱｲｳｴｵｶｷｸｹｺ";
        let (bytes, _, had_errors) = SHIFT_JIS.encode(original);
        assert!(!had_errors);

        let decoded = EncodingResolver::default().decode(&bytes).unwrap();
        assert_eq!(decoded.strategy, DecodeStrategy::Exact(EUC_JP));
        assert_ne!(decoded.text, original);

        let shift_jis_first = EncodingResolver::new(
            vec![UTF_8, SHIFT_JIS, EUC_JP],
            true,
        );
        let decoded = shift_jis_first.decode(&bytes).unwrap();
        assert_eq!(decoded.strategy, DecodeStrategy::Exact(SHIFT_JIS));
        assert_eq!(decoded.text, original);
    }
}
