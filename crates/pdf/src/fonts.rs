//! Fonts used when writing appearance streams.
//!
//! Nothing is embedded: Latin text uses the standard 14 Type1 fonts with
//! WinAnsiEncoding, and CJK text uses a predefined Adobe CID collection that
//! every conforming reader ships. Which one is used for a given annotation is
//! decided by an ordered [`FontChain`].

use lopdf::{dictionary, Dictionary, Document, Object};
use serde::{Deserialize, Serialize};

use crate::PdfError;

// ---------------------------------------------------------------------------
// WinAnsiEncoding
// ---------------------------------------------------------------------------

/// Code points for bytes 0x80..=0x9F; `None` marks unassigned slots.
const WIN_ANSI_HIGH: [Option<char>; 32] = [
    Some('\u{20AC}'),
    None,
    Some('\u{201A}'),
    Some('\u{0192}'),
    Some('\u{201E}'),
    Some('\u{2026}'),
    Some('\u{2020}'),
    Some('\u{2021}'),
    Some('\u{02C6}'),
    Some('\u{2030}'),
    Some('\u{0160}'),
    Some('\u{2039}'),
    Some('\u{0152}'),
    None,
    Some('\u{017D}'),
    None,
    None,
    Some('\u{2018}'),
    Some('\u{2019}'),
    Some('\u{201C}'),
    Some('\u{201D}'),
    Some('\u{2022}'),
    Some('\u{2013}'),
    Some('\u{2014}'),
    Some('\u{02DC}'),
    Some('\u{2122}'),
    Some('\u{0161}'),
    Some('\u{203A}'),
    Some('\u{0153}'),
    None,
    Some('\u{017E}'),
    Some('\u{0178}'),
];

/// Decode bytes shown with a WinAnsiEncoding font.
pub fn decode_win_ansi(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| match b {
            0x80..=0x9F => WIN_ANSI_HIGH[usize::from(b - 0x80)].unwrap_or(b as char),
            _ => b as char,
        })
        .collect()
}

/// The WinAnsi byte for `c`, if it has one.
pub fn win_ansi_byte(c: char) -> Option<u8> {
    match c as u32 {
        0x20..=0x7E | 0xA0..=0xFF => Some(c as u8),
        _ => WIN_ANSI_HIGH
            .iter()
            .position(|&slot| slot == Some(c))
            .map(|i| 0x80 + i as u8),
    }
}

// ---------------------------------------------------------------------------
// Font sources
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum FontSource {
    /// One of the standard 14 Type1 fonts.
    Standard {
        family: String,
        base_font: String,
        bold_base_font: String,
    },
    /// A non-embedded CIDFontType0 from a predefined Adobe character
    /// collection, wrapped in a Type0 font.
    Cjk {
        family: String,
        base_font: String,
        ordering: String,
        supplement: i64,
        /// A predefined UCS-2 CMap such as `UniKS-UCS2-H`.
        encoding: String,
    },
}

impl FontSource {
    pub fn standard(family: &str, base_font: &str, bold_base_font: &str) -> Self {
        FontSource::Standard {
            family: family.to_string(),
            base_font: base_font.to_string(),
            bold_base_font: bold_base_font.to_string(),
        }
    }

    pub fn family(&self) -> &str {
        match self {
            FontSource::Standard { family, .. } | FontSource::Cjk { family, .. } => family,
        }
    }

    /// Whether every character of `text` can be shown with this font.
    pub fn supports(&self, text: &str) -> bool {
        match self {
            FontSource::Standard { .. } => text.chars().all(|c| win_ansi_byte(c).is_some()),
            FontSource::Cjk { .. } => text.chars().all(|c| (c as u32) <= 0xFFFF),
        }
    }

    /// Bytes for a string operand shown with this font. Unencodable
    /// characters become `?`.
    pub fn encode(&self, text: &str) -> Vec<u8> {
        match self {
            FontSource::Standard { .. } => text
                .chars()
                .map(|c| win_ansi_byte(c).unwrap_or(b'?'))
                .collect(),
            FontSource::Cjk { .. } => text
                .chars()
                .map(|c| if (c as u32) <= 0xFFFF { c as u16 } else { u16::from(b'?') })
                .flat_map(u16::to_be_bytes)
                .collect(),
        }
    }

    /// The font resource dictionary. CJK fonts add their descriptor to `doc`.
    pub fn font_dictionary(&self, doc: &mut Document, bold: bool) -> Dictionary {
        match self {
            FontSource::Standard {
                base_font,
                bold_base_font,
                ..
            } => {
                let name = if bold { bold_base_font } else { base_font };
                dictionary! {
                    "Type" => "Font",
                    "Subtype" => "Type1",
                    "BaseFont" => Object::Name(name.as_bytes().to_vec()),
                    "Encoding" => "WinAnsiEncoding",
                }
            }
            FontSource::Cjk {
                base_font,
                ordering,
                supplement,
                encoding,
                ..
            } => {
                let cid_name = if bold {
                    format!("{},Bold", base_font)
                } else {
                    base_font.clone()
                };
                let descriptor_id = doc.add_object(dictionary! {
                    "Type" => "FontDescriptor",
                    "FontName" => Object::Name(cid_name.as_bytes().to_vec()),
                    "Flags" => 4,
                    "FontBBox" => vec![0.into(), Object::Integer(-148), 1000.into(), 880.into()],
                    "ItalicAngle" => 0,
                    "Ascent" => 880,
                    "Descent" => -120,
                    "CapHeight" => 880,
                    "StemV" => if bold { 160 } else { 93 },
                });
                let descendant = dictionary! {
                    "Type" => "Font",
                    "Subtype" => "CIDFontType0",
                    "BaseFont" => Object::Name(cid_name.as_bytes().to_vec()),
                    "CIDSystemInfo" => dictionary! {
                        "Registry" => Object::string_literal("Adobe"),
                        "Ordering" => Object::string_literal(ordering.as_str()),
                        "Supplement" => *supplement,
                    },
                    "FontDescriptor" => descriptor_id,
                    "DW" => 1000,
                };
                dictionary! {
                    "Type" => "Font",
                    "Subtype" => "Type0",
                    "BaseFont" => Object::Name(format!("{}-{}", cid_name, encoding).into_bytes()),
                    "Encoding" => Object::Name(encoding.as_bytes().to_vec()),
                    "DescendantFonts" => vec![Object::Dictionary(descendant)],
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Fallback chain
// ---------------------------------------------------------------------------

/// Ordered font candidates plus the two families tried when the requested
/// one is missing or cannot show the text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FontChain {
    pub candidates: Vec<FontSource>,
    pub cjk_fallback: String,
    pub universal_fallback: String,
}

impl Default for FontChain {
    fn default() -> Self {
        let korean = FontSource::Cjk {
            family: crate::types::DEFAULT_FONT_FAMILY.to_string(),
            base_font: "HYGoThic-Medium".to_string(),
            ordering: "Korea1".to_string(),
            supplement: 2,
            encoding: "UniKS-UCS2-H".to_string(),
        };
        Self {
            candidates: vec![
                FontSource::standard("Helvetica", "Helvetica", "Helvetica-Bold"),
                FontSource::standard("Arial", "Helvetica", "Helvetica-Bold"),
                FontSource::standard("Times", "Times-Roman", "Times-Bold"),
                FontSource::standard("Times New Roman", "Times-Roman", "Times-Bold"),
                FontSource::standard("Courier", "Courier", "Courier-Bold"),
                FontSource::standard("Courier New", "Courier", "Courier-Bold"),
                korean,
            ],
            cjk_fallback: crate::types::DEFAULT_FONT_FAMILY.to_string(),
            universal_fallback: "Helvetica".to_string(),
        }
    }
}

impl FontChain {
    /// Case-insensitive lookup by family name.
    pub fn find(&self, family: &str) -> Option<&FontSource> {
        self.candidates
            .iter()
            .find(|c| c.family().eq_ignore_ascii_case(family.trim()))
    }

    /// Pick the font for `text` requested as `family`: the family itself if
    /// it can show the text, then the CJK fallback, then the universal
    /// fallback (used even if it has to substitute characters).
    pub fn resolve(&self, family: &str, text: &str) -> Result<&FontSource, PdfError> {
        for name in [family, self.cjk_fallback.as_str()] {
            if let Some(source) = self.find(name).filter(|s| s.supports(text)) {
                return Ok(source);
            }
        }

        match self.find(&self.universal_fallback) {
            Some(source) => {
                if !source.supports(text) {
                    log::warn!(
                        "no font in the chain can show {:?}; using {} with substitutions",
                        text,
                        source.family()
                    );
                }
                Ok(source)
            }
            None => Err(PdfError::FontUnavailable(format!(
                "{} (fallbacks {} and {} are not configured)",
                family, self.cjk_fallback, self.universal_fallback
            ))),
        }
    }
}
