use std::collections::BTreeMap;

use serde::Serialize;

pub const KNOWN_KEYS: [&str; 9] = [
    "Title",
    "Author",
    "Subject",
    "Keywords",
    "Producer",
    "Creator",
    "CreationDate",
    "ModDate",
    "Trapped",
];

// Byte-order marks as decoded text, plus their Latin-1 misreadings.
const BOM_PREFIXES: [&str; 4] = ["\u{FEFF}", "\u{FFFE}", "\u{FE}\u{FF}", "\u{FF}\u{FE}"];

/// Sanitized document-information fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Metadata(BTreeMap<String, String>);

impl Metadata {
    pub fn from_raw(raw: BTreeMap<String, String>) -> Self {
        Self(sanitize(raw))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn title(&self) -> Option<&str> {
        self.get("Title")
    }

    pub fn author(&self) -> Option<&str> {
        self.get("Author")
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Standard fields in [`KNOWN_KEYS`] order, then any custom fields sorted
    /// by key.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        let known = KNOWN_KEYS
            .iter()
            .filter_map(|key| self.0.get_key_value(*key));
        let custom = self
            .0
            .iter()
            .filter(|(key, _)| !KNOWN_KEYS.contains(&key.as_str()));
        known
            .chain(custom)
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }
}

pub fn sanitize(raw: BTreeMap<String, String>) -> BTreeMap<String, String> {
    raw.into_iter()
        .map(|(key, value)| (key, sanitize_value(&value)))
        .collect()
}

/// Drops NUL characters, then any run of leading byte-order marks.
///
/// NULs go first so that removing them can never expose a new leading mark,
/// which keeps the transform idempotent.
pub fn sanitize_value(value: &str) -> String {
    let without_nul: String = value.chars().filter(|ch| *ch != '\0').collect();

    let mut rest = without_nul.as_str();
    while let Some(stripped) = BOM_PREFIXES
        .iter()
        .find_map(|prefix| rest.strip_prefix(*prefix))
    {
        rest = stripped;
    }

    rest.to_string()
}

/// Decodes a PDF text string: UTF-16BE when it starts with `FE FF`, otherwise
/// PDFDocEncoding read as Latin-1. The UTF-16 mark is kept as `U+FEFF` and left
/// for [`sanitize_value`].
pub fn decode_text_string(bytes: &[u8]) -> String {
    if bytes.starts_with(&[0xFE, 0xFF]) {
        let units = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]));
        return char::decode_utf16(units)
            .map(|unit| unit.unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect();
    }

    bytes.iter().map(|byte| char::from(*byte)).collect()
}
