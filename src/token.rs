use serde::Serialize;

/// Number of fields in an analyzer token record
pub const FIELD_COUNT: usize = 9;

/// Display names of the mismatch levels, indexed by field
pub const LEVEL_NAMES: [&str; FIELD_COUNT] = [
    "Surface",
    "Normalized Form",
    "Reading",
    "POS1",
    "POS2",
    "POS3",
    "POS4",
    "POS5",
    "POS6",
];

/// One morpheme as printed by the analyzer: surface, normalized form,
/// reading and six part-of-speech levels, in that order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct AnnotatedToken {
    fields: [String; FIELD_COUNT],
}

impl AnnotatedToken {
    pub fn new(fields: [String; FIELD_COUNT]) -> Self {
        Self { fields }
    }

    /// The sentence terminator token
    pub fn eos() -> Self {
        let mut fields: [String; FIELD_COUNT] = Default::default();
        fields[0] = "EOS".to_string();
        Self { fields }
    }

    /// Parse one tab-separated record. Missing fields are left empty and
    /// the ninth field keeps any further tabs.
    pub fn parse(line: &str) -> Self {
        let mut fields: [String; FIELD_COUNT] = Default::default();
        for (slot, part) in fields.iter_mut().zip(line.splitn(FIELD_COUNT, '\t')) {
            *slot = part.to_string();
        }
        Self { fields }
    }

    pub fn surface(&self) -> &str {
        &self.fields[0]
    }

    /// Field at `level` (0..9); out of range levels read as empty
    pub fn field(&self, level: usize) -> &str {
        self.fields.get(level).map(String::as_str).unwrap_or("")
    }

    pub fn is_eos(&self) -> bool {
        self.fields[0] == "EOS" && self.fields[1..].iter().all(String::is_empty)
    }

    /// Surface length in characters, the unit the aligner synchronises on
    pub fn surface_len(&self) -> usize {
        self.fields[0].chars().count()
    }

    /// Index of the first differing field, `None` if the tokens are equal
    pub fn diff_level(&self, other: &AnnotatedToken) -> Option<usize> {
        self.fields
            .iter()
            .zip(other.fields.iter())
            .position(|(a, b)| a != b)
    }
}

/// Parse a materialized sentence into tokens terminated by [`AnnotatedToken::eos`]
pub fn parse_sentence(text: &str) -> Vec<AnnotatedToken> {
    let mut tokens: Vec<AnnotatedToken> = text
        .lines()
        .filter(|line| !line.trim().is_empty() && *line != "EOS")
        .map(AnnotatedToken::parse)
        .collect();
    tokens.push(AnnotatedToken::eos());
    tokens
}

#[cfg(test)]
pub(crate) fn uniform(value: &str) -> AnnotatedToken {
    AnnotatedToken::new(std::array::from_fn(|_| value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_record() {
        let token = AnnotatedToken::parse("東京\t東京\tトウキョウ\t名詞\t固有名詞\t地名\t一般\t*\t*");
        assert_eq!(token.surface(), "東京");
        assert_eq!(token.field(2), "トウキョウ");
        assert_eq!(token.field(8), "*");
        assert_eq!(token.surface_len(), 2);
    }

    #[test]
    fn test_parse_short_record_pads_with_empty() {
        let token = AnnotatedToken::parse("THIS\tIS");
        assert_eq!(token.field(0), "THIS");
        assert_eq!(token.field(1), "IS");
        assert_eq!(token.field(5), "");
    }

    #[test]
    fn test_diff_level_reports_first_field() {
        let a = AnnotatedToken::parse("a\tb\tc\td\te\tf\tg\th\ti");
        let b = AnnotatedToken::parse("a\tb\tc\td\tX\tf\tg\th\tY");
        assert_eq!(a.diff_level(&b), Some(4));
        assert_eq!(a.diff_level(&a.clone()), None);
        assert_eq!(uniform("x").diff_level(&uniform("y")), Some(0));
    }

    #[test]
    fn test_parse_sentence_appends_eos() {
        let tokens = parse_sentence("THIS\tIS\nARE\n\nEOS\n");
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[1].surface(), "ARE");
        assert!(tokens[2].is_eos());
        assert!(!tokens[0].is_eos());
    }
}
