// Corpora and analyzer outputs with known diff results

#![allow(dead_code)]

/// Two analyzer runs over "THIS IS" that disagree on the second token's surface
pub const THIS_IS_TOKENS: &str = "THIS\nIS\nEOS\n";
pub const THIS_ARE_TOKENS: &str = "THIS\nARE\nEOS\n";

/// A corpus with three hyphenated words across several lines
pub const HYPHEN_CORPUS: &str = "The ice-cream truck came early today.\n\
Nobody expected a well-known guest at the party.\n\
Plain sentences stay identical across runs.\n\
Children ran after the truck for a long while.\n\
A self-made sign hung on the door.\n\
The end.\n";

pub const HYPHEN_COUNT: usize = 3;

/// A corpus without hyphens, tokenized identically by every fake analyzer mode
pub const PLAIN_CORPUS: &str = "One sentence here.\nAnother sentence there.\nAnd a third one.\n";

/// Analyzer output for the Japanese sentence 行く, differing only in reading
pub const IKU_LEFT: &str = "行く\t行く\tイク\t動詞\t一般\t*\t*\t五段-カ行\t終止形-一般\nEOS\n";
pub const IKU_RIGHT: &str = "行く\t行く\tユク\t動詞\t一般\t*\t*\t五段-カ行\t終止形-一般\nEOS\n";
