//! Query text normalization shared by the matcher and the extractor.

use unicode_normalization::UnicodeNormalization;

/// Normalize for matching: NFKC (folds full-width forms), lowercase, trim.
#[inline]
pub fn normalize(text: &str) -> String {
    text.nfkc().collect::<String>().to_lowercase().trim().to_string()
}

/// Length in Unicode scalar values, so a CJK term weighs per character.
#[inline]
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_full_width_and_case() {
        assert_eq!(normalize("  ＢＯＭ库存 "), "bom库存");
        assert_eq!(normalize("IQC"), "iqc");
    }

    #[test]
    fn counts_characters_not_bytes() {
        assert_eq!(char_len("深圳"), 2);
        assert_eq!(char_len("iqc"), 3);
    }
}
