#![warn(missing_docs)]
//! `folio-lang` - data-driven language profiles for folio's analysis services.
//!
//! This crate stays dependency free. It provides small, static tables (stop words, sentence
//! terminators, quote pairs) that analyzers look up by language code.

/// Stop words and punctuation conventions for one language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LanguageProfile {
    /// BCP 47 primary language subtag (e.g. `en`, `pl`).
    pub code: &'static str,
    /// Human readable name.
    pub name: &'static str,
    /// Lowercase words that carry little meaning on their own.
    pub stop_words: &'static [&'static str],
    /// Characters that end a sentence.
    pub sentence_terminators: &'static [char],
    /// Opening and closing quotation marks.
    pub quote_pairs: &'static [(char, char)],
}

impl LanguageProfile {
    /// Returns `true` if `word` is a stop word. Comparison ignores case.
    pub fn is_stop_word(&self, word: &str) -> bool {
        let lower = word.to_lowercase();
        self.stop_words.contains(&lower.as_str())
    }

    /// Returns `true` if `ch` ends a sentence.
    pub fn is_sentence_terminator(&self, ch: char) -> bool {
        self.sentence_terminators.contains(&ch)
    }
}

const ENGLISH_STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by", "from",
    "as", "is", "was", "are", "were", "been", "be", "have", "has", "had", "do", "does", "did",
    "will", "would", "could", "should", "may", "might", "must", "shall", "can", "need", "it",
    "its", "this", "that", "these", "those", "i", "you", "he", "she", "we", "they", "me", "him",
    "her", "us", "them", "my", "your", "his", "our", "their", "what", "which", "who", "whom",
    "whose", "where", "when", "why", "how", "all", "each", "every", "both", "few", "more", "most",
    "other", "some", "such", "no", "not", "only", "same", "so", "than", "too", "very", "just",
    "also", "now", "here", "there", "then", "if", "about", "into", "through", "during", "before",
    "after", "above", "below", "between", "under", "again", "once", "any", "because", "being",
    "down", "further", "herself", "himself", "itself", "myself", "ourselves", "themselves",
    "yourself", "yourselves", "off", "out", "over", "own", "up", "while", "against", "am",
    "aren", "couldn", "didn", "doesn", "don", "hadn", "hasn", "haven", "isn", "ll", "mightn",
    "mustn", "needn", "shan", "shouldn", "ve", "wasn", "weren", "won", "wouldn", "s", "t", "d",
    "m", "re",
];

const POLISH_STOP_WORDS: &[&str] = &[
    "i", "w", "z", "na", "do", "o", "ze", "że", "to", "nie", "się", "co", "jak", "ale", "po",
    "tak", "za", "od", "już", "czy", "gdy", "go", "je", "jego", "jej", "ich", "tylko", "lub",
    "przez", "przy", "tym", "oraz", "ten", "ta", "te", "tej", "tego", "tych", "być", "jest",
    "są", "był", "była", "było", "będzie", "a", "jako", "też", "więc", "aby", "jednak", "może",
    "można", "mi", "mnie", "my", "nas", "ty", "ci", "wy", "was", "on", "ona", "ono", "oni",
    "one", "sobie", "siebie", "bo", "gdyż", "ponieważ", "który", "która", "które", "którzy", "u",
    "bardzo", "bez", "dla", "jeszcze", "kiedy", "niech", "pod", "przed", "nad", "między",
    "razem", "wszystko", "nic", "kto", "nigdy", "zawsze", "teraz", "tutaj", "tam", "wszyscy",
    "każdy", "każda", "swój", "swoja", "swoje", "twój", "twoja", "twoje",
];

/// English.
pub const ENGLISH: LanguageProfile = LanguageProfile {
    code: "en",
    name: "English",
    stop_words: ENGLISH_STOP_WORDS,
    sentence_terminators: &['.', '!', '?', '…'],
    quote_pairs: &[('"', '"'), ('\u{201C}', '\u{201D}'), ('\u{2018}', '\u{2019}')],
};

/// Polish.
pub const POLISH: LanguageProfile = LanguageProfile {
    code: "pl",
    name: "Polski",
    stop_words: POLISH_STOP_WORDS,
    sentence_terminators: &['.', '!', '?', '…'],
    quote_pairs: &[('\u{201E}', '\u{201D}'), ('\u{00AB}', '\u{00BB}')],
};

/// Every bundled profile.
pub const PROFILES: &[LanguageProfile] = &[ENGLISH, POLISH];

/// Look up a profile by code. Region subtags are ignored, so `en-US` finds English.
pub fn profile(code: &str) -> Option<&'static LanguageProfile> {
    let primary = code.split(['-', '_']).next().unwrap_or(code);
    PROFILES.iter().find(|p| p.code.eq_ignore_ascii_case(primary))
}

/// Like [`profile`], falling back to English for unknown codes.
pub fn profile_or_default(code: &str) -> &'static LanguageProfile {
    profile(code).unwrap_or(&PROFILES[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_ignores_region_and_case() {
        assert_eq!(profile("en-US").map(|p| p.code), Some("en"));
        assert_eq!(profile("PL").map(|p| p.name), Some("Polski"));
        assert!(profile("xx").is_none());
        assert_eq!(profile_or_default("xx").code, "en");
    }

    #[test]
    fn test_stop_words() {
        assert!(ENGLISH.is_stop_word("The"));
        assert!(!ENGLISH.is_stop_word("whale"));
        assert!(POLISH.is_stop_word("Się"));
        assert!(ENGLISH.is_sentence_terminator('?'));
        assert!(!ENGLISH.is_sentence_terminator(','));
    }
}
