use tantivy::tokenizer::{
    Language, LowerCaser, RemoveLongFilter, SimpleTokenizer, Stemmer, StopWordFilter, TextAnalyzer, TokenStream,
};

use vaultdb_core::traits::TextTokenizer;

/// English stopwords; `s` and `t` catch the halves of possessives and contractions.
pub const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "he", "in", "is", "it", "its", "of", "on",
    "that", "the", "to", "was", "will", "with", "or", "but", "not", "this", "these", "they", "them", "their", "there",
    "then", "than", "so", "if", "when", "where", "why", "how", "what", "which", "who", "whom", "whose", "can", "could",
    "should", "would", "may", "might", "must", "shall", "do", "does", "did", "have", "had", "having", "s", "t",
];

const MAX_TOKEN_LEN: usize = 40;

/// Tantivy analyzer chain: split on non-alphanumerics, drop very long tokens,
/// lowercase, remove stopwords, Snowball-stem.
#[derive(Clone)]
pub struct EnglishAnalyzer {
    analyzer: TextAnalyzer,
}

impl EnglishAnalyzer {
    pub fn new() -> Self {
        let analyzer = TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(RemoveLongFilter::limit(MAX_TOKEN_LEN))
            .filter(LowerCaser)
            .filter(StopWordFilter::remove(STOP_WORDS.iter().map(|s| s.to_string())))
            .filter(Stemmer::new(Language::English))
            .build();
        Self { analyzer }
    }
}

impl Default for EnglishAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl TextTokenizer for EnglishAnalyzer {
    fn tokenize(&self, text: &str) -> Vec<String> {
        // token_stream needs &mut; analyzers are cheap to clone
        let mut analyzer = self.analyzer.clone();
        let mut stream = analyzer.token_stream(text);
        let mut tokens = Vec::new();
        while stream.advance() {
            tokens.push(stream.token().text.clone());
        }
        tokens
    }
}

/// Lowercased alphanumeric runs, no stopwords or stemming.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTokenizer;

impl TextTokenizer for PlainTokenizer {
    fn tokenize(&self, text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
            .collect()
    }
}
