//! Schema and tokenizer registration shared by index build and search.

use std::sync::Arc;

use tantivy::schema::{
    Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, FAST, STORED, STRING,
};
use tantivy::tokenizer::{TextAnalyzer, Token, TokenStream, Tokenizer};
use tantivy::Index;

use vaultdb_core::traits::TextTokenizer;

/// Name under which the chunk tokenizer is registered on every index.
pub const TOKENIZER_NAME: &str = "vault_terms";

pub const ID_FIELD: &str = "id";
/// Position of the chunk in id order; breaks score ties.
pub const ORD_FIELD: &str = "ord";
pub const BODY_FIELD: &str = "body";
pub const TITLE_FIELD: &str = "title";
pub const HEADER_FIELD: &str = "header";

#[derive(Debug, Clone, Copy)]
pub struct KeywordFields {
    pub id: Field,
    pub ord: Field,
    pub body: Field,
    pub title: Field,
    pub header: Field,
}

impl KeywordFields {
    pub fn from_schema(schema: &Schema) -> tantivy::Result<Self> {
        Ok(Self {
            id: schema.get_field(ID_FIELD)?,
            ord: schema.get_field(ORD_FIELD)?,
            body: schema.get_field(BODY_FIELD)?,
            title: schema.get_field(TITLE_FIELD)?,
            header: schema.get_field(HEADER_FIELD)?,
        })
    }
}

pub fn build_schema() -> Schema {
    let mut schema_builder = Schema::builder();
    schema_builder.add_text_field(ID_FIELD, STRING | STORED);
    schema_builder.add_u64_field(ORD_FIELD, FAST | STORED);
    // BM25 only needs term frequencies and field norms
    let indexing = TextFieldIndexing::default()
        .set_tokenizer(TOKENIZER_NAME)
        .set_index_option(IndexRecordOption::WithFreqs);
    let text_options = TextOptions::default().set_indexing_options(indexing);
    schema_builder.add_text_field(BODY_FIELD, text_options.clone());
    schema_builder.add_text_field(TITLE_FIELD, text_options.clone());
    schema_builder.add_text_field(HEADER_FIELD, text_options);
    schema_builder.build()
}

/// Exposes a [`TextTokenizer`] to tantivy so index and query terms come from
/// the same normalization.
#[derive(Clone)]
pub struct TermTokenizer {
    inner: Arc<dyn TextTokenizer>,
}

impl TermTokenizer {
    pub fn new(inner: Arc<dyn TextTokenizer>) -> Self {
        Self { inner }
    }
}

pub struct TermStream {
    tokens: Vec<Token>,
    cursor: usize,
}

impl TokenStream for TermStream {
    fn advance(&mut self) -> bool {
        if self.cursor < self.tokens.len() {
            self.cursor += 1;
            true
        } else {
            false
        }
    }

    fn token(&self) -> &Token {
        &self.tokens[self.cursor.saturating_sub(1)]
    }

    fn token_mut(&mut self) -> &mut Token {
        let i = self.cursor.saturating_sub(1);
        &mut self.tokens[i]
    }
}

impl Tokenizer for TermTokenizer {
    type TokenStream<'a> = TermStream;

    fn token_stream<'a>(&'a mut self, text: &'a str) -> TermStream {
        let tokens = self
            .inner
            .tokenize(text)
            .into_iter()
            .enumerate()
            .map(|(position, text)| Token { position, text, position_length: 1, ..Token::default() })
            .collect();
        TermStream { tokens, cursor: 0 }
    }
}

pub fn register_tokenizer(index: &Index, tokenizer: Arc<dyn TextTokenizer>) {
    index.tokenizers().register(TOKENIZER_NAME, TextAnalyzer::from(TermTokenizer::new(tokenizer)));
}
