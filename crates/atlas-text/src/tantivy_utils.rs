use tantivy::schema::{Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, STORED};
use tantivy::tokenizer::{LowerCaser, SimpleTokenizer, StopWordFilter, TextAnalyzer};
use tantivy::Index;

pub const TOKENIZER: &str = "text_with_stopwords";

/// Fields of the in-memory row index: the searchable text and the position
/// of the row in the worker's id table.
#[derive(Debug, Clone, Copy)]
pub struct RowFields {
	pub text: Field,
	pub row: Field,
}

pub fn build_schema() -> (Schema, RowFields) {
	let mut schema_builder = Schema::builder();
	let text_field_indexing = TextFieldIndexing::default().set_tokenizer(TOKENIZER).set_index_option(IndexRecordOption::WithFreqsAndPositions);
	let text = schema_builder.add_text_field("text", TextOptions::default().set_indexing_options(text_field_indexing));
	let row = schema_builder.add_u64_field("row", STORED);
	(schema_builder.build(), RowFields { text, row })
}

pub fn register_tokenizer(index: &Index) {
	let stop_words = vec![
		"a","an","and","are","as","at","be","by","for","from","has","he","in","is","it","its","of","on","that","the","to","was","will","with","or","but","not","this","these","they","them","their","there","then","than","so","if","when","where","why","how","what","which","who","whom","whose","can","could","should","would","may","might","must","shall","do","does","did","have","had","having",
	];
	let tokenizer = TextAnalyzer::builder(SimpleTokenizer::default())
		.filter(LowerCaser)
		.filter(StopWordFilter::remove(stop_words.into_iter().map(|s| s.to_string())))
		.build();
	index.tokenizers().register(TOKENIZER, tokenizer);
}

/// Query terms as the index sees them: lowercased, stop words dropped,
/// duplicates removed, original order kept.
pub fn analyze(index: &Index, field: Field, text: &str) -> tantivy::Result<Vec<String>> {
	let mut analyzer = index.tokenizer_for_field(field)?;
	let mut stream = analyzer.token_stream(text);
	let mut terms: Vec<String> = Vec::new();
	while stream.advance() {
		let t = &stream.token().text;
		if !terms.iter().any(|seen| seen == t) { terms.push(t.clone()); }
	}
	Ok(terms)
}
