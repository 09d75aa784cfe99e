pub mod fuzzy;
pub mod literal;
pub mod text;
pub mod tfidf;
