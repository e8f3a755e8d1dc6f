//! File parsing, symbol extraction and repository scanning

pub mod error;
pub mod extractor;
pub mod languages;
pub mod parser_pool;
pub mod scanner;

#[cfg(test)]
mod tests;

pub use error::{ExtractError, ScanError};
pub use extractor::{Extraction, ExtractionBuilder, LanguageExtractor, SymbolExtractor};
pub use parser_pool::{ParseRequest, ParseResult, ParserPool, create_parser_pool};
pub use scanner::{
    ChangeReport, FailureKind, FileChange, FileFailure, RepositoryScanner, ScanOutcome, SkipReason, SkippedFile,
};
