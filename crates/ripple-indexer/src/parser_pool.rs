//! Thread-safe parser pool for tree-sitter parsers
//!
//! A `tree_sitter::Parser` cannot be shared between threads, so parsing is
//! done by dedicated worker threads that each own one parser. Callers send a
//! request over a channel and block on the reply.

use std::path::PathBuf;
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, Mutex, PoisonError};

use ripple_core::Language;
use tree_sitter::Parser;

use crate::error::ExtractError;

/// Tree-sitter grammar for a language, if it has one.
pub fn grammar(language: Language) -> Option<tree_sitter::Language> {
    match language {
        Language::Rust => Some(tree_sitter_rust::LANGUAGE.into()),
        Language::TypeScript => Some(tree_sitter_typescript::LANGUAGE_TSX.into()),
        Language::JavaScript => Some(tree_sitter_javascript::LANGUAGE.into()),
        Language::Python => Some(tree_sitter_python::LANGUAGE.into()),
        Language::Go | Language::Java | Language::C | Language::Cpp | Language::Other => None,
    }
}

/// A parsing request sent to the parser pool
#[derive(Debug)]
pub struct ParseRequest {
    pub language: Language,
    pub content: String,
    pub path: PathBuf,
}

/// Result of a parsing operation
#[derive(Debug)]
pub struct ParseResult {
    pub tree: tree_sitter::Tree,
    pub path: PathBuf,
}

struct WorkerRequest {
    request: ParseRequest,
    response_sender: Sender<Result<ParseResult, ExtractError>>,
}

/// Thread-safe parser pool
#[derive(Clone)]
pub struct ParserPool {
    sender: Sender<WorkerRequest>,
    workers: usize,
}

impl ParserPool {
    /// Create a new parser pool with the specified number of worker threads
    pub fn new(num_workers: usize) -> Self {
        let (sender, receiver) = channel::<WorkerRequest>();
        let receiver = Arc::new(Mutex::new(receiver));
        let workers = num_workers.max(1);

        for i in 0..workers {
            let receiver = Arc::clone(&receiver);
            std::thread::spawn(move || Self::worker_thread(i, receiver));
        }

        Self { sender, workers }
    }

    /// Number of worker threads.
    pub fn workers(&self) -> usize {
        self.workers
    }

    fn worker_thread(worker_id: usize, receiver: Arc<Mutex<Receiver<WorkerRequest>>>) {
        tracing::debug!("Parser worker {} started", worker_id);

        let mut parser = Parser::new();
        let mut current: Option<Language> = None;

        loop {
            let next = receiver.lock().unwrap_or_else(PoisonError::into_inner).recv();
            let Ok(WorkerRequest { request, response_sender }) = next else {
                tracing::debug!("Parser worker {} shutting down", worker_id);
                break;
            };

            let result = Self::parse_with(&mut parser, &mut current, request);
            if response_sender.send(result).is_err() {
                tracing::warn!("Failed to send parse result back to caller");
            }
        }
    }

    fn parse_with(
        parser: &mut Parser,
        current: &mut Option<Language>,
        request: ParseRequest,
    ) -> Result<ParseResult, ExtractError> {
        if *current != Some(request.language) {
            let language = grammar(request.language)
                .ok_or_else(|| ExtractError::Grammar(request.language, "no grammar".into()))?;
            parser
                .set_language(&language)
                .map_err(|e| ExtractError::Grammar(request.language, e.to_string()))?;
            *current = Some(request.language);
        }

        let tree = parser.parse(&request.content, None).ok_or(ExtractError::NoTree)?;
        Ok(ParseResult {
            tree,
            path: request.path,
        })
    }

    /// Parse content, blocking the current thread until a worker replies.
    pub fn parse_blocking(&self, request: ParseRequest) -> Result<ParseResult, ExtractError> {
        let (response_sender, response_receiver) = channel();
        self.sender
            .send(WorkerRequest {
                request,
                response_sender,
            })
            .map_err(|_| ExtractError::PoolClosed)?;

        response_receiver.recv().map_err(|_| ExtractError::PoolClosed)?
    }
}

/// Convenience function to create a parser pool with default settings
pub fn create_parser_pool() -> ParserPool {
    // Use number of CPU cores as default worker count, but at least 2
    let num_workers = std::thread::available_parallelism()
        .map(|n| n.get().max(2))
        .unwrap_or(2);

    ParserPool::new(num_workers)
}
