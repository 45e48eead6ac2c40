//! Shared instrumented data sources for integration tests.
//!
//! Every source records the batches it was asked for, so tests can assert
//! on batching, deduplication, and round ordering rather than just on the
//! returned values.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rustc_hash::FxHashMap;

use fetchloom::errors::FetchError;
use fetchloom::source::DataSource;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Article {
    pub id: u32,
    pub title: String,
    pub author_id: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Author {
    pub id: u32,
    pub handle: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Metadata {
    pub article_id: u32,
    pub section: String,
}

pub fn article(id: u32) -> Article {
    Article {
        id,
        title: format!("An article with id {id}"),
        author_id: id + 10,
    }
}

pub fn author(id: u32) -> Author {
    Author {
        id,
        handle: format!("@egg_{id}"),
    }
}

pub fn metadata(article_id: u32) -> Metadata {
    Metadata {
        article_id,
        section: format!("section-{article_id}"),
    }
}

/// Records every batch a source was asked to fetch.
#[derive(Default)]
pub struct BatchLog {
    calls: AtomicUsize,
    batches: Mutex<Vec<Vec<u32>>>,
}

impl BatchLog {
    pub fn record(&self, batch: &[u32]) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.batches.lock().unwrap().push(batch.to_vec());
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn batches(&self) -> Vec<Vec<u32>> {
        self.batches.lock().unwrap().clone()
    }
}

pub struct ArticleSource {
    pub log: BatchLog,
}

impl ArticleSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            log: BatchLog::default(),
        })
    }
}

#[async_trait]
impl DataSource for ArticleSource {
    type Request = u32;
    type Response = Article;

    fn name(&self) -> &str {
        "ArticleSource"
    }

    async fn fetch(
        &self,
        requests: Vec<u32>,
    ) -> Result<FxHashMap<u32, Article>, FetchError> {
        self.log.record(&requests);
        Ok(requests.into_iter().map(|id| (id, article(id))).collect())
    }
}

pub struct AuthorSource {
    pub log: BatchLog,
}

impl AuthorSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            log: BatchLog::default(),
        })
    }
}

#[async_trait]
impl DataSource for AuthorSource {
    type Request = u32;
    type Response = Author;

    fn name(&self) -> &str {
        "AuthorSource"
    }

    async fn fetch(
        &self,
        requests: Vec<u32>,
    ) -> Result<FxHashMap<u32, Author>, FetchError> {
        self.log.record(&requests);
        Ok(requests.into_iter().map(|id| (id, author(id))).collect())
    }
}

pub struct MetadataSource {
    pub log: BatchLog,
}

impl MetadataSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            log: BatchLog::default(),
        })
    }
}

#[async_trait]
impl DataSource for MetadataSource {
    type Request = u32;
    type Response = Metadata;

    fn name(&self) -> &str {
        "MetadataSource"
    }

    async fn fetch(
        &self,
        requests: Vec<u32>,
    ) -> Result<FxHashMap<u32, Metadata>, FetchError> {
        self.log.record(&requests);
        Ok(requests.into_iter().map(|id| (id, metadata(id))).collect())
    }
}

/// A source whose fetch always fails.
pub struct BrokenSource {
    pub log: BatchLog,
}

impl BrokenSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            log: BatchLog::default(),
        })
    }
}

#[async_trait]
impl DataSource for BrokenSource {
    type Request = u32;
    type Response = Article;

    fn name(&self) -> &str {
        "BrokenSource"
    }

    async fn fetch(
        &self,
        requests: Vec<u32>,
    ) -> Result<FxHashMap<u32, Article>, FetchError> {
        self.log.record(&requests);
        Err(FetchError::msg("backend offline"))
    }
}

/// A source that answers every batch with an empty map, so every request
/// comes back missing.
pub struct AbsentSource {
    pub log: BatchLog,
}

impl AbsentSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            log: BatchLog::default(),
        })
    }
}

#[async_trait]
impl DataSource for AbsentSource {
    type Request = u32;
    type Response = Article;

    fn name(&self) -> &str {
        "AbsentSource"
    }

    async fn fetch(
        &self,
        requests: Vec<u32>,
    ) -> Result<FxHashMap<u32, Article>, FetchError> {
        self.log.record(&requests);
        Ok(FxHashMap::default())
    }
}
