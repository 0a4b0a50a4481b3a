use std::collections::HashMap;
use std::thread;
use std::time::Duration;

use include_dir::{include_dir, Dir};
use rand::seq::SliceRandom;
use serde::Deserialize;

use crate::error::SupplyError;
use crate::language::Language;

static TEXT_DIR: Dir = include_dir!("$CARGO_MANIFEST_DIR/data/texts");

const HTTP_TIMEOUT: Duration = Duration::from_secs(5);

/// Source of practice text blocks for a language.
pub trait TextSupply: Send + Sync {
    /// Return one text block. `prev` is the last block served, which the
    /// supplier should avoid repeating when it has alternatives.
    fn fetch(&self, lang: Language, prev: Option<&str>) -> Result<String, SupplyError>;
}

/// Text blocks bundled with the binary, one file per language, blocks
/// separated by lines of `===`.
#[derive(Debug, Clone)]
pub struct CorpusSupply {
    blocks: HashMap<Language, Vec<String>>,
}

impl CorpusSupply {
    pub fn bundled() -> Self {
        let sources = Language::ALL.iter().filter_map(|lang| {
            TEXT_DIR
                .get_file(format!("{}.txt", lang.code()))
                .and_then(|f| f.contents_utf8())
                .map(|raw| (*lang, raw))
        });
        Self::from_sources(sources)
    }

    pub fn from_sources<'a, I>(sources: I) -> Self
    where
        I: IntoIterator<Item = (Language, &'a str)>,
    {
        let blocks = sources
            .into_iter()
            .map(|(lang, raw)| (lang, split_blocks(raw)))
            .collect();
        Self { blocks }
    }

    pub fn block_count(&self, lang: Language) -> usize {
        self.blocks.get(&lang).map_or(0, Vec::len)
    }
}

impl TextSupply for CorpusSupply {
    fn fetch(&self, lang: Language, prev: Option<&str>) -> Result<String, SupplyError> {
        let blocks = match self.blocks.get(&lang) {
            Some(blocks) if !blocks.is_empty() => blocks,
            _ => return Err(SupplyError::Empty(lang.to_string())),
        };

        let fresh: Vec<&String> = blocks
            .iter()
            .filter(|b| prev != Some(b.as_str()))
            .collect();
        let pool: Vec<&String> = if fresh.is_empty() {
            blocks.iter().collect()
        } else {
            fresh
        };

        pool.choose(&mut rand::thread_rng())
            .map(|b| b.to_string())
            .ok_or_else(|| SupplyError::Empty(lang.to_string()))
    }
}

/// Split a corpus file into trimmed, non-empty blocks on `===` separator lines.
pub fn split_blocks(raw: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current = String::new();

    for line in raw.lines() {
        let trimmed = line.trim_end();
        if trimmed.len() >= 3 && trimmed.chars().all(|c| c == '=') {
            push_block(&mut blocks, &current);
            current.clear();
        } else {
            current.push_str(line);
            current.push('\n');
        }
    }
    push_block(&mut blocks, &current);

    blocks
}

fn push_block(blocks: &mut Vec<String>, block: &str) {
    let block = block.trim();
    if !block.is_empty() {
        blocks.push(block.to_string());
    }
}

#[derive(Debug, Deserialize)]
struct TextResponse {
    #[serde(default)]
    text: Option<String>,
}

/// Remote text endpoint: `GET {base}/api/text/{code}?prev=...` answering
/// `{ "text": "..." }`.
#[derive(Debug, Clone)]
pub struct HttpSupply {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl HttpSupply {
    pub fn new(base_url: impl Into<String>) -> Result<Self, SupplyError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn endpoint(&self, lang: Language) -> String {
        format!("{}/api/text/{}", self.base_url, lang.code())
    }
}

impl TextSupply for HttpSupply {
    fn fetch(&self, lang: Language, prev: Option<&str>) -> Result<String, SupplyError> {
        let mut request = self.client.get(self.endpoint(lang));
        if let Some(prev) = prev {
            request = request.query(&[("prev", prev)]);
        }

        let response = request.send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(SupplyError::Status {
                status: status.as_u16(),
            });
        }

        let body: TextResponse = response.json()?;
        Ok(body.text.unwrap_or_default())
    }
}

/// Fetch one block, degrading any failure to an empty string.
pub fn fetch_or_empty(supply: &dyn TextSupply, lang: Language, prev: Option<&str>) -> String {
    match supply.fetch(lang, prev) {
        Ok(text) => text,
        Err(err) => {
            tracing::warn!(%lang, error = %err, "text fetch failed, continuing with empty block");
            String::new()
        }
    }
}

/// Issue `fan_out` fetches concurrently and return the blocks in request
/// order, whatever order they complete in.
pub fn fetch_fan_out(
    supply: &dyn TextSupply,
    lang: Language,
    fan_out: usize,
    prev: Option<&str>,
) -> Vec<String> {
    in_request_order(fan_out.max(1), |_| fetch_or_empty(supply, lang, prev))
}

/// Run `count` jobs on scoped threads. Results are indexed by slot, not by
/// completion; a panicked job yields an empty block.
fn in_request_order<F>(count: usize, job: F) -> Vec<String>
where
    F: Fn(usize) -> String + Sync,
{
    thread::scope(|scope| {
        let job = &job;
        let handles: Vec<_> = (0..count)
            .map(|slot| scope.spawn(move || job(slot)))
            .collect();

        handles
            .into_iter()
            .map(|handle| handle.join().unwrap_or_default())
            .collect()
    })
}
