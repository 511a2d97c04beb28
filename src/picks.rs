use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;
use tracing::{info, instrument};

/// Number of picks every weekly batch carries.
pub const PICKS_PER_BATCH: usize = 3;
const MAX_TICKER_LEN: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PickAction {
    #[serde(rename = "BUY")]
    Buy,
    #[serde(rename = "SELL")]
    Sell,
}

impl PickAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PickAction::Buy => "BUY",
            PickAction::Sell => "SELL",
        }
    }
}

impl fmt::Display for PickAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PickAction {
    type Err = DraftError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BUY" => Ok(PickAction::Buy),
            "SELL" => Ok(PickAction::Sell),
            other => Err(DraftError::InvalidAction(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PickDraft {
    pub ticker: String,
    pub action: PickAction,
    pub reasoning: String,
}

#[derive(Debug, Error)]
pub enum DraftError {
    #[error("expected {PICKS_PER_BATCH} picks, got {0}")]
    WrongCount(usize),
    #[error("invalid ticker {0:?}")]
    InvalidTicker(String),
    #[error("duplicate ticker {0:?}")]
    DuplicateTicker(String),
    #[error("invalid action {0:?}")]
    InvalidAction(String),
    #[error("missing reasoning for {0}")]
    MissingReasoning(String),
    #[error("failed to read picks from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse picks: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Source of the three weekly picks.
#[async_trait]
pub trait PickDrafter: Send + Sync {
    async fn draft_picks(&self) -> Result<Vec<PickDraft>, DraftError>;
}

/// Exactly three picks, tickers of 1-5 uppercase ASCII letters, unique, with a reason.
pub fn validate_drafts(drafts: &[PickDraft]) -> Result<(), DraftError> {
    if drafts.len() != PICKS_PER_BATCH {
        return Err(DraftError::WrongCount(drafts.len()));
    }
    let mut seen = HashSet::new();
    for draft in drafts {
        let ticker = draft.ticker.trim();
        let well_formed = !ticker.is_empty()
            && ticker.len() <= MAX_TICKER_LEN
            && ticker.chars().all(|c| c.is_ascii_uppercase());
        if !well_formed {
            return Err(DraftError::InvalidTicker(draft.ticker.clone()));
        }
        if !seen.insert(ticker) {
            return Err(DraftError::DuplicateTicker(ticker.to_string()));
        }
        if draft.reasoning.trim().is_empty() {
            return Err(DraftError::MissingReasoning(ticker.to_string()));
        }
    }
    Ok(())
}

/// Reads a JSON array of `{ticker, action, reasoning}` prepared ahead of time.
pub struct FilePickDrafter {
    path: PathBuf,
}

impl FilePickDrafter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl PickDrafter for FilePickDrafter {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn draft_picks(&self) -> Result<Vec<PickDraft>, DraftError> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|source| DraftError::Io {
            path: self.path.clone(),
            source,
        })?;
        let drafts = parse_drafts(&content)?;
        info!(tickers = ?drafts.iter().map(|d| d.ticker.as_str()).collect::<Vec<_>>(), "Picks loaded from file");
        Ok(drafts)
    }
}

pub fn parse_drafts(content: &str) -> Result<Vec<PickDraft>, DraftError> {
    let mut drafts: Vec<PickDraft> = serde_json::from_str(content)?;
    for draft in &mut drafts {
        draft.ticker = draft.ticker.trim().to_string();
    }
    validate_drafts(&drafts)?;
    Ok(drafts)
}
