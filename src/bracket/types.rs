use crate::types::{BracketMatchId, BracketParticipantId};
use serde::{Deserialize, Serialize};
use strum::Display;

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TournamentType {
    SingleElimination,
    DoubleElimination,
}

/// Remote tournament handle as returned by the bracket service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TournamentInfo {
    pub id: u64,
    pub url: String,
}

impl TournamentInfo {
    pub fn full_url(&self) -> String {
        format!("https://challonge.com/{}", self.url)
    }
}

#[derive(Debug, Display, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BracketMatchState {
    #[default]
    Pending,
    Open,
    Complete,
}

/// A match record as seen on the remote bracket. Reads may be stale: this is
/// a snapshot of a versioned remote record, never authoritative local state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BracketMatch {
    pub id: BracketMatchId,
    pub state: BracketMatchState,
    pub player1_id: Option<BracketParticipantId>,
    pub player2_id: Option<BracketParticipantId>,
    #[serde(default)]
    pub winner_id: Option<BracketParticipantId>,
    #[serde(default)]
    pub underway_at: Option<String>,
    #[serde(default)]
    pub scores_csv: Option<String>,
    #[serde(default)]
    pub forfeited: Option<bool>,
    #[serde(default)]
    pub round: i32,
}

impl BracketMatch {
    pub fn is_complete(&self) -> bool {
        self.state == BracketMatchState::Complete
    }

    pub fn is_underway(&self) -> bool {
        self.underway_at.is_some()
    }

    pub fn has_both_slots(&self) -> bool {
        self.player1_id.is_some() && self.player2_id.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BracketParticipant {
    pub id: BracketParticipantId,
    pub name: String,
    #[serde(default)]
    pub final_rank: Option<u32>,
}
