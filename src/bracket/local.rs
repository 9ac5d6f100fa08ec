use super::types::{
    BracketMatch, BracketMatchState, BracketParticipant, TournamentInfo, TournamentType,
};
use crate::types::{AppResult, BracketMatchId, BracketParticipantId};
use anyhow::anyhow;
use std::collections::HashMap;
use std::sync::Mutex;

/// In-memory single-elimination bracket. Stands in for the remote service
/// in the demo binary and the test suite; pairings are built in registration
/// order, odd entrants receive a bye into the next round.
#[derive(Debug, Default)]
pub struct LocalBracket {
    inner: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    info: Option<TournamentInfo>,
    started: bool,
    finalized: bool,
    participants: Vec<BracketParticipant>,
    matches: Vec<BracketMatch>,
    next_match_id: BracketMatchId,
    current_round: i32,
    carry: Vec<BracketParticipantId>,
    elimination_round: HashMap<BracketParticipantId, i32>,
    champion: Option<BracketParticipantId>,
    // Number of calls that should fail before operations succeed again,
    // used to exercise the adapter's retry loops.
    fail_next_ops: u32,
}

impl State {
    fn check_failure(&mut self) -> AppResult<()> {
        if self.fail_next_ops > 0 {
            self.fail_next_ops -= 1;
            return Err(anyhow!("Simulated bracket service outage"));
        }
        Ok(())
    }

    fn spawn_round(&mut self, round: i32, entrants: Vec<BracketParticipantId>) {
        if entrants.len() == 1 {
            self.champion = entrants.first().copied();
            return;
        }

        self.current_round = round;
        let mut chunks = entrants.chunks_exact(2);
        for pair in chunks.by_ref() {
            self.next_match_id += 1;
            self.matches.push(BracketMatch {
                id: self.next_match_id,
                state: BracketMatchState::Open,
                player1_id: Some(pair[0]),
                player2_id: Some(pair[1]),
                winner_id: None,
                underway_at: None,
                scores_csv: None,
                forfeited: None,
                round,
            });
        }
        self.carry = chunks.remainder().to_vec();
    }

    fn advance_if_round_complete(&mut self) {
        let round = self.current_round;
        let round_matches = self
            .matches
            .iter()
            .filter(|m| m.round == round)
            .collect::<Vec<_>>();
        if round_matches.iter().any(|m| !m.is_complete()) {
            return;
        }

        let mut entrants = round_matches
            .iter()
            .filter_map(|m| m.winner_id)
            .collect::<Vec<_>>();
        entrants.extend(self.carry.drain(..));
        self.spawn_round(round + 1, entrants);
    }
}

impl LocalBracket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_ops(&self, count: u32) {
        let mut state = self.inner.lock().expect("Bracket lock should not be poisoned");
        state.fail_next_ops = count;
    }

    pub fn create_tournament(
        &self,
        name: &str,
        _description: &str,
        _tournament_type: TournamentType,
    ) -> AppResult<TournamentInfo> {
        let mut state = self.inner.lock().expect("Bracket lock should not be poisoned");
        state.check_failure()?;
        if state.info.is_some() {
            return Err(anyhow!("Tournament already created"));
        }
        let slug = name
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        let info = TournamentInfo {
            id: 1,
            url: format!("local_{slug}"),
        };
        state.info = Some(info.clone());
        Ok(info)
    }

    pub fn bulk_add_participants(
        &self,
        names: &[String],
    ) -> AppResult<Vec<BracketParticipant>> {
        let mut state = self.inner.lock().expect("Bracket lock should not be poisoned");
        state.check_failure()?;
        if state.started {
            return Err(anyhow!("Tournament already started"));
        }
        let mut added = vec![];
        for name in names {
            let id = state.participants.len() as BracketParticipantId + 1;
            let participant = BracketParticipant {
                id,
                name: name.clone(),
                final_rank: None,
            };
            state.participants.push(participant.clone());
            added.push(participant);
        }
        Ok(added)
    }

    pub fn start_tournament(&self) -> AppResult<()> {
        let mut state = self.inner.lock().expect("Bracket lock should not be poisoned");
        state.check_failure()?;
        if state.started {
            return Err(anyhow!("Tournament already started"));
        }
        if state.participants.len() < 2 {
            return Err(anyhow!("Not enough participants to start"));
        }
        state.started = true;
        let entrants = state.participants.iter().map(|p| p.id).collect();
        state.spawn_round(1, entrants);
        Ok(())
    }

    pub fn matches(&self) -> AppResult<Vec<BracketMatch>> {
        let mut state = self.inner.lock().expect("Bracket lock should not be poisoned");
        state.check_failure()?;
        Ok(state.matches.clone())
    }

    pub fn mark_underway(&self, match_id: BracketMatchId) -> AppResult<()> {
        let mut state = self.inner.lock().expect("Bracket lock should not be poisoned");
        state.check_failure()?;
        let m = state
            .matches
            .iter_mut()
            .find(|m| m.id == match_id)
            .ok_or_else(|| anyhow!("No such match {match_id}"))?;
        m.underway_at = Some("now".to_string());
        Ok(())
    }

    pub fn update_match(
        &self,
        match_id: BracketMatchId,
        winner_id: BracketParticipantId,
        scores_csv: &str,
    ) -> AppResult<()> {
        let mut state = self.inner.lock().expect("Bracket lock should not be poisoned");
        state.check_failure()?;
        let m = state
            .matches
            .iter_mut()
            .find(|m| m.id == match_id)
            .ok_or_else(|| anyhow!("No such match {match_id}"))?;
        if m.player1_id != Some(winner_id) && m.player2_id != Some(winner_id) {
            return Err(anyhow!("Winner {winner_id} is not in match {match_id}"));
        }

        // Idempotent: reporting the same result twice is acknowledged again.
        let round = m.round;
        let loser = if m.player1_id == Some(winner_id) {
            m.player2_id
        } else {
            m.player1_id
        };
        m.winner_id = Some(winner_id);
        m.scores_csv = Some(scores_csv.to_string());
        m.state = BracketMatchState::Complete;

        if let Some(loser) = loser {
            state.elimination_round.insert(loser, round);
        }
        state.advance_if_round_complete();
        Ok(())
    }

    pub fn finalize_tournament(&self) -> AppResult<()> {
        let mut state = self.inner.lock().expect("Bracket lock should not be poisoned");
        state.check_failure()?;
        if state.champion.is_none() {
            return Err(anyhow!("Tournament still has open matches"));
        }
        state.finalized = true;

        let champion = state.champion;
        let final_round = state.current_round;
        let eliminations = state.elimination_round.clone();
        for participant in state.participants.iter_mut() {
            participant.final_rank = if Some(participant.id) == champion {
                Some(1)
            } else {
                // Losers share the rank of the stage they went out at:
                // final 2, semifinals 3, quarterfinals 5, and so on.
                eliminations
                    .get(&participant.id)
                    .map(|round| 2_u32.pow((final_round - round) as u32) + 1)
            };
        }
        Ok(())
    }

    pub fn participants(&self) -> AppResult<Vec<BracketParticipant>> {
        let mut state = self.inner.lock().expect("Bracket lock should not be poisoned");
        state.check_failure()?;
        Ok(state.participants.clone())
    }
}
