pub mod challonge;
pub mod local;
pub mod types;

use crate::types::{AppResult, BracketMatchId, BracketParticipantId};
use anyhow::anyhow;
use challonge::ChallongeClient;
use local::LocalBracket;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use types::{BracketMatch, BracketParticipant, TournamentInfo, TournamentType};

/// Bracket service backend. The remote client talks to the hosted bracket
/// API, the local one keeps everything in memory.
pub enum Bracket {
    Challonge(ChallongeClient),
    Local(std::sync::Arc<LocalBracket>),
}

impl Bracket {
    async fn create_tournament(
        &self,
        name: &str,
        description: &str,
        tournament_type: TournamentType,
    ) -> AppResult<TournamentInfo> {
        match self {
            Self::Challonge(client) => {
                client
                    .create_tournament(name, description, tournament_type)
                    .await
            }
            Self::Local(bracket) => bracket.create_tournament(name, description, tournament_type),
        }
    }

    async fn bulk_add_participants(
        &self,
        tournament: &TournamentInfo,
        names: &[String],
    ) -> AppResult<Vec<BracketParticipant>> {
        match self {
            Self::Challonge(client) => client.bulk_add_participants(tournament.id, names).await,
            Self::Local(bracket) => bracket.bulk_add_participants(names),
        }
    }

    async fn start_tournament(&self, tournament: &TournamentInfo) -> AppResult<()> {
        match self {
            Self::Challonge(client) => client.start_tournament(tournament.id).await,
            Self::Local(bracket) => bracket.start_tournament(),
        }
    }

    async fn matches(&self, tournament: &TournamentInfo) -> AppResult<Vec<BracketMatch>> {
        match self {
            Self::Challonge(client) => client.matches(tournament.id).await,
            Self::Local(bracket) => bracket.matches(),
        }
    }

    async fn mark_underway(
        &self,
        tournament: &TournamentInfo,
        match_id: BracketMatchId,
    ) -> AppResult<()> {
        match self {
            Self::Challonge(client) => client.mark_underway(tournament.id, match_id).await,
            Self::Local(bracket) => bracket.mark_underway(match_id),
        }
    }

    async fn update_match(
        &self,
        tournament: &TournamentInfo,
        match_id: BracketMatchId,
        winner_id: BracketParticipantId,
        scores_csv: &str,
    ) -> AppResult<()> {
        match self {
            Self::Challonge(client) => {
                client
                    .update_match(tournament.id, match_id, winner_id, scores_csv)
                    .await
            }
            Self::Local(bracket) => bracket.update_match(match_id, winner_id, scores_csv),
        }
    }

    async fn finalize_tournament(&self, tournament: &TournamentInfo) -> AppResult<()> {
        match self {
            Self::Challonge(client) => client.finalize_tournament(tournament.id).await,
            Self::Local(bracket) => bracket.finalize_tournament(),
        }
    }

    async fn participants(
        &self,
        tournament: &TournamentInfo,
    ) -> AppResult<Vec<BracketParticipant>> {
        match self {
            Self::Challonge(client) => client.participants(tournament.id).await,
            Self::Local(bracket) => bracket.participants(),
        }
    }
}

/// Wraps a backend with the orchestrator's failure policy: tournament
/// creation and registration fail fast so the host hears about a bad setup
/// immediately, while every in-tournament operation retries with a fixed
/// backoff until it succeeds or the tournament is torn down.
pub struct BracketClient {
    backend: Bracket,
    retry_backoff: Duration,
    cancellation: CancellationToken,
}

macro_rules! retry_forever {
    ($self:expr, $op:expr, $what:expr) => {
        loop {
            match $op {
                Ok(value) => break Ok(value),
                Err(e) => {
                    log::warn!("Bracket operation '{}' failed, retrying: {e}", $what);
                    tokio::select! {
                        _ = $self.cancellation.cancelled() => {
                            break Err(anyhow!("Bracket operation '{}' cancelled", $what));
                        }
                        _ = tokio::time::sleep($self.retry_backoff) => {}
                    }
                }
            }
        }
    };
}

impl BracketClient {
    pub fn new(backend: Bracket, retry_backoff: Duration, cancellation: CancellationToken) -> Self {
        Self {
            backend,
            retry_backoff,
            cancellation,
        }
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub async fn create_tournament(
        &self,
        name: &str,
        description: &str,
        tournament_type: TournamentType,
    ) -> AppResult<TournamentInfo> {
        self.backend
            .create_tournament(name, description, tournament_type)
            .await
    }

    pub async fn bulk_add_participants(
        &self,
        tournament: &TournamentInfo,
        names: &[String],
    ) -> AppResult<Vec<BracketParticipant>> {
        self.backend.bulk_add_participants(tournament, names).await
    }

    pub async fn start_tournament(&self, tournament: &TournamentInfo) -> AppResult<()> {
        retry_forever!(
            self,
            self.backend.start_tournament(tournament).await,
            "start"
        )
    }

    pub async fn matches(&self, tournament: &TournamentInfo) -> AppResult<Vec<BracketMatch>> {
        retry_forever!(self, self.backend.matches(tournament).await, "matches")
    }

    pub async fn mark_underway(
        &self,
        tournament: &TournamentInfo,
        match_id: BracketMatchId,
    ) -> AppResult<()> {
        retry_forever!(
            self,
            self.backend.mark_underway(tournament, match_id).await,
            "mark_underway"
        )
    }

    pub async fn update_match(
        &self,
        tournament: &TournamentInfo,
        match_id: BracketMatchId,
        winner_id: BracketParticipantId,
        scores_csv: &str,
    ) -> AppResult<()> {
        retry_forever!(
            self,
            self.backend
                .update_match(tournament, match_id, winner_id, scores_csv)
                .await,
            "update_match"
        )
    }

    pub async fn finalize_tournament(&self, tournament: &TournamentInfo) -> AppResult<()> {
        retry_forever!(
            self,
            self.backend.finalize_tournament(tournament).await,
            "finalize"
        )
    }

    pub async fn participants(
        &self,
        tournament: &TournamentInfo,
    ) -> AppResult<Vec<BracketParticipant>> {
        retry_forever!(
            self,
            self.backend.participants(tournament).await,
            "participants"
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn local_client(bracket: Arc<LocalBracket>) -> BracketClient {
        BracketClient::new(
            Bracket::Local(bracket),
            Duration::from_millis(10),
            CancellationToken::new(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_until_success() {
        let bracket = Arc::new(LocalBracket::new());
        let client = local_client(bracket.clone());
        let info = client
            .create_tournament("Cup", "", TournamentType::SingleElimination)
            .await
            .unwrap();
        client
            .bulk_add_participants(&info, &["A".to_string(), "B".to_string()])
            .await
            .unwrap();

        bracket.fail_next_ops(3);
        client.start_tournament(&info).await.unwrap();
        assert_eq!(client.matches(&info).await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_fails_fast() {
        let bracket = Arc::new(LocalBracket::new());
        let client = local_client(bracket.clone());
        bracket.fail_next_ops(1);
        assert!(client
            .create_tournament("Cup", "", TournamentType::SingleElimination)
            .await
            .is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_retry() {
        let bracket = Arc::new(LocalBracket::new());
        let client = local_client(bracket.clone());
        let info = client
            .create_tournament("Cup", "", TournamentType::SingleElimination)
            .await
            .unwrap();

        bracket.fail_next_ops(u32::MAX);
        client.cancellation().cancel();
        assert!(client.matches(&info).await.is_err());
    }
}
