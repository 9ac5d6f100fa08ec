use super::types::{
    BracketMatch, BracketParticipant, TournamentInfo, TournamentType,
};
use crate::config::BracketCredentials;
use crate::types::{AppResult, BracketMatchId};
use serde::Deserialize;
use serde_json::json;

const API_BASE_URL: &str = "https://api.challonge.com/v1";

// The v1 API nests every record under a single-key object.
#[derive(Debug, Deserialize)]
struct TournamentEnvelope {
    tournament: TournamentInfo,
}

#[derive(Debug, Deserialize)]
struct MatchEnvelope {
    #[serde(rename = "match")]
    inner: BracketMatch,
}

#[derive(Debug, Deserialize)]
struct ParticipantEnvelope {
    participant: BracketParticipant,
}

/// REST client for the Challonge-style bracket service. Plain one-shot
/// calls: retry policy lives in [`super::BracketClient`].
#[derive(Debug, Clone)]
pub struct ChallongeClient {
    client: reqwest::Client,
    credentials: BracketCredentials,
    base_url: String,
}

impl ChallongeClient {
    pub fn new(credentials: BracketCredentials) -> Self {
        Self {
            client: reqwest::Client::new(),
            credentials,
            base_url: API_BASE_URL.to_string(),
        }
    }

    #[cfg(test)]
    pub fn with_base_url(credentials: BracketCredentials, base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            credentials,
            base_url: base_url.to_string(),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}/{}", self.base_url, path))
            .basic_auth(
                &self.credentials.username,
                Some(&self.credentials.api_key),
            )
    }

    pub async fn create_tournament(
        &self,
        name: &str,
        description: &str,
        tournament_type: TournamentType,
    ) -> AppResult<TournamentInfo> {
        let type_name = match tournament_type {
            TournamentType::SingleElimination => "single elimination",
            TournamentType::DoubleElimination => "double elimination",
        };
        let body = json!({
            "tournament": {
                "name": name,
                "description": description,
                "tournament_type": type_name,
                "hold_third_place_match": true,
            }
        });

        let envelope: TournamentEnvelope = self
            .request(reqwest::Method::POST, "tournaments.json")
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(envelope.tournament)
    }

    pub async fn bulk_add_participants(
        &self,
        tournament: u64,
        names: &[String],
    ) -> AppResult<Vec<BracketParticipant>> {
        let body = json!({
            "participants": names
                .iter()
                .map(|name| json!({ "name": name }))
                .collect::<Vec<_>>(),
        });

        let envelopes: Vec<ParticipantEnvelope> = self
            .request(
                reqwest::Method::POST,
                &format!("tournaments/{tournament}/participants/bulk_add.json"),
            )
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(envelopes.into_iter().map(|e| e.participant).collect())
    }

    pub async fn start_tournament(&self, tournament: u64) -> AppResult<()> {
        self.request(
            reqwest::Method::POST,
            &format!("tournaments/{tournament}/start.json"),
        )
        .send()
        .await?
        .error_for_status()?;
        Ok(())
    }

    pub async fn matches(&self, tournament: u64) -> AppResult<Vec<BracketMatch>> {
        let envelopes: Vec<MatchEnvelope> = self
            .request(
                reqwest::Method::GET,
                &format!("tournaments/{tournament}/matches.json"),
            )
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(envelopes.into_iter().map(|e| e.inner).collect())
    }

    pub async fn mark_underway(
        &self,
        tournament: u64,
        match_id: BracketMatchId,
    ) -> AppResult<()> {
        self.request(
            reqwest::Method::POST,
            &format!("tournaments/{tournament}/matches/{match_id}/mark_as_underway.json"),
        )
        .send()
        .await?
        .error_for_status()?;
        Ok(())
    }

    pub async fn update_match(
        &self,
        tournament: u64,
        match_id: BracketMatchId,
        winner_id: u64,
        scores_csv: &str,
    ) -> AppResult<()> {
        let body = json!({
            "match": {
                "winner_id": winner_id,
                "scores_csv": scores_csv,
            }
        });
        self.request(
            reqwest::Method::PUT,
            &format!("tournaments/{tournament}/matches/{match_id}.json"),
        )
        .json(&body)
        .send()
        .await?
        .error_for_status()?;
        Ok(())
    }

    pub async fn finalize_tournament(&self, tournament: u64) -> AppResult<()> {
        self.request(
            reqwest::Method::POST,
            &format!("tournaments/{tournament}/finalize.json"),
        )
        .send()
        .await?
        .error_for_status()?;
        Ok(())
    }

    pub async fn participants(&self, tournament: u64) -> AppResult<Vec<BracketParticipant>> {
        let envelopes: Vec<ParticipantEnvelope> = self
            .request(
                reqwest::Method::GET,
                &format!("tournaments/{tournament}/participants.json"),
            )
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(envelopes.into_iter().map(|e| e.participant).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_envelope_deserialization() {
        let payload = r#"[
            {"match": {"id": 5, "state": "open", "player1_id": 1, "player2_id": 2, "round": 1}},
            {"match": {"id": 6, "state": "pending", "player1_id": null, "player2_id": null, "round": 2}}
        ]"#;
        let envelopes: Vec<MatchEnvelope> = serde_json::from_str(payload).unwrap();
        assert_eq!(envelopes.len(), 2);
        assert_eq!(envelopes[0].inner.id, 5);
        assert!(envelopes[0].inner.has_both_slots());
        assert!(!envelopes[1].inner.has_both_slots());
    }

    #[test]
    fn test_tournament_envelope_deserialization() {
        let payload = r#"{"tournament": {"id": 42, "url": "dg_abc123"}}"#;
        let envelope: TournamentEnvelope = serde_json::from_str(payload).unwrap();
        assert_eq!(envelope.tournament.id, 42);
        assert_eq!(
            envelope.tournament.full_url(),
            "https://challonge.com/dg_abc123"
        );
    }
}
