use crate::types::{EventType, Player, Review, ReviewSummary, RoundEvent, SeatStatistics};
use std::collections::HashMap;

/// Lazily computed post-game aggregation: speech/vote counts, per-seat
/// stats, and the last handful of key turns — only what can be computed
/// honestly from the event log.
const MAX_NARRATIVE_TURNS: usize = 8;

pub fn build_review(game_id: &str, players: &[Player], events: &[RoundEvent]) -> Review {
    let mut votes_cast: HashMap<String, u32> = HashMap::new();
    let mut votes_received: HashMap<String, u32> = HashMap::new();
    let mut votes_on_werewolf: HashMap<String, u32> = HashMap::new();
    let mut total_speeches = 0u32;
    let mut total_votes = 0u32;

    let werewolves: std::collections::HashSet<&str> = players
        .iter()
        .filter(|p| p.role == crate::types::RoleType::Werewolf)
        .map(|p| p.agent_id.as_str())
        .collect();

    for event in events {
        match event.event_type {
            EventType::Speech => total_speeches += 1,
            EventType::Vote => {
                total_votes += 1;
                if let Some(actor) = &event.actor_id {
                    *votes_cast.entry(actor.clone()).or_insert(0) += 1;
                }
                if let Some(target) = &event.target_id {
                    *votes_received.entry(target.clone()).or_insert(0) += 1;
                    if werewolves.contains(target.as_str()) {
                        if let Some(actor) = &event.actor_id {
                            *votes_on_werewolf.entry(actor.clone()).or_insert(0) += 1;
                        }
                    }
                }
            }
            _ => {}
        }
    }

    let per_seat: Vec<SeatStatistics> = players
        .iter()
        .map(|p| SeatStatistics {
            agent_id: p.agent_id.clone(),
            seat_no: p.seat_no,
            votes_cast: *votes_cast.get(&p.agent_id).unwrap_or(&0),
            votes_on_werewolf: *votes_on_werewolf.get(&p.agent_id).unwrap_or(&0),
            votes_received: *votes_received.get(&p.agent_id).unwrap_or(&0),
        })
        .collect();

    let narrative: Vec<String> = events
        .iter()
        .filter(|e| matches!(e.event_type, EventType::Elimination | EventType::DeathReveal | EventType::GameOver))
        .rev()
        .take(MAX_NARRATIVE_TURNS)
        .map(|e| format!("round {}: {:?} ({:?})", e.round_no, e.event_type, e.actor_id))
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();

    Review {
        game_id: game_id.to_string(),
        summary: ReviewSummary {
            total_speeches,
            total_votes,
            per_seat,
        },
        narrative,
    }
}
