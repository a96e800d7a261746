//! Integration tests for full games through the operation surface.
//!
//! Exercises: create → join (auto-start) → submit → resolve → complete,
//! against the in-memory store. No SpacetimeDB.

use growthlab_logic::channels::{Channel, ChannelCatalog, SpecialEffect, TrendClass};
use growthlab_logic::config::LabConfig;
use growthlab_logic::intake::{Allocations, Decision};
use growthlab_logic::ledger::Team;
use growthlab_logic::lifecycle::{CompletionReason, Game, GameStatus, RoundAdvance};
use growthlab_logic::memory::MemoryStore;
use growthlab_logic::policy::CreatorOrAdmin;
use growthlab_logic::resolver::RoundResult;
use growthlab_logic::session::LabSession;
use growthlab_logic::store::{LabStore, RoundCommit};
use growthlab_logic::sync::LabEvent;
use growthlab_logic::LabError;
use rand::rngs::StdRng;
use rand::SeedableRng;

// ── Helpers ────────────────────────────────────────────────────────────

const HOST: &str = "host";

fn stable_config() -> LabConfig {
    LabConfig {
        catalog: ChannelCatalog::new(vec![
            Channel::new("web", "Web Ads", 100_000, 10_000_000, TrendClass::Stable, SpecialEffect::None),
            Channel::new("print", "Print", 100_000, 10_000_000, TrendClass::Decreasing, SpecialEffect::None),
        ])
        .unwrap(),
        ..LabConfig::default()
    }
}

fn alloc(pairs: &[(&str, u64)]) -> Allocations {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

fn player(i: usize) -> String {
    format!("player-{}", i)
}

/// Store + event log; sessions are created per step like request handlers.
struct Lab {
    config: LabConfig,
    policy: CreatorOrAdmin,
    store: MemoryStore,
    events: Vec<LabEvent>,
    rng: StdRng,
}

impl Lab {
    fn new(config: LabConfig) -> Self {
        Self {
            policy: CreatorOrAdmin::from_config(&config),
            config,
            store: MemoryStore::new(),
            events: Vec::new(),
            rng: StdRng::seed_from_u64(11),
        }
    }

    fn session(&mut self) -> LabSession<'_, MemoryStore, Vec<LabEvent>> {
        LabSession::new(&self.config, &self.policy, &mut self.store, &mut self.events)
    }

    fn create(&mut self) -> Game {
        let mut rng = self.rng.clone();
        let game = self.session().create_game(Some(HOST), 0, &mut rng).unwrap();
        self.rng = rng;
        game
    }

    /// Game with `n` single-member teams, started explicitly if needed.
    fn active_game(&mut self, n: usize) -> (Game, Vec<Team>) {
        let game = self.create();
        let teams: Vec<Team> = (0..n)
            .map(|i| {
                self.session()
                    .join_team(game.id, Some(&player(i)), &format!("Team {}", i), 0)
                    .unwrap()
            })
            .collect();
        if n < self.config.auto_start_team_count {
            self.session().start_game(game.id, Some(HOST), 0).unwrap();
        }
        let game = self.session().snapshot(game.id).unwrap().game;
        (game, teams)
    }

    fn submit(&mut self, game: &Game, team_idx: usize, team: &Team, round: u32, a: Allocations) {
        self.session()
            .submit_decision(game.id, team.id, round, a, Some(&player(team_idx)), 1)
            .unwrap();
    }
}

// ── Resolution ─────────────────────────────────────────────────────────

#[test]
fn stable_channel_efficiency() {
    let mut lab = Lab::new(stable_config());
    let (game, teams) = lab.active_game(1);
    lab.submit(&game, 0, &teams[0], 1, alloc(&[("web", 200_000)]));
    let outcome = lab.session().resolve_round_seeded(game.id, Some(HOST), 2, 1).unwrap();
    assert_eq!(outcome.results[0].downloads_earned, 2000);
    assert_eq!(outcome.results[0].efficiency_score, 1000.00);
}

#[test]
fn decreasing_channel_in_round_three() {
    let mut lab = Lab::new(stable_config());
    let (game, teams) = lab.active_game(1);
    for _ in 0..2 {
        lab.session().resolve_round_seeded(game.id, Some(HOST), 2, 1).unwrap();
    }
    lab.submit(&game, 0, &teams[0], 3, alloc(&[("print", 100_000)]));
    let outcome = lab.session().resolve_round_seeded(game.id, Some(HOST), 3, 1).unwrap();
    assert_eq!(outcome.round_number, 3);
    assert_eq!(outcome.results[0].downloads_earned, 800);
}

#[test]
fn competition_penalty_once_per_team() {
    let mut lab = Lab::new(stable_config());
    let (game, teams) = lab.active_game(3);
    lab.submit(&game, 0, &teams[0], 1, alloc(&[("web", 3_000_000)]));
    lab.submit(&game, 1, &teams[1], 1, alloc(&[("web", 2_000_000)]));
    lab.submit(&game, 2, &teams[2], 1, alloc(&[("web", 1_000_000)]));
    let outcome = lab.session().resolve_round_seeded(game.id, Some(HOST), 2, 1).unwrap();
    let downloads: Vec<u64> = outcome.results.iter().map(|r| r.downloads_earned).collect();
    assert_eq!(downloads, vec![27_000, 18_000, 9_000]);
    for r in &outcome.results {
        let penalties = r.events.iter().filter(|e| e.contains("competition penalty")).count();
        assert_eq!(penalties, 1);
    }
}

#[test]
fn pool_exhaustion_completes_early() {
    let mut lab = Lab::new(LabConfig {
        total_budget_pool: 1_000_000,
        ..stable_config()
    });
    let (game, teams) = lab.active_game(2);
    lab.submit(&game, 0, &teams[0], 1, alloc(&[("web", 1_000_000)]));
    lab.submit(&game, 1, &teams[1], 1, alloc(&[("web", 500_000)]));
    let outcome = lab.session().resolve_round_seeded(game.id, Some(HOST), 2, 1).unwrap();
    assert_eq!(outcome.budget_pool, 0);
    assert_eq!(
        outcome.advance,
        RoundAdvance::Completed {
            reason: CompletionReason::BudgetExhausted
        }
    );
    let snap = lab.session().snapshot(game.id).unwrap();
    assert_eq!(snap.game.status, GameStatus::Completed);
    assert_eq!(snap.game.current_round, 1);
    assert!(snap.game.round_deadline_micros.is_none());
}

#[test]
fn five_teams_auto_start() {
    let mut lab = Lab::new(LabConfig::default());
    let game = lab.create();
    for i in 0..4 {
        lab.session()
            .join_team(game.id, Some(&player(i)), &format!("T{}", i), 0)
            .unwrap();
        assert_eq!(lab.session().snapshot(game.id).unwrap().game.status, GameStatus::Waiting);
    }
    lab.session().join_team(game.id, Some(&player(4)), "T4", 99).unwrap();
    let game = lab.session().snapshot(game.id).unwrap().game;
    assert_eq!(game.status, GameStatus::Active);
    assert_eq!(game.current_round, 1);
    assert_eq!(game.round_deadline_micros, Some(lab.config.round_deadline(99)));
}

// ── Properties ─────────────────────────────────────────────────────────

#[test]
fn missing_submission_scores_like_all_zero() {
    let mut lab = Lab::new(LabConfig::default());
    let (game, teams) = lab.active_game(2);
    lab.submit(&game, 0, &teams[0], 1, alloc(&[("tv", 0), ("search_ads", 0)]));
    let outcome = lab.session().resolve_round_seeded(game.id, Some(HOST), 2, 1).unwrap();
    assert_eq!(outcome.results.len(), 2);
    let (a, b) = (&outcome.results[0], &outcome.results[1]);
    assert_eq!(a.downloads_earned, b.downloads_earned);
    assert_eq!(a.round_spending, b.round_spending);
    assert_eq!(a.efficiency_score, b.efficiency_score);
    assert_eq!(a.downloads_earned, 0);
    assert_eq!(a.efficiency_score, 0.0);
}

#[test]
fn pool_and_ledgers_track_spend_across_a_full_game() {
    let mut lab = Lab::new(LabConfig::default());
    let (game, teams) = lab.active_game(3);
    let mut last_round = 0;
    let mut pool = game.budget_pool;
    let mut statuses = vec![GameStatus::Active];
    loop {
        let g = lab.session().snapshot(game.id).unwrap().game;
        if g.is_completed() {
            break;
        }
        assert!(g.current_round >= last_round);
        last_round = g.current_round;
        for (i, team) in teams.iter().enumerate() {
            let amount = 100_000 * (i as u64 + 1);
            lab.submit(&g, i, team, g.current_round, alloc(&[("search_ads", amount), ("content", amount)]));
        }
        let outcome = lab.session().resolve_round_seeded(game.id, Some(HOST), 5, 3).unwrap();
        let spent: u64 = outcome.results.iter().map(|r| r.round_spending).sum();
        assert_eq!(outcome.budget_pool, pool.saturating_sub(spent));
        pool = outcome.budget_pool;
        statuses.push(lab.session().snapshot(game.id).unwrap().game.status);
    }
    assert_eq!(last_round, 6);
    assert!(statuses.windows(2).all(|w| w[0].can_transition_to(w[1])));

    let snap = lab.session().snapshot(game.id).unwrap();
    for (i, team) in snap.teams.iter().enumerate() {
        assert_eq!(team.total_spent, 6 * 2 * 100_000 * (i as u64 + 1));
        assert!(team.total_downloads > 0);
    }
    assert_eq!(snap.standings.len(), 3);
    assert_eq!(
        snap.game.budget_pool,
        LabConfig::default().total_budget_pool - snap.teams.iter().map(|t| t.total_spent).sum::<u64>()
    );
}

#[test]
fn resubmission_replaces_previous_decision() {
    let mut lab = Lab::new(stable_config());
    let (game, teams) = lab.active_game(1);
    lab.submit(&game, 0, &teams[0], 1, alloc(&[("web", 900_000)]));
    lab.submit(&game, 0, &teams[0], 1, alloc(&[("web", 100_000)]));
    assert_eq!(lab.session().submission_progress(game.id).unwrap(), (1, 1));
    let outcome = lab.session().resolve_round_seeded(game.id, Some(HOST), 2, 1).unwrap();
    assert_eq!(outcome.results[0].round_spending, 100_000);
}

#[test]
fn late_submission_for_resolved_round_is_rejected() {
    let mut lab = Lab::new(stable_config());
    let (game, teams) = lab.active_game(1);
    lab.session().resolve_round_seeded(game.id, Some(HOST), 2, 1).unwrap();
    let err = lab
        .session()
        .submit_decision(game.id, teams[0].id, 1, alloc(&[("web", 1)]), Some(&player(0)), 3)
        .unwrap_err();
    assert_eq!(err, LabError::InvalidRound { expected: 2, got: 1 });
}

#[test]
fn only_facilitators_start_and_resolve() {
    let mut lab = Lab::new(LabConfig::default().with_admin("ops"));
    let game = lab.create();
    lab.session().join_team(game.id, Some("p"), "Solo", 0).unwrap();
    let err = lab.session().start_game(game.id, Some("p"), 0).unwrap_err();
    assert!(matches!(err, LabError::Forbidden(_)));
    lab.session().start_game(game.id, Some("ops"), 0).unwrap();

    let err = lab.session().resolve_round_seeded(game.id, Some("p"), 0, 1).unwrap_err();
    assert!(matches!(err, LabError::Forbidden(_)));
    let err = lab.session().resolve_round_seeded(game.id, None, 0, 1).unwrap_err();
    assert_eq!(err, LabError::Unauthenticated);
    lab.session().resolve_round_seeded(game.id, Some(HOST), 0, 1).unwrap();
}

#[test]
fn waiting_game_cannot_be_resolved() {
    let mut lab = Lab::new(LabConfig::default());
    let game = lab.create();
    let err = lab.session().resolve_round_seeded(game.id, Some(HOST), 0, 1).unwrap_err();
    assert!(matches!(
        err,
        LabError::InvalidGameState {
            status: GameStatus::Waiting,
            ..
        }
    ));
}

#[test]
fn completed_game_rejects_every_write() {
    let mut lab = Lab::new(LabConfig {
        max_rounds: 1,
        ..stable_config()
    });
    let (game, teams) = lab.active_game(1);
    lab.session().resolve_round_seeded(game.id, Some(HOST), 2, 1).unwrap();

    let err = lab
        .session()
        .submit_decision(game.id, teams[0].id, 1, Allocations::new(), Some(&player(0)), 3)
        .unwrap_err();
    assert!(matches!(err, LabError::InvalidGameState { .. }));
    let err = lab.session().resolve_round_seeded(game.id, Some(HOST), 3, 1).unwrap_err();
    assert!(matches!(err, LabError::InvalidGameState { .. }));
    let err = lab.session().join_team(game.id, Some("late"), "Late", 3).unwrap_err();
    assert!(matches!(err, LabError::InvalidGameState { .. }));
    let err = lab.session().start_game(game.id, Some(HOST), 3).unwrap_err();
    assert!(matches!(err, LabError::InvalidGameState { .. }));
}

#[test]
fn join_by_code_is_case_insensitive() {
    let mut lab = Lab::new(LabConfig::default());
    let game = lab.create();
    let code = game.code.to_lowercase();
    let team = lab.session().join_team_by_code(&code, Some("p"), "Comets", 0).unwrap();
    assert_eq!(team.game_id, game.id);
    let err = lab.session().join_team_by_code("ZZZZZZ9", Some("p"), "X", 0).unwrap_err();
    assert!(matches!(err, LabError::NotFound { .. }));
}

#[test]
fn unknown_channel_rejected_before_write() {
    let mut lab = Lab::new(LabConfig::default());
    let (game, teams) = lab.active_game(1);
    let err = lab
        .session()
        .submit_decision(game.id, teams[0].id, 1, alloc(&[("blimp", 10)]), Some(&player(0)), 1)
        .unwrap_err();
    assert_eq!(err, LabError::UnknownChannel("blimp".into()));
    assert_eq!(lab.session().submission_progress(game.id).unwrap(), (0, 1));
}

#[test]
fn events_follow_each_operation() {
    let mut lab = Lab::new(stable_config());
    let (game, teams) = lab.active_game(2);
    lab.events.clear();

    lab.submit(&game, 0, &teams[0], 1, alloc(&[("web", 100_000)]));
    assert_eq!(
        lab.events.last(),
        Some(&LabEvent::DecisionReceived {
            game_id: game.id,
            team_id: teams[0].id,
            round_number: 1,
            submitted: 1,
            team_count: 2,
        })
    );

    lab.events.clear();
    lab.session().resolve_round_seeded(game.id, Some(HOST), 2, 1).unwrap();
    let kinds: Vec<&str> = lab.events.iter().map(|e| e.kind()).collect();
    assert_eq!(kinds, vec!["game_updated", "team_updated", "team_updated"]);
    assert!(lab.events.iter().all(|e| e.game_id() == game.id));
}

#[test]
fn round_history_is_queryable() {
    let mut lab = Lab::new(stable_config());
    let (game, teams) = lab.active_game(1);
    lab.submit(&game, 0, &teams[0], 1, alloc(&[("web", 300_000)]));
    lab.session().resolve_round_seeded(game.id, Some(HOST), 2, 1).unwrap();
    let history = lab.session().round_results(game.id, 1).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].downloads_earned, 3000);
    assert!(lab.session().round_results(game.id, 2).unwrap().is_empty());
}

#[test]
fn decision_for_missing_team_aborts_resolution() {
    let mut lab = Lab::new(stable_config());
    let (game, teams) = lab.active_game(2);
    lab.submit(&game, 0, &teams[0], 1, alloc(&[("web", 400_000)]));
    lab.store
        .upsert_decision(Decision {
            game_id: game.id,
            team_id: 999,
            round_number: 1,
            allocations: alloc(&[("web", 100_000)]),
            submitted_at_micros: 1,
        })
        .unwrap();
    lab.events.clear();

    let err = lab
        .session()
        .resolve_round_seeded(game.id, Some(HOST), 2, 1)
        .unwrap_err();
    assert_eq!(
        err,
        LabError::NotFound {
            entity: "team",
            id: "999".into()
        }
    );

    assert!(lab.session().round_results(game.id, 1).unwrap().is_empty());
    let snap = lab.session().snapshot(game.id).unwrap();
    assert_eq!(snap.game.budget_pool, game.budget_pool);
    assert_eq!(snap.game.current_round, 1);
    assert!(snap.teams.iter().all(|t| t.total_spent == 0));
    assert!(lab.events.is_empty());
}

#[test]
fn round_with_results_is_not_resolved_again() {
    let mut lab = Lab::new(stable_config());
    let (game, teams) = lab.active_game(1);
    // Results land for round 1 while the game still points at round 1.
    lab.store
        .commit_round(&RoundCommit {
            game_id: game.id,
            round_number: 1,
            results: vec![RoundResult {
                team_id: teams[0].id,
                round_number: 1,
                downloads_earned: 0,
                efficiency_score: 0.0,
                round_spending: 0,
                events: Vec::new(),
            }],
            teams: teams.clone(),
            game: game.clone(),
            pool_before: game.budget_pool,
            seed: None,
            resolved_at_micros: 1,
        })
        .unwrap();
    lab.events.clear();

    let err = lab
        .session()
        .resolve_round_seeded(game.id, Some(HOST), 2, 1)
        .unwrap_err();
    assert_eq!(err, LabError::AlreadyResolved { round: 1 });
    let snap = lab.session().snapshot(game.id).unwrap();
    assert_eq!(snap.game, game);
    assert_eq!(lab.session().round_results(game.id, 1).unwrap().len(), 1);
    assert!(lab.events.is_empty());
}
