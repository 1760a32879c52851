use std::collections::BTreeMap;

use tokio::sync::{watch, Mutex};

use crate::types::{BattlePhase, ChatId, MessageId, RoundOutcome, SelectedProblem, UserId};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinReply {
    Joined(usize),
    AlreadyJoined,
    NotJoining,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReply {
    Skipped(usize),
    NoActiveRound,
    NotRunning,
}

/// One battle's state. All fields are only mutated through the transition
/// methods below, and always under the owning `BattleHandle` mutex.
#[derive(Clone, Debug)]
pub struct Battle {
    pub chat_id: ChatId,
    pub creator_id: UserId,
    pub participants: BTreeMap<UserId, String>,
    pub ratings: Vec<i64>,
    pub num_problems: usize,
    pub problems: Vec<SelectedProblem>,
    pub phase: BattlePhase,
    /// 1-based round index, 0 until the first round is announced.
    pub round: usize,
    pub outcome: Option<RoundOutcome>,
    pub join_message_id: Option<MessageId>,
    pub round_message_id: Option<MessageId>,
}

impl Battle {
    pub fn new(
        chat_id: ChatId,
        creator_id: UserId,
        creator_handle: &str,
        num_problems: usize,
        ratings: Vec<i64>,
    ) -> Self {
        let mut participants = BTreeMap::new();
        participants.insert(creator_id, creator_handle.to_string());
        Self {
            chat_id,
            creator_id,
            participants,
            ratings,
            num_problems,
            problems: Vec::new(),
            phase: BattlePhase::Joining,
            round: 0,
            outcome: None,
            join_message_id: None,
            round_message_id: None,
        }
    }

    pub fn join(&mut self, user_id: UserId, handle: &str) -> JoinReply {
        if self.phase != BattlePhase::Joining {
            return JoinReply::NotJoining;
        }
        if self.participants.contains_key(&user_id) {
            return JoinReply::AlreadyJoined;
        }
        self.participants.insert(user_id, handle.to_string());
        JoinReply::Joined(self.participants.len())
    }

    pub fn is_participant(&self, user_id: UserId) -> bool {
        self.participants.contains_key(&user_id)
    }

    pub fn participant_handles(&self) -> Vec<String> {
        self.participants.values().cloned().collect()
    }

    pub fn participant_ids(&self) -> Vec<UserId> {
        self.participants.keys().copied().collect()
    }

    pub fn participant_tags(&self) -> String {
        self.participants
            .values()
            .map(|handle| format!("@{handle}"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn begin_running(&mut self) {
        self.phase = BattlePhase::Running;
    }

    /// Resets round bookkeeping for the 1-based round `index`.
    pub fn begin_round(&mut self, index: usize) {
        self.round = index;
        self.outcome = None;
        self.round_message_id = None;
    }

    pub fn current_problem(&self) -> Option<&SelectedProblem> {
        if self.round == 0 {
            return None;
        }
        self.problems.get(self.round - 1)
    }

    /// Check-and-set of the round outcome. Returns false if the round was
    /// already resolved, in which case nothing is recorded.
    pub fn record_win(&mut self, user_id: UserId, handle: &str, points: i64) -> bool {
        if self.outcome.is_some() {
            return false;
        }
        self.outcome = Some(RoundOutcome::Won {
            user_id,
            handle: handle.to_string(),
            points,
        });
        true
    }

    pub fn skip_current_round(&mut self) -> SkipReply {
        if self.phase != BattlePhase::Running {
            return SkipReply::NotRunning;
        }
        if self.round == 0 || self.outcome.is_some() {
            return SkipReply::NoActiveRound;
        }
        self.outcome = Some(RoundOutcome::Skipped);
        SkipReply::Skipped(self.round)
    }

    pub fn cancel(&mut self) {
        self.phase = BattlePhase::Cancelled;
    }

    pub fn finish(&mut self) {
        self.phase = BattlePhase::Finished;
    }
}

/// Shared handle to a live battle: the state mutex serializes every mutation
/// and claim resolution, the watch channel wakes the round supervisor as soon
/// as an outcome or cancellation lands.
pub struct BattleHandle {
    pub chat_id: ChatId,
    pub state: Mutex<Battle>,
    round_events: watch::Sender<u64>,
}

impl BattleHandle {
    pub fn new(battle: Battle) -> Self {
        let (round_events, _) = watch::channel(0);
        Self {
            chat_id: battle.chat_id,
            state: Mutex::new(battle),
            round_events,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.round_events.subscribe()
    }

    pub fn signal_round_event(&self) {
        self.round_events.send_modify(|seq| *seq += 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn battle() -> Battle {
        Battle::new(-100, 1, "alice", 3, vec![1200, 1400, 1600])
    }

    #[test]
    fn creator_is_auto_joined() {
        let battle = battle();
        assert!(battle.is_participant(1));
        assert_eq!(battle.participants.len(), 1);
    }

    #[test]
    fn duplicate_join_is_a_no_op() {
        let mut battle = battle();
        assert_eq!(battle.join(2, "bob"), JoinReply::Joined(2));
        assert_eq!(battle.join(2, "bob"), JoinReply::AlreadyJoined);
        assert_eq!(battle.participants.len(), 2);
    }

    #[test]
    fn join_is_rejected_outside_joining_phase() {
        let mut battle = battle();
        battle.begin_running();
        assert_eq!(battle.join(2, "bob"), JoinReply::NotJoining);
    }

    #[test]
    fn record_win_sets_outcome_at_most_once() {
        let mut battle = battle();
        battle.begin_running();
        battle.problems = vec![SelectedProblem {
            id: crate::types::ProblemRef::new(1, "A"),
            name: "P".to_string(),
            rating: Some(1200),
            points: 3,
        }];
        battle.begin_round(1);
        assert!(battle.record_win(1, "alice", 3));
        assert!(!battle.record_win(2, "bob", 3));
        match battle.outcome {
            Some(RoundOutcome::Won { user_id, .. }) => assert_eq!(user_id, 1),
            ref other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn skip_requires_running_phase_and_open_round() {
        let mut battle = battle();
        assert_eq!(battle.skip_current_round(), SkipReply::NotRunning);
        battle.begin_running();
        assert_eq!(battle.skip_current_round(), SkipReply::NoActiveRound);
        battle.begin_round(2);
        assert_eq!(battle.skip_current_round(), SkipReply::Skipped(2));
        assert_eq!(battle.skip_current_round(), SkipReply::NoActiveRound);
        assert_eq!(battle.outcome, Some(RoundOutcome::Skipped));
    }

    #[test]
    fn begin_round_clears_previous_outcome() {
        let mut battle = battle();
        battle.begin_running();
        battle.begin_round(1);
        battle.record_win(1, "alice", 3);
        battle.begin_round(2);
        assert_eq!(battle.outcome, None);
        assert_eq!(battle.round, 2);
    }

    #[tokio::test]
    async fn concurrent_claims_yield_exactly_one_winner() {
        let mut inner = battle();
        inner.join(2, "bob");
        inner.begin_running();
        inner.begin_round(1);
        let handle = Arc::new(BattleHandle::new(inner));

        let mut tasks = Vec::new();
        for (user_id, name) in [(1, "alice"), (2, "bob")] {
            let handle = handle.clone();
            tasks.push(tokio::spawn(async move {
                let mut state = handle.state.lock().await;
                // mimic the verification delay while holding the claim lock
                tokio::time::sleep(Duration::from_millis(5)).await;
                state.record_win(user_id, name, 3)
            }));
        }

        let mut wins = 0;
        for task in tasks {
            if task.await.expect("claim task completes") {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
    }

    #[tokio::test]
    async fn round_event_signal_wakes_subscriber() {
        let handle = Arc::new(BattleHandle::new(battle()));
        let mut events = handle.subscribe();
        handle.signal_round_event();
        tokio::time::timeout(Duration::from_secs(1), events.changed())
            .await
            .expect("signal arrives")
            .expect("channel stays open");
    }
}
