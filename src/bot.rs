use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::sleep;

use crate::battle::{Battle, BattleHandle, JoinReply, SkipReply};
use crate::constants::{
    CATALOG_TTL_SECS, CLAIM_HISTORY_LIMIT, INTER_ROUND_DELAY_SECS, JOIN_TICKS, JOIN_WINDOW_SECS,
    MIN_PARTICIPANTS,
};
use crate::judge::{JudgeApi, ACCEPTED_VERDICT};
use crate::registry::{BattleRegistry, PendingCancels};
use crate::router::{parse_battle_args, Command, Interaction, HELP_TEXT};
use crate::selector::{select_problems, CatalogCache};
use crate::store::PointsStore;
use crate::transport::{ChatTransport, Controls};
use crate::types::{BattlePhase, ChatId, LeaderboardResponse, SelectedProblem, UserId};

#[derive(Clone, Copy, Debug)]
pub struct BotOptions {
    pub join_window: Duration,
    pub join_ticks: u32,
    pub inter_round_delay: Duration,
    pub catalog_ttl: Duration,
}

impl Default for BotOptions {
    fn default() -> Self {
        Self {
            join_window: Duration::from_secs(JOIN_WINDOW_SECS),
            join_ticks: JOIN_TICKS,
            inter_round_delay: Duration::from_secs(INTER_ROUND_DELAY_SECS),
            catalog_ttl: Duration::from_secs(CATALOG_TTL_SECS),
        }
    }
}

/// Who issued an inbound command or interaction, and where.
#[derive(Clone, Debug)]
pub struct CommandContext {
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub display_name: String,
}

struct BotInner<J, T> {
    judge: J,
    transport: T,
    store: Mutex<PointsStore>,
    battles: BattleRegistry,
    pending_cancels: PendingCancels,
    catalog: Mutex<CatalogCache>,
    options: BotOptions,
}

/// The battle orchestration core. Cheap to clone; all shared state lives
/// behind one `Arc`. One instance serves every chat concurrently, with
/// per-battle locking so chats never serialize against each other.
pub struct Bot<J: JudgeApi, T: ChatTransport> {
    inner: Arc<BotInner<J, T>>,
}

impl<J: JudgeApi, T: ChatTransport> Clone for Bot<J, T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<J: JudgeApi, T: ChatTransport> Bot<J, T> {
    pub fn new(judge: J, transport: T, store: PointsStore, options: BotOptions) -> Self {
        Self {
            inner: Arc::new(BotInner {
                judge,
                transport,
                store: Mutex::new(store),
                battles: BattleRegistry::new(),
                pending_cancels: PendingCancels::new(),
                catalog: Mutex::new(CatalogCache::new(options.catalog_ttl)),
                options,
            }),
        }
    }

    pub fn battles(&self) -> &BattleRegistry {
        &self.inner.battles
    }

    pub async fn leaderboard_response(
        &self,
        chat_id: ChatId,
        limit: Option<usize>,
    ) -> LeaderboardResponse {
        self.inner.store.lock().await.build_response(chat_id, limit)
    }

    pub async fn handle_command(&self, ctx: &CommandContext, command: Command) {
        match command {
            Command::Start => {
                self.post(
                    ctx.chat_id,
                    "Codeforces Battle Bot. Use /help to see available commands.",
                )
                .await;
            }
            Command::Help => self.post(ctx.chat_id, HELP_TEXT).await,
            Command::SetHandle { args } => self.set_handle(ctx, &args).await,
            Command::ListUsers => self.list_users(ctx.chat_id).await,
            Command::Leaderboard => self.leaderboard(ctx.chat_id).await,
            Command::UserStats => self.user_stats(ctx).await,
            Command::CreateBattle { args } => self.create_battle(ctx, &args).await,
            Command::CancelBattle => self.cancel_battle(ctx).await,
            Command::SkipRound => self.skip_round(ctx).await,
        }
    }

    pub async fn handle_interaction(
        &self,
        ctx: &CommandContext,
        interaction_id: &str,
        interaction: Interaction,
    ) {
        match interaction {
            Interaction::Ready { chat_id } => self.on_ready(chat_id, ctx, interaction_id).await,
            Interaction::Finished { chat_id, round } => {
                self.on_claim_finished(chat_id, ctx.user_id, round, interaction_id)
                    .await
            }
            Interaction::ConfirmCancel { chat_id } => {
                self.on_confirm_cancel(chat_id, ctx.user_id, interaction_id)
                    .await
            }
            Interaction::DeclineCancel { chat_id } => {
                self.on_decline_cancel(chat_id, ctx.user_id, interaction_id)
                    .await
            }
        }
    }

    async fn set_handle(&self, ctx: &CommandContext, args: &[String]) {
        let Some(handle) = args.first() else {
            self.post(ctx.chat_id, "Usage: /sethandle <handle>").await;
            return;
        };
        let Some(profile) = self.inner.judge.user_profile(handle).await else {
            self.post(ctx.chat_id, "Codeforces handle not found.").await;
            return;
        };
        {
            let mut store = self.inner.store.lock().await;
            store.upsert_registration(
                ctx.chat_id,
                ctx.user_id,
                &ctx.display_name,
                &profile.handle,
                profile.rating,
            );
        }
        println!(
            "[battle] chat {}: user {} linked handle {}",
            ctx.chat_id, ctx.user_id, profile.handle
        );
        self.post(
            ctx.chat_id,
            &format!("Handle set: {} (rating {})", profile.handle, profile.rating),
        )
        .await;
    }

    async fn list_users(&self, chat_id: ChatId) {
        let rows = { self.inner.store.lock().await.registrations(chat_id) };
        if rows.is_empty() {
            self.post(chat_id, "No users registered in this chat.").await;
            return;
        }
        let mut lines = vec!["Registered users:".to_string()];
        for row in rows {
            lines.push(format!(
                "- {} ({}) rating {}",
                row.display_name, row.handle, row.rating
            ));
        }
        self.post(chat_id, &lines.join("\n")).await;
    }

    async fn leaderboard(&self, chat_id: ChatId) {
        let rows = { self.inner.store.lock().await.leaderboard(chat_id) };
        if rows.is_empty() {
            self.post(chat_id, "No leaderboard data yet.").await;
            return;
        }
        let mut lines = vec!["Leaderboard:".to_string()];
        for (position, row) in rows.iter().enumerate() {
            lines.push(format!(
                "{}. {} ({}) - {}pts, rating {}",
                position + 1,
                row.display_name,
                row.handle,
                row.points,
                row.rating
            ));
        }
        self.post(chat_id, &lines.join("\n")).await;
    }

    async fn user_stats(&self, ctx: &CommandContext) {
        let stats = {
            self.inner
                .store
                .lock()
                .await
                .stats(ctx.chat_id, ctx.user_id)
        };
        let Some(stats) = stats else {
            self.post(ctx.chat_id, "No stats yet. Join a battle to start!")
                .await;
            return;
        };
        self.post(
            ctx.chat_id,
            &format!(
                "Your statistics:\nPoints: {}\nBattles: {}\nFirst solves: {}",
                stats.points, stats.battles, stats.first_solves
            ),
        )
        .await;
    }

    async fn create_battle(&self, ctx: &CommandContext, args: &[String]) {
        let chat_id = ctx.chat_id;
        if self.inner.battles.contains(chat_id).await {
            self.post(chat_id, "A battle is already active in this chat.")
                .await;
            return;
        }
        let registration = {
            self.inner
                .store
                .lock()
                .await
                .registration(chat_id, ctx.user_id)
        };
        let Some(registration) = registration else {
            self.post(chat_id, "Set your Codeforces handle first with /sethandle")
                .await;
            return;
        };
        let (count, ratings) = match parse_battle_args(args) {
            Ok(parsed) => parsed,
            Err(error) => {
                self.post(
                    chat_id,
                    &format!(
                        "Invalid arguments: {error}\n\n\
                         Usage: /createbattle <num_problems> <rating1> [rating2 ...]\n\
                         Examples:\n\
                         /createbattle 3 1200 1400 1600\n\
                         /createbattle 5 1000 1500"
                    ),
                )
                .await;
                return;
            }
        };

        let battle = Battle::new(chat_id, ctx.user_id, &registration.handle, count, ratings);
        let handle = Arc::new(BattleHandle::new(battle));
        if !self.inner.battles.insert(handle.clone()).await {
            self.post(chat_id, "A battle is already active in this chat.")
                .await;
            return;
        }
        println!(
            "[battle] chat {chat_id}: battle created by {} ({count} problems)",
            registration.handle
        );

        let text = {
            let state = handle.state.lock().await;
            join_announcement(&state, Some(self.inner.options.join_window))
        };
        let message_id = self
            .inner
            .transport
            .post_message(chat_id, &text, Some(ready_button(chat_id)))
            .await;
        {
            handle.state.lock().await.join_message_id = message_id;
        }

        let bot = self.clone();
        tokio::spawn(async move { bot.join_countdown(chat_id).await });
    }

    /// Join-phase timer. Exits quietly whenever the battle disappears or
    /// leaves the joining phase under its feet.
    async fn join_countdown(&self, chat_id: ChatId) {
        let ticks = self.inner.options.join_ticks.max(1);
        let interval = self.inner.options.join_window / ticks;

        for tick in 1..=ticks {
            sleep(interval).await;
            let Some(handle) = self.inner.battles.get(chat_id).await else {
                return;
            };
            let (text, message_id) = {
                let state = handle.state.lock().await;
                if state.phase != BattlePhase::Joining {
                    return;
                }
                let remaining = self
                    .inner
                    .options
                    .join_window
                    .saturating_sub(interval * tick);
                (
                    join_announcement(&state, Some(remaining)),
                    state.join_message_id,
                )
            };
            if let Some(message_id) = message_id {
                if !self
                    .inner
                    .transport
                    .edit_message(chat_id, message_id, &text, Some(ready_button(chat_id)))
                    .await
                {
                    eprintln!("[battle] chat {chat_id}: countdown update failed");
                }
            }
        }

        let Some(handle) = self.inner.battles.get(chat_id).await else {
            return;
        };
        let enough = {
            let mut state = handle.state.lock().await;
            if state.phase != BattlePhase::Joining {
                return;
            }
            if state.participants.len() < MIN_PARTICIPANTS {
                state.cancel();
                false
            } else {
                state.begin_running();
                println!(
                    "[battle] chat {chat_id}: starting with {} participants",
                    state.participants.len()
                );
                true
            }
        };
        if !enough {
            self.inner.battles.remove(chat_id).await;
            self.post(
                chat_id,
                "Battle cancelled: not enough participants (minimum 2).",
            )
            .await;
            println!("[battle] chat {chat_id}: cancelled, insufficient participants");
            return;
        }

        self.run_battle(chat_id, handle).await;
    }

    /// Round supervisor: selects problems, then walks the rounds, sleeping on
    /// the battle's event channel until each one resolves.
    async fn run_battle(&self, chat_id: ChatId, handle: Arc<BattleHandle>) {
        let (ratings, participant_handles, participant_ids, count) = {
            let state = handle.state.lock().await;
            (
                state.ratings.clone(),
                state.participant_handles(),
                state.participant_ids(),
                state.num_problems,
            )
        };

        let catalog = {
            let mut cache = self.inner.catalog.lock().await;
            cache.get(&self.inner.judge).await
        };
        let selected = select_problems(
            &self.inner.judge,
            &catalog,
            &ratings,
            &participant_handles,
            count,
        )
        .await;
        println!(
            "[battle] chat {chat_id}: selected {}/{count} problems",
            selected.len()
        );

        if selected.len() < count {
            let found = selected.len();
            {
                let mut state = handle.state.lock().await;
                if state.phase == BattlePhase::Cancelled {
                    return;
                }
                state.cancel();
            }
            self.inner.battles.remove(chat_id).await;
            self.post(
                chat_id,
                &format!("Failed to select enough problems (found {found} of {count}). Battle cancelled."),
            )
            .await;
            return;
        }

        {
            let mut state = handle.state.lock().await;
            if state.phase == BattlePhase::Cancelled {
                return;
            }
            state.problems = selected;
        }
        {
            let mut store = self.inner.store.lock().await;
            store.record_battles_played(chat_id, &participant_ids);
        }

        for index in 1..=count {
            let announcement = {
                let mut state = handle.state.lock().await;
                if state.phase == BattlePhase::Cancelled {
                    return;
                }
                state.begin_round(index);
                state
                    .current_problem()
                    .map(|problem| round_announcement(index, count, problem))
            };
            let Some(text) = announcement else {
                return;
            };
            let message_id = self
                .inner
                .transport
                .post_message(chat_id, &text, Some(finished_button(chat_id, index)))
                .await;
            {
                handle.state.lock().await.round_message_id = message_id;
            }
            println!("[battle] chat {chat_id}: round {index}/{count} posted");

            let mut events = handle.subscribe();
            loop {
                {
                    let state = handle.state.lock().await;
                    if state.phase == BattlePhase::Cancelled {
                        println!("[battle] chat {chat_id}: cancelled during round {index}");
                        return;
                    }
                    if state.outcome.is_some() {
                        break;
                    }
                }
                if events.changed().await.is_err() {
                    return;
                }
            }

            if index < count {
                sleep(self.inner.options.inter_round_delay).await;
                let tags = {
                    let state = handle.state.lock().await;
                    if state.phase == BattlePhase::Cancelled {
                        println!("[battle] chat {chat_id}: cancelled between rounds");
                        return;
                    }
                    state.participant_tags()
                };
                self.post(chat_id, &format!("Next round starting! {tags}"))
                    .await;
            }
        }

        {
            handle.state.lock().await.finish();
        }
        self.inner.battles.remove(chat_id).await;
        self.post(
            chat_id,
            &format!(
                "Battle finished! All {count} rounds completed. Use /leaderboard to see the standings."
            ),
        )
        .await;
        println!("[battle] chat {chat_id}: battle finalized");
    }

    async fn on_ready(&self, chat_id: ChatId, ctx: &CommandContext, interaction_id: &str) {
        let Some(handle) = self.inner.battles.get(chat_id).await else {
            self.answer(interaction_id, Some("Battle expired or not found"))
                .await;
            return;
        };
        let registration = {
            self.inner
                .store
                .lock()
                .await
                .registration(chat_id, ctx.user_id)
        };
        let Some(registration) = registration else {
            self.answer(interaction_id, Some("Set your handle first with /sethandle"))
                .await;
            return;
        };

        let (reply, text, message_id) = {
            let mut state = handle.state.lock().await;
            let reply = state.join(ctx.user_id, &registration.handle);
            (reply, join_announcement(&state, None), state.join_message_id)
        };
        match reply {
            JoinReply::NotJoining => {
                self.answer(interaction_id, Some("Battle already started"))
                    .await;
            }
            JoinReply::AlreadyJoined => {
                self.answer(interaction_id, Some("You already joined")).await;
            }
            JoinReply::Joined(total) => {
                println!(
                    "[battle] chat {chat_id}: {} joined ({total} participants)",
                    registration.handle
                );
                if let Some(message_id) = message_id {
                    if !self
                        .inner
                        .transport
                        .edit_message(chat_id, message_id, &text, Some(ready_button(chat_id)))
                        .await
                    {
                        eprintln!("[battle] chat {chat_id}: failed to update join message");
                    }
                }
                self.answer(interaction_id, None).await;
            }
        }
    }

    async fn on_claim_finished(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        round: usize,
        interaction_id: &str,
    ) {
        let Some(handle) = self.inner.battles.get(chat_id).await else {
            self.answer(interaction_id, Some("No active battle")).await;
            return;
        };

        // The state lock is held across verification: concurrent claims for
        // the same battle serialize here, so the first verified claim wins
        // and every later one observes the recorded outcome.
        let mut state = handle.state.lock().await;
        if !state.is_participant(user_id) {
            drop(state);
            self.answer(interaction_id, Some("You're not in this battle"))
                .await;
            return;
        }
        if state.phase != BattlePhase::Running || state.round != round {
            drop(state);
            self.answer(interaction_id, Some("This round is no longer active"))
                .await;
            return;
        }
        if state.outcome.is_some() {
            drop(state);
            self.answer(interaction_id, Some("Round already completed"))
                .await;
            return;
        }
        let Some(problem) = state.current_problem().cloned() else {
            drop(state);
            self.answer(interaction_id, Some("No active round")).await;
            return;
        };
        let handle_name = state
            .participants
            .get(&user_id)
            .cloned()
            .unwrap_or_default();

        let submissions = self
            .inner
            .judge
            .submission_history(&handle_name, CLAIM_HISTORY_LIMIT)
            .await;
        let accepted = submissions.iter().any(|submission| {
            submission.problem == problem.id
                && submission.verdict.as_deref() == Some(ACCEPTED_VERDICT)
        });
        if !accepted {
            drop(state);
            self.answer(
                interaction_id,
                Some("No accepted submission found yet. Keep trying!"),
            )
            .await;
            return;
        }

        let points = problem.points;
        if !state.record_win(user_id, &handle_name, points) {
            drop(state);
            self.answer(interaction_id, Some("Round already completed"))
                .await;
            return;
        }
        {
            let mut store = self.inner.store.lock().await;
            store.record_points(chat_id, user_id, points, true);
        }
        let round_message_id = state.round_message_id;
        let total = state.num_problems;
        drop(state);
        handle.signal_round_event();
        println!("[battle] chat {chat_id}: {handle_name} won round {round} (+{points}pts)");

        if let Some(message_id) = round_message_id {
            let text = format!(
                "Round {round}/{total} complete!\nWinner: {handle_name}\nPoints: +{points}"
            );
            if !self
                .inner
                .transport
                .edit_message(chat_id, message_id, &text, None)
                .await
            {
                eprintln!("[battle] chat {chat_id}: failed to update round message");
            }
        }
        self.post(
            chat_id,
            &format!("Round {round} won by {handle_name}! (+{points}pts)"),
        )
        .await;
        self.answer(interaction_id, None).await;
    }

    async fn cancel_battle(&self, ctx: &CommandContext) {
        let Some(handle) = self.inner.battles.get(ctx.chat_id).await else {
            self.post(ctx.chat_id, "No active battle.").await;
            return;
        };
        let creator_id = { handle.state.lock().await.creator_id };
        if creator_id != ctx.user_id {
            self.post(ctx.chat_id, "Only the creator can cancel the battle.")
                .await;
            return;
        }
        let controls = Controls::pair(
            ("Yes, cancel", format!("confirmcancel:{}", ctx.chat_id)),
            ("No, continue", format!("declinecancel:{}", ctx.chat_id)),
        );
        let message_id = self
            .inner
            .transport
            .post_message(
                ctx.chat_id,
                "Cancel this battle? All progress will be lost.",
                Some(controls),
            )
            .await;
        if let Some(message_id) = message_id {
            self.inner.pending_cancels.set(ctx.chat_id, message_id).await;
        }
    }

    async fn on_confirm_cancel(&self, chat_id: ChatId, user_id: UserId, interaction_id: &str) {
        let Some(handle) = self.inner.battles.get(chat_id).await else {
            if let Some(message_id) = self.inner.pending_cancels.take(chat_id).await {
                let _ = self
                    .inner
                    .transport
                    .edit_message(chat_id, message_id, "Battle no longer active.", None)
                    .await;
            }
            self.answer(interaction_id, None).await;
            return;
        };
        {
            let mut state = handle.state.lock().await;
            if state.creator_id != user_id {
                drop(state);
                self.answer(interaction_id, Some("Only the creator can cancel the battle"))
                    .await;
                return;
            }
            state.cancel();
        }
        self.inner.battles.remove(chat_id).await;
        handle.signal_round_event();

        if let Some(message_id) = self.inner.pending_cancels.take(chat_id).await {
            if !self
                .inner
                .transport
                .edit_message(chat_id, message_id, "Battle cancelled by creator.", None)
                .await
            {
                self.post(chat_id, "Battle cancelled by creator.").await;
            }
        } else {
            self.post(chat_id, "Battle cancelled by creator.").await;
        }
        self.answer(interaction_id, None).await;
        println!("[battle] chat {chat_id}: battle cancelled by creator");
    }

    async fn on_decline_cancel(&self, chat_id: ChatId, user_id: UserId, interaction_id: &str) {
        if let Some(handle) = self.inner.battles.get(chat_id).await {
            let creator_id = { handle.state.lock().await.creator_id };
            if creator_id != user_id {
                self.answer(interaction_id, Some("Only the creator can answer this prompt"))
                    .await;
                return;
            }
        }
        if let Some(message_id) = self.inner.pending_cancels.take(chat_id).await {
            let _ = self
                .inner
                .transport
                .edit_message(chat_id, message_id, "Battle continues!", None)
                .await;
        }
        self.answer(interaction_id, None).await;
    }

    async fn skip_round(&self, ctx: &CommandContext) {
        let Some(handle) = self.inner.battles.get(ctx.chat_id).await else {
            self.post(ctx.chat_id, "No active battle.").await;
            return;
        };
        let result = {
            let mut state = handle.state.lock().await;
            if state.creator_id != ctx.user_id {
                Err("Only the creator can skip rounds.")
            } else {
                match state.skip_current_round() {
                    SkipReply::Skipped(round) => Ok(round),
                    SkipReply::NotRunning => Err("The battle is not running yet."),
                    SkipReply::NoActiveRound => Err("No active round to skip."),
                }
            }
        };
        match result {
            Ok(round) => {
                handle.signal_round_event();
                println!(
                    "[battle] chat {}: round {round} skipped by creator",
                    ctx.chat_id
                );
                self.post(ctx.chat_id, &format!("Round {round} skipped. Moving on..."))
                    .await;
            }
            Err(message) => self.post(ctx.chat_id, message).await,
        }
    }

    async fn post(&self, chat_id: ChatId, text: &str) {
        let _ = self.inner.transport.post_message(chat_id, text, None).await;
    }

    async fn answer(&self, interaction_id: &str, alert: Option<&str>) {
        self.inner
            .transport
            .answer_interaction(interaction_id, alert)
            .await;
    }
}

fn ready_button(chat_id: ChatId) -> Controls {
    Controls::single("Ready", format!("ready:{chat_id}"))
}

fn finished_button(chat_id: ChatId, round: usize) -> Controls {
    Controls::single("Finished", format!("finished:{chat_id}:{round}"))
}

fn join_announcement(battle: &Battle, remaining: Option<Duration>) -> String {
    let creator = battle
        .participants
        .get(&battle.creator_id)
        .cloned()
        .unwrap_or_default();
    let ratings = battle
        .ratings
        .iter()
        .map(i64::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    let joined = battle.participant_handles().join(", ");
    let mut text = format!(
        "Battle created by {creator}\nProblems: {}\nRatings: {ratings}\n\nParticipants ({}): {joined}",
        battle.num_problems,
        battle.participants.len()
    );
    if let Some(remaining) = remaining {
        text.push_str(&format!("\nTime left: ~{}s", remaining.as_secs()));
    }
    text.push_str("\n\nPress Ready to join!");
    text
}

fn round_announcement(index: usize, total: usize, problem: &SelectedProblem) -> String {
    let rating = problem
        .rating
        .map(|rating| rating.to_string())
        .unwrap_or_else(|| "unrated".to_string());
    format!(
        "Round {index}/{total}\n\nProblem: {}\nLink: {}\nRating: {rating}\nPoints: {}\n\nSolve it on Codeforces and press Finished!",
        problem.name,
        problem.id.url(),
        problem.points
    )
}
