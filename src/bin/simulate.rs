use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use cf_battle_server::bot::{Bot, BotOptions, CommandContext};
use cf_battle_server::judge::{JudgeApi, ACCEPTED_VERDICT};
use cf_battle_server::router::{Command, Interaction};
use cf_battle_server::store::PointsStore;
use cf_battle_server::transport::{ChatTransport, Controls};
use cf_battle_server::types::{
    CatalogProblem, ChatId, MessageId, ProblemRef, SelectedProblem, Submission, UserId,
    UserProfile,
};
use clap::Parser;
use tokio::time::sleep;

const SIM_CHAT: ChatId = -1;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Number of simulated participants (2-10).
    #[arg(long)]
    players: Option<usize>,
    /// Number of problems in the battle (1-10).
    #[arg(long)]
    problems: Option<usize>,
    /// Target ratings, comma separated.
    #[arg(long, value_delimiter = ',')]
    ratings: Option<Vec<i64>>,
    /// Round the creator skips instead of anyone solving it.
    #[arg(long)]
    skip_round: Option<usize>,
    #[arg(long)]
    store: Option<PathBuf>,
}

static NEXT_MESSAGE_ID: AtomicI64 = AtomicI64::new(1);

/// Prints every outbound chat operation instead of delivering it anywhere.
#[derive(Clone, Default)]
struct ConsoleTransport;

impl ChatTransport for ConsoleTransport {
    async fn post_message(
        &self,
        chat_id: ChatId,
        text: &str,
        _controls: Option<Controls>,
    ) -> Option<MessageId> {
        let message_id = NEXT_MESSAGE_ID.fetch_add(1, Ordering::Relaxed);
        println!("[chat {chat_id}] {}", text.replace('\n', "\n             "));
        Some(message_id)
    }

    async fn edit_message(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        text: &str,
        _controls: Option<Controls>,
    ) -> bool {
        println!(
            "[chat {chat_id}] (edit #{message_id}) {}",
            text.replace('\n', "\n             ")
        );
        true
    }

    async fn answer_interaction(&self, interaction_id: &str, alert: Option<&str>) {
        if let Some(alert) = alert {
            println!("[answer {interaction_id}] {alert}");
        }
    }
}

/// Offline stand-in for the judge: a synthetic catalog plus a solve ledger
/// the scenario driver fills in as rounds progress.
#[derive(Clone)]
struct StubJudge {
    catalog: Arc<Vec<CatalogProblem>>,
    solved: Arc<StdMutex<HashMap<String, Vec<Submission>>>>,
}

impl StubJudge {
    fn new(ratings: &[i64], count: usize) -> Self {
        Self {
            catalog: Arc::new(build_catalog(ratings, count)),
            solved: Arc::new(StdMutex::new(HashMap::new())),
        }
    }

    fn solve(&self, handle: &str, problem: ProblemRef) {
        self.solved
            .lock()
            .expect("solve ledger lock")
            .entry(handle.to_string())
            .or_default()
            .push(Submission {
                problem,
                verdict: Some(ACCEPTED_VERDICT.to_string()),
            });
    }
}

impl JudgeApi for StubJudge {
    async fn user_profile(&self, handle: &str) -> Option<UserProfile> {
        Some(UserProfile {
            handle: handle.to_string(),
            rating: 1400,
        })
    }

    async fn submission_history(&self, handle: &str, _limit: usize) -> Vec<Submission> {
        self.solved
            .lock()
            .expect("solve ledger lock")
            .get(handle)
            .cloned()
            .unwrap_or_default()
    }

    async fn catalog(&self) -> Vec<CatalogProblem> {
        self.catalog.as_ref().clone()
    }
}

/// A few catalog entries per requested rating so selection always has fresh
/// candidates, plus spread for the two-ratings range mode.
fn build_catalog(ratings: &[i64], count: usize) -> Vec<CatalogProblem> {
    let mut catalog = Vec::new();
    let mut contest = 100;
    for rating in ratings {
        for _ in 0..count.max(2) {
            catalog.push(CatalogProblem {
                id: ProblemRef::new(contest, "A"),
                name: format!("Simulated Problem {contest}A"),
                rating: Some(*rating),
            });
            contest += 1;
        }
    }
    if ratings.len() == 2 {
        let lo = ratings.iter().min().copied().unwrap_or(800);
        let hi = ratings.iter().max().copied().unwrap_or(800);
        let mut rating = lo;
        while rating <= hi {
            catalog.push(CatalogProblem {
                id: ProblemRef::new(contest, "A"),
                name: format!("Simulated Problem {contest}A"),
                rating: Some(rating),
            });
            contest += 1;
            rating += 100;
        }
    }
    catalog
}

fn sim_handle(user_id: UserId) -> String {
    format!("sim{user_id}")
}

fn ctx(user_id: UserId) -> CommandContext {
    CommandContext {
        chat_id: SIM_CHAT,
        user_id,
        display_name: sim_handle(user_id),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let players = cli.players.unwrap_or(3).clamp(2, 10);
    let problems = cli.problems.unwrap_or(3).clamp(1, 10);
    let ratings = cli
        .ratings
        .unwrap_or_else(|| vec![1200, 1400, 1600])
        .into_iter()
        .map(|rating| rating.clamp(800, 3500))
        .collect::<Vec<_>>();

    let store_path = cli.store.unwrap_or_else(|| {
        std::env::temp_dir()
            .join(format!("cf-battle-sim-{}", std::process::id()))
            .join("points.json")
    });

    let judge = StubJudge::new(&ratings, problems);
    let options = BotOptions {
        join_window: Duration::from_secs(2),
        join_ticks: 2,
        inter_round_delay: Duration::from_millis(500),
        ..BotOptions::default()
    };
    let bot = Bot::new(
        judge.clone(),
        ConsoleTransport,
        PointsStore::new(store_path),
        options,
    );

    println!("[simulate] players={players} problems={problems} ratings={ratings:?}");

    for user_id in 1..=players as UserId {
        bot.handle_command(
            &ctx(user_id),
            Command::SetHandle {
                args: vec![sim_handle(user_id)],
            },
        )
        .await;
    }

    let mut args = vec![problems.to_string()];
    args.extend(ratings.iter().map(i64::to_string));
    bot.handle_command(&ctx(1), Command::CreateBattle { args }).await;
    for user_id in 2..=players as UserId {
        bot.handle_interaction(
            &ctx(user_id),
            &format!("ready-{user_id}"),
            Interaction::Ready { chat_id: SIM_CHAT },
        )
        .await;
    }

    for round in 1..=problems {
        let Some(problem) = wait_for_round(&bot, round).await else {
            eprintln!("[simulate] battle ended before round {round}");
            std::process::exit(1);
        };

        if cli.skip_round == Some(round) {
            bot.handle_command(&ctx(1), Command::SkipRound).await;
            continue;
        }

        // winners rotate so the final leaderboard has some spread
        let winner = ((round - 1) % players + 1) as UserId;
        let handle = sim_handle(winner);
        judge.solve(&handle, problem.id.clone());
        bot.handle_interaction(
            &ctx(winner),
            &format!("claim-{winner}-{round}"),
            Interaction::Finished {
                chat_id: SIM_CHAT,
                round,
            },
        )
        .await;
    }

    if !wait_for_finish(&bot).await {
        eprintln!("[simulate] battle did not finalize in time");
        std::process::exit(1);
    }

    let response = bot.leaderboard_response(SIM_CHAT, None).await;
    println!(
        "{}",
        serde_json::to_string_pretty(&response).expect("leaderboard should serialize")
    );
}

/// Polls until the given round is open, returning its problem. `None` means
/// the battle disappeared first.
async fn wait_for_round<J: JudgeApi, T: ChatTransport>(
    bot: &Bot<J, T>,
    round: usize,
) -> Option<SelectedProblem> {
    for _ in 0..200 {
        let Some(handle) = bot.battles().get(SIM_CHAT).await else {
            sleep(Duration::from_millis(50)).await;
            continue;
        };
        {
            let state = handle.state.lock().await;
            if state.round == round && state.outcome.is_none() {
                if let Some(problem) = state.current_problem() {
                    return Some(problem.clone());
                }
            }
        }
        sleep(Duration::from_millis(50)).await;
    }
    None
}

async fn wait_for_finish<J: JudgeApi, T: ChatTransport>(bot: &Bot<J, T>) -> bool {
    for _ in 0..200 {
        if !bot.battles().contains(SIM_CHAT).await {
            return true;
        }
        sleep(Duration::from_millis(50)).await;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_covers_every_requested_rating() {
        let ratings = vec![1200, 1800, 2400];
        let catalog = build_catalog(&ratings, 3);
        for rating in ratings {
            assert!(
                catalog
                    .iter()
                    .filter(|problem| problem.rating == Some(rating))
                    .count()
                    >= 3
            );
        }
    }

    #[test]
    fn two_rating_catalog_fills_the_range() {
        let catalog = build_catalog(&[1000, 1500], 5);
        for rating in [1100, 1200, 1300, 1400] {
            assert!(catalog.iter().any(|problem| problem.rating == Some(rating)));
        }
    }

    #[test]
    fn catalog_keys_are_unique() {
        let catalog = build_catalog(&[1200, 1200, 1400], 4);
        let mut keys = std::collections::HashSet::new();
        for problem in &catalog {
            assert!(keys.insert(problem.id.key()));
        }
    }
}
