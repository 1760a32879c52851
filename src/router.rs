use crate::constants::{MAX_PROBLEMS, MAX_RATING, MIN_PROBLEMS, MIN_RATING};
use crate::types::ChatId;

pub const HELP_TEXT: &str = "Codeforces Battle Bot commands

User setup:
/sethandle <handle> - link your Codeforces handle
/listusers - registered users in this chat

League:
/leaderboard - chat leaderboard
/userstats - your personal statistics

Battles:
/createbattle <num> <ratings...> - start a battle
  /createbattle 3 1200 1400 1600 (one problem per rating)
  /createbattle 5 1000 1500 (5 random problems between 1000-1500)
/cancelbattle - cancel the active battle (creator only)
/skipround - skip the current round (creator only)

Points:
800-999: 1pt | 1000-1199: 2pts | 1200-1399: 3pts
1400-1499: 4pts | 1500-1599: 5pts | 1600-1699: 6pts
1700-1799: 7pts | 1800-1899: 8pts | 1900-1999: 10pts
2000+: 12-85pts (increases with difficulty)";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    SetHandle { args: Vec<String> },
    ListUsers,
    Leaderboard,
    UserStats,
    CreateBattle { args: Vec<String> },
    CancelBattle,
    SkipRound,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Interaction {
    Ready { chat_id: ChatId },
    Finished { chat_id: ChatId, round: usize },
    ConfirmCancel { chat_id: ChatId },
    DeclineCancel { chat_id: ChatId },
}

pub fn parse_command(text: &str) -> Option<Command> {
    let mut parts = text.split_whitespace();
    let head = parts.next()?;
    if !head.starts_with('/') {
        return None;
    }
    // "/sethandle@SomeBot" style addressing is routed like a bare command
    let name = head[1..].split('@').next().unwrap_or("");
    let args: Vec<String> = parts.map(str::to_string).collect();

    match name {
        "start" => Some(Command::Start),
        "help" => Some(Command::Help),
        "sethandle" => Some(Command::SetHandle { args }),
        "listusers" => Some(Command::ListUsers),
        "leaderboard" | "league" => Some(Command::Leaderboard),
        "userstats" => Some(Command::UserStats),
        "createbattle" => Some(Command::CreateBattle { args }),
        "cancelbattle" => Some(Command::CancelBattle),
        "skipround" | "cancelround" => Some(Command::SkipRound),
        _ => None,
    }
}

pub fn parse_interaction(data: &str) -> Option<Interaction> {
    let mut parts = data.split(':');
    let kind = parts.next()?;
    let chat_id: ChatId = parts.next()?.parse().ok()?;
    match kind {
        "ready" => Some(Interaction::Ready { chat_id }),
        "finished" => {
            let round: usize = parts.next()?.parse().ok()?;
            Some(Interaction::Finished { chat_id, round })
        }
        "confirmcancel" => Some(Interaction::ConfirmCancel { chat_id }),
        "declinecancel" => Some(Interaction::DeclineCancel { chat_id }),
        _ => None,
    }
}

/// Validates `/createbattle` arguments: a problem count of 1-10 followed by
/// one or more target ratings in 800-3500.
pub fn parse_battle_args(args: &[String]) -> Result<(usize, Vec<i64>), String> {
    if args.len() < 2 {
        return Err("need a problem count and at least one rating".to_string());
    }

    let count: usize = args[0]
        .parse()
        .map_err(|_| format!("'{}' is not a valid problem count", args[0]))?;
    if !(MIN_PROBLEMS..=MAX_PROBLEMS).contains(&count) {
        return Err(format!(
            "number of problems must be {MIN_PROBLEMS}-{MAX_PROBLEMS}"
        ));
    }

    let mut ratings = Vec::new();
    for raw in &args[1..] {
        let rating: i64 = raw
            .parse()
            .map_err(|_| format!("'{raw}' is not a valid rating"))?;
        if !(MIN_RATING..=MAX_RATING).contains(&rating) {
            return Err(format!("ratings must be {MIN_RATING}-{MAX_RATING}"));
        }
        ratings.push(rating);
    }

    Ok((count, ratings))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn parse_known_commands() {
        assert_eq!(parse_command("/help"), Some(Command::Help));
        assert_eq!(parse_command("/listusers"), Some(Command::ListUsers));
        assert_eq!(parse_command("/league"), Some(Command::Leaderboard));
        assert_eq!(
            parse_command("/sethandle tourist"),
            Some(Command::SetHandle {
                args: args(&["tourist"])
            })
        );
        assert_eq!(
            parse_command("/createbattle 3 1200 1400"),
            Some(Command::CreateBattle {
                args: args(&["3", "1200", "1400"])
            })
        );
    }

    #[test]
    fn bot_addressed_commands_are_recognized() {
        assert_eq!(parse_command("/help@BattleBot"), Some(Command::Help));
    }

    #[test]
    fn unknown_or_plain_text_is_ignored() {
        assert_eq!(parse_command("/frobnicate"), None);
        assert_eq!(parse_command("hello there"), None);
        assert_eq!(parse_command(""), None);
    }

    #[test]
    fn parse_interaction_data() {
        assert_eq!(
            parse_interaction("ready:-100"),
            Some(Interaction::Ready { chat_id: -100 })
        );
        assert_eq!(
            parse_interaction("finished:-100:2"),
            Some(Interaction::Finished {
                chat_id: -100,
                round: 2
            })
        );
        assert_eq!(
            parse_interaction("confirmcancel:-100"),
            Some(Interaction::ConfirmCancel { chat_id: -100 })
        );
        assert_eq!(
            parse_interaction("declinecancel:-100"),
            Some(Interaction::DeclineCancel { chat_id: -100 })
        );
        assert_eq!(parse_interaction("finished:-100"), None);
        assert_eq!(parse_interaction("bogus:1"), None);
    }

    #[test]
    fn battle_args_happy_path() {
        assert_eq!(
            parse_battle_args(&args(&["3", "1200", "1400", "1600"])),
            Ok((3, vec![1200, 1400, 1600]))
        );
    }

    #[test]
    fn battle_args_validation_errors() {
        assert!(parse_battle_args(&args(&[])).is_err());
        assert!(parse_battle_args(&args(&["3"])).is_err());
        assert!(parse_battle_args(&args(&["0", "1200"])).is_err());
        assert!(parse_battle_args(&args(&["11", "1200"])).is_err());
        assert!(parse_battle_args(&args(&["3", "700"])).is_err());
        assert!(parse_battle_args(&args(&["3", "3600"])).is_err());
        assert!(parse_battle_args(&args(&["x", "1200"])).is_err());
        assert!(parse_battle_args(&args(&["3", "abc"])).is_err());
    }
}
