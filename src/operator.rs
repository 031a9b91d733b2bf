//! # Operator Front-Ends
//!
//! Turns typed commands into [`Event`]s and [`Effect`]s into text.
//!
//! [`TerminalOperator`] prompts on stdin. [`ScriptedOperator`] replays a
//! fixed list of command lines and records everything it was shown, so a
//! whole reconciliation can be driven without a terminal.
//!
//! ## Commands
//!
//! Every stage: `help`, `show`, `back`, `retry`, `skip`, `preview`,
//! `provider [name]`, `quit`.
//!
//! Stages A and B: a number picks a candidate (an empty line picks the
//! first), `id <id>` picks by id,
//! `c<n>` picks a combined release (B only), `search <text>` or any other
//! text searches again.
//!
//! Stage C: `strategy <name>` (or just the name), `reverse`, `swap <a> <b>`,
//! `set <rows> <field>=<value>`, `aa [<text> | #<performers> | -]`,
//! `commit [rows]`, `move`, `refresh`, `done`.

use std::collections::VecDeque;
use std::fmt::Write as _;
use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};

use crate::align::AlignStrategy;
use crate::commit::CommitOutcome;
use crate::machine::{AlbumArtistInput, Effect, Event};
use crate::model::TrackPair;
use crate::session::{ReconciliationSession, Stage};

/// Source of events and sink of effects.
pub trait Operator {
    /// The next event, or `None` when input has ended.
    fn next_event(&mut self, session: &ReconciliationSession) -> Result<Option<Event>>;

    fn present(&mut self, session: &ReconciliationSession, effects: &[Effect]);
}

/// A parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Event(Event),
    Help,
    Quit,
}

/// Parse one command line typed at `stage`.
pub fn parse_command(stage: Stage, line: &str) -> Result<Command, String> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    let word = word.to_ascii_lowercase();

    // Bare words only, so a search for "Back in Black" stays a search.
    let bare = rest.is_empty();
    let event = match word.as_str() {
        // Enter on its own takes the first candidate.
        "" if stage != Stage::Tracks => Event::Choose(1),
        "" => return Err("type a command, or `help`".to_string()),
        "help" | "h" | "?" if bare => return Ok(Command::Help),
        "quit" | "exit" if bare => return Ok(Command::Quit),
        "show" | "ls" | "l" if bare => Event::Show,
        "back" | "b" if bare => Event::Back,
        "retry" | "r" if bare => Event::Retry,
        "skip" | "k" if bare => Event::Skip,
        "preview" if bare => Event::TogglePreview,
        "provider" | "p" => Event::SwitchProvider((!bare).then(|| rest.to_string())),
        _ => match stage {
            Stage::Artist | Stage::Release => parse_resolve(stage, line, &word, rest)?,
            Stage::Tracks => parse_tracks(line, &word, rest)?,
        },
    };
    Ok(Command::Event(event))
}

fn parse_resolve(stage: Stage, line: &str, word: &str, rest: &str) -> Result<Event, String> {
    if let Ok(n) = line.parse::<usize>() {
        return Ok(Event::Choose(n));
    }
    match word {
        "id" if !rest.is_empty() => return Ok(Event::ChooseId(rest.to_string())),
        "search" | "s" => return Ok(Event::Search(rest.to_string())),
        _ => {}
    }
    if stage == Stage::Release {
        if let Some(n) = word.strip_prefix('c').and_then(|n| n.parse::<usize>().ok()) {
            if rest.is_empty() {
                return Ok(Event::ChooseCombined(n));
            }
        }
    }
    Ok(Event::Search(line.to_string()))
}

fn parse_tracks(line: &str, word: &str, rest: &str) -> Result<Event, String> {
    let event = match word {
        "strategy" | "align" | "a" => Event::SetStrategy(rest.parse()?),
        "reverse" | "rev" => Event::ToggleReverse,
        "swap" | "x" => {
            let numbers: Vec<usize> = rest
                .split_whitespace()
                .map(|n| n.parse::<usize>().map_err(|_| format!("`{n}` is not a row number")))
                .collect::<Result<_, _>>()?;
            match numbers.as_slice() {
                [a, b] => Event::Swap(*a, *b),
                _ => return Err("usage: swap <row> <row>".to_string()),
            }
        }
        "set" => {
            let usage = || "usage: set <rows> <field>=<value>".to_string();
            let (selection, assignment) = rest.split_once(char::is_whitespace).ok_or_else(usage)?;
            let (field, value) = assignment.split_once('=').ok_or_else(usage)?;
            Event::SetField {
                selection: selection.to_string(),
                field: field.parse()?,
                value: value.trim().to_string(),
            }
        }
        "aa" => Event::AlbumArtist(match rest {
            "" => AlbumArtistInput::Show,
            "-" => AlbumArtistInput::Clear,
            _ => match rest.strip_prefix('#') {
                Some(selection) => AlbumArtistInput::Pick(selection.to_string()),
                None => AlbumArtistInput::Set(rest.to_string()),
            },
        }),
        "commit" | "w" => Event::Commit((!rest.is_empty()).then(|| rest.to_string())),
        "move" | "relocate" | "m" => Event::Relocate,
        "refresh" => Event::Refresh,
        "done" | "d" => Event::Finish,
        _ => match line.parse::<AlignStrategy>() {
            Ok(strategy) => Event::SetStrategy(strategy),
            Err(_) => return Err(format!("unknown command `{line}`; type `help`")),
        },
    };
    Ok(event)
}

/// Command summary for `stage`.
pub fn help(stage: Stage) -> String {
    let common = "show | back | retry | skip | preview | provider [name] | quit";
    match stage {
        Stage::Artist => format!("<n> pick (enter = 1) | id <id> | search <text> (or any text)\n{common}"),
        Stage::Release => format!("<n> pick (enter = 1) | c<n> combined | id <id> | search <text> (or any text)\n{common}"),
        Stage::Tracks => format!(
            "strategy <order|duration|tracknumber|name|hybrid|manual> | reverse | swap <a> <b>\n\
             set <rows> <field>=<value> | aa [text | #performers | -] | commit [rows]\n\
             move | refresh | done\n{common}"
        ),
    }
}

fn format_duration(ms: u64) -> String {
    if ms == 0 {
        return "--:--".to_string();
    }
    let secs = ms / 1000;
    format!("{}:{:02}", secs / 60, secs % 60)
}

fn render_pairs(out: &mut String, strategy: AlignStrategy, reverse: bool, pairs: &[TrackPair]) {
    let reversed = if reverse { ", reversed" } else { "" };
    let _ = writeln!(out, "alignment ({strategy}{reversed}):");
    let width = pairs
        .iter()
        .filter_map(|p| p.local().map(|l| l.file_name().chars().count()))
        .max()
        .unwrap_or(9)
        .max(9);
    for (row, pair) in pairs.iter().enumerate() {
        let local = pair
            .local()
            .map(|l| format!("{} [{}]", l.file_name(), format_duration(l.duration_ms)))
            .unwrap_or_else(|| "(no file)".to_string());
        let remote = pair
            .remote()
            .map(|r| format!("{}. {} [{}]", r.ordinal, r.title, format_duration(r.duration_ms)))
            .unwrap_or_else(|| "(no track)".to_string());
        let _ = writeln!(out, "{:>3}. {local:<w$}  ->  {remote}", row + 1, w = width + 8);
    }
}

/// Text for one effect.
pub fn render(effect: &Effect) -> String {
    let mut out = String::new();
    match effect {
        Effect::Info(text) => out.push_str(text),
        Effect::Warning(text) => {
            let _ = write!(out, "warning: {text}");
        }
        Effect::Error(text) => {
            let _ = write!(out, "error: {text}");
        }
        Effect::StageEntered(stage) => {
            let _ = write!(out, "== stage {stage} ==");
        }
        Effect::Candidates {
            stage,
            candidates,
            groups,
        } => {
            let _ = writeln!(out, "{} candidate(s) for stage {}:", candidates.len(), stage.letter());
            for (i, candidate) in candidates.iter().enumerate() {
                let _ = writeln!(out, "{:>3}. {candidate}", i + 1);
            }
            for (i, group) in groups.iter().enumerate() {
                let _ = writeln!(out, "  c{}. {} (combined, {} releases)", i + 1, group.title, group.members.len());
            }
        }
        Effect::Pairs {
            strategy,
            reverse,
            pairs,
        } => render_pairs(&mut out, *strategy, *reverse, pairs),
        Effect::Performers(performers) => {
            if performers.is_empty() {
                out.push_str("no performers in the scanned files");
            }
            for (i, performer) in performers.iter().enumerate() {
                let _ = writeln!(out, "{:>3}. {performer}", i + 1);
            }
        }
        Effect::Committed(reports) => {
            for report in reports {
                let status = if report.success() { "ok  " } else { "FAIL" };
                let _ = writeln!(out, "  {status} {}", report.reason());
                if let Ok(CommitOutcome::Written(changes) | CommitOutcome::Previewed(changes)) = &report.result {
                    for change in changes {
                        let _ = writeln!(out, "         {change}");
                    }
                }
            }
        }
        Effect::Relocated { from, to } => {
            let _ = write!(out, "moved {} -> {}", from.display(), to.display());
        }
        Effect::Recovery { error, siblings } => {
            let _ = writeln!(out, "error: {error}");
            out.push_str("  retry | search <text> | provider [name] | skip");
            for (n, sibling) in siblings {
                let _ = write!(out, "\n  sibling {n}. {sibling}");
            }
        }
        Effect::Finished(outcome) => {
            let _ = write!(out, "album {outcome}");
        }
    }
    out.trim_end().to_string()
}

/// Prompts on stdin, prints to stdout.
#[derive(Debug, Default)]
pub struct TerminalOperator;

impl Operator for TerminalOperator {
    fn next_event(&mut self, session: &ReconciliationSession) -> Result<Option<Event>> {
        let stdin = io::stdin();
        loop {
            let marker = if session.preview { " preview" } else { "" };
            print!("[{}{marker}] > ", session.stage.letter());
            io::stdout().flush().context("Failed to flush prompt")?;

            let mut line = String::new();
            let read = stdin
                .lock()
                .read_line(&mut line)
                .context("Failed to read operator input")?;
            if read == 0 {
                return Ok(None);
            }
            match parse_command(session.stage, &line) {
                Ok(Command::Event(event)) => return Ok(Some(event)),
                Ok(Command::Help) => println!("{}", help(session.stage)),
                Ok(Command::Quit) => return Ok(None),
                Err(message) => eprintln!("{message}"),
            }
        }
    }

    fn present(&mut self, _session: &ReconciliationSession, effects: &[Effect]) {
        for effect in effects {
            match effect {
                Effect::Warning(_) | Effect::Error(_) | Effect::Recovery { .. } => eprintln!("{}", render(effect)),
                _ => println!("{}", render(effect)),
            }
        }
    }
}

/// Replays command lines and records what it was shown.
#[derive(Debug, Default)]
pub struct ScriptedOperator {
    lines: VecDeque<String>,
    /// Every effect presented, in order.
    pub effects: Vec<Effect>,
    /// Lines that did not parse, with the reason.
    pub rejected: Vec<(String, String)>,
}

impl ScriptedOperator {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn remaining(&self) -> usize {
        self.lines.len()
    }

    /// Rendered text of everything presented so far.
    pub fn transcript(&self) -> String {
        self.effects.iter().map(render).collect::<Vec<_>>().join("\n")
    }
}

impl Operator for ScriptedOperator {
    fn next_event(&mut self, session: &ReconciliationSession) -> Result<Option<Event>> {
        while let Some(line) = self.lines.pop_front() {
            match parse_command(session.stage, &line) {
                Ok(Command::Event(event)) => return Ok(Some(event)),
                Ok(Command::Help) => {}
                Ok(Command::Quit) => return Ok(None),
                Err(reason) => self.rejected.push((line, reason)),
            }
        }
        Ok(None)
    }

    fn present(&mut self, _session: &ReconciliationSession, effects: &[Effect]) {
        self.effects.extend_from_slice(effects);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TagField;

    fn event(stage: Stage, line: &str) -> Event {
        match parse_command(stage, line) {
            Ok(Command::Event(event)) => event,
            other => panic!("`{line}` parsed as {other:?}"),
        }
    }

    #[test]
    fn test_resolve_stage_commands() {
        assert_eq!(event(Stage::Artist, "2"), Event::Choose(2));
        assert_eq!(event(Stage::Artist, ""), Event::Choose(1));
        assert_eq!(event(Stage::Release, "  "), Event::Choose(1));
        assert_eq!(event(Stage::Artist, "id a-17"), Event::ChooseId("a-17".to_string()));
        assert_eq!(event(Stage::Artist, "Miles Davis"), Event::Search("Miles Davis".to_string()));
        assert_eq!(event(Stage::Artist, "s can"), Event::Search("can".to_string()));
        assert_eq!(event(Stage::Release, "c1"), Event::ChooseCombined(1));
        assert_eq!(event(Stage::Artist, "c1"), Event::Search("c1".to_string()));
        assert_eq!(event(Stage::Release, "p backup"), Event::SwitchProvider(Some("backup".to_string())));
        assert_eq!(event(Stage::Release, "provider"), Event::SwitchProvider(None));
        assert_eq!(event(Stage::Artist, "back"), Event::Back);
        assert_eq!(event(Stage::Artist, "Back in Black"), Event::Search("Back in Black".to_string()));
    }

    #[test]
    fn test_track_stage_commands() {
        assert_eq!(event(Stage::Tracks, "strategy duration"), Event::SetStrategy(AlignStrategy::Duration));
        assert_eq!(event(Stage::Tracks, "hybrid"), Event::SetStrategy(AlignStrategy::Hybrid));
        assert_eq!(event(Stage::Tracks, "swap 1 3"), Event::Swap(1, 3));
        assert_eq!(
            event(Stage::Tracks, "set 1..3 genre=Jazz; Modal"),
            Event::SetField {
                selection: "1..3".to_string(),
                field: TagField::Genres,
                value: "Jazz; Modal".to_string(),
            }
        );
        assert_eq!(event(Stage::Tracks, "aa"), Event::AlbumArtist(AlbumArtistInput::Show));
        assert_eq!(event(Stage::Tracks, "aa -"), Event::AlbumArtist(AlbumArtistInput::Clear));
        assert_eq!(
            event(Stage::Tracks, "aa #1,3"),
            Event::AlbumArtist(AlbumArtistInput::Pick("1,3".to_string()))
        );
        assert_eq!(
            event(Stage::Tracks, "aa Various Artists"),
            Event::AlbumArtist(AlbumArtistInput::Set("Various Artists".to_string()))
        );
        assert_eq!(event(Stage::Tracks, "commit"), Event::Commit(None));
        assert_eq!(event(Stage::Tracks, "w 2-4"), Event::Commit(Some("2-4".to_string())));
        assert_eq!(event(Stage::Tracks, "done"), Event::Finish);
    }

    #[test]
    fn test_bad_commands_are_reported() {
        assert!(parse_command(Stage::Tracks, "frobnicate").is_err());
        assert!(parse_command(Stage::Tracks, "swap 1").is_err());
        assert!(parse_command(Stage::Tracks, "set 1 title").is_err());
        assert!(parse_command(Stage::Tracks, "set 1 colour=red").is_err());
        assert!(parse_command(Stage::Tracks, "   ").is_err());
        assert_eq!(parse_command(Stage::Artist, "help"), Ok(Command::Help));
        assert_eq!(parse_command(Stage::Tracks, "quit"), Ok(Command::Quit));
    }

    #[test]
    fn test_render_recovery_lists_siblings() {
        use crate::provider::{Candidate, ProviderError};
        let text = render(&Effect::Recovery {
            error: ProviderError::NoTracks {
                release_id: "r2".to_string(),
            },
            siblings: vec![(1, Candidate::new("r1", "Live"))],
        });
        assert!(text.contains("release r2 has no tracks"));
        assert!(text.contains("sibling 1. Live [r1]"));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "--:--");
        assert_eq!(format_duration(448_000), "7:28");
        assert_eq!(format_duration(61_500), "1:01");
    }
}
