//! # Reconciliation State Machine
//!
//! Drives one album folder through three stages:
//!
//! - **A**: resolve the artist from a provider search
//! - **B**: resolve the release, or a combination of same-titled releases
//! - **C**: align files with tracks, edit, commit tags, relocate
//!
//! The core is [`Reconciler::handle`], a transition function from the
//! current session and one [`Event`] to a list of [`Effect`]s. Front-ends
//! (a terminal prompt, a scripted harness) turn operator input into events
//! and render effects; they never touch the session directly.
//!
//! ## Failure handling
//!
//! Provider failures never end the run. They surface as
//! [`Effect::Recovery`] and the operator can retry, search again, switch
//! provider, pick a sibling release, or skip. Tag and relocation failures are
//! reported per file or per album.
//!
//! ## Unattended mode
//!
//! Stages A and B take the first candidate automatically. Stage C is
//! reached but nothing is aligned or written; the album ends as
//! [`AlbumOutcome::Inspected`].

use std::path::{Path, PathBuf};

use anyhow::Result;
use log::{debug, info, warn};

use crate::align::{self, AlignStrategy};
use crate::commit::{commit_file, FileReport, ReleaseTags};
use crate::config::Settings;
use crate::genre::GenreTally;
use crate::model::{AlbumPlacement, TagField, TrackPair};
use crate::operator::Operator;
use crate::provider::{
    combine_tracks, group_releases, Candidate, CombinedTracks, EntityKind, Provider, ProviderError, ProviderRegistry,
    ReleaseGroup,
};
use crate::range::parse_selection;
use crate::relocate::{self, FileSystem};
use crate::scan;
use crate::session::{AlbumOutcome, PendingAction, ReconciliationSession, ResolvedRelease, Stage};
use crate::tags::TagStore;

/// Input to the album-artist builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlbumArtistInput {
    /// List the performers that can be picked.
    Show,
    Set(String),
    /// Join the selected performers (a selection over the listed ones).
    Pick(String),
    Clear,
}

/// Something the operator asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Search(String),
    /// 1-based candidate number.
    Choose(usize),
    ChooseId(String),
    /// 1-based release group number (stage B).
    ChooseCombined(usize),
    SwitchProvider(Option<String>),
    Retry,
    Back,
    Show,
    SetStrategy(AlignStrategy),
    ToggleReverse,
    /// Swap the track sides of two 1-based rows.
    Swap(usize, usize),
    SetField {
        selection: String,
        field: TagField,
        value: String,
    },
    AlbumArtist(AlbumArtistInput),
    /// Commit the selected rows, or all of them.
    Commit(Option<String>),
    Relocate,
    TogglePreview,
    /// Drop cached tracks and fetch them again.
    Refresh,
    Finish,
    Skip,
}

impl Event {
    fn name(&self) -> &'static str {
        match self {
            Event::Search(_) => "search",
            Event::Choose(_) | Event::ChooseId(_) => "choose",
            Event::ChooseCombined(_) => "combined release",
            Event::SwitchProvider(_) => "provider",
            Event::Retry => "retry",
            Event::Back => "back",
            Event::Show => "show",
            Event::SetStrategy(_) => "strategy",
            Event::ToggleReverse => "reverse",
            Event::Swap(..) => "swap",
            Event::SetField { .. } => "set",
            Event::AlbumArtist(_) => "album artist",
            Event::Commit(_) => "commit",
            Event::Relocate => "relocate",
            Event::TogglePreview => "preview",
            Event::Refresh => "refresh",
            Event::Finish => "done",
            Event::Skip => "skip",
        }
    }
}

/// Something for the front-end to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Info(String),
    Warning(String),
    Error(String),
    StageEntered(Stage),
    Candidates {
        stage: Stage,
        candidates: Vec<Candidate>,
        groups: Vec<ReleaseGroup>,
    },
    Pairs {
        strategy: AlignStrategy,
        reverse: bool,
        pairs: Vec<TrackPair>,
    },
    Performers(Vec<String>),
    Committed(Vec<FileReport>),
    Relocated {
        from: PathBuf,
        to: PathBuf,
    },
    /// A provider step failed; `siblings` are alternative releases as
    /// `(candidate number, candidate)`.
    Recovery {
        error: ProviderError,
        siblings: Vec<(usize, Candidate)>,
    },
    Finished(AlbumOutcome),
}

/// Per-run switches from the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub unattended: bool,
    pub preview: bool,
    pub reverse: bool,
}

/// Owns the collaborators of a run and applies events to sessions.
pub struct Reconciler {
    registry: ProviderRegistry,
    store: Box<dyn TagStore>,
    fs: Box<dyn FileSystem>,
    settings: Settings,
    options: RunOptions,
    tally: GenreTally,
}

impl Reconciler {
    pub fn new(
        registry: ProviderRegistry,
        store: Box<dyn TagStore>,
        fs: Box<dyn FileSystem>,
        settings: Settings,
        options: RunOptions,
    ) -> Self {
        Self {
            registry,
            store,
            fs,
            settings,
            options,
            tally: GenreTally::new(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn tally(&self) -> &GenreTally {
        &self.tally
    }

    /// Genre counts of the run so far; clears the tally.
    pub fn finish_run(&mut self) -> Vec<(String, usize)> {
        self.tally.finalize()
    }

    // =========================================================================
    // DRIVERS
    // =========================================================================

    /// Reconcile every album in turn, returning each visited album with its
    /// outcome.
    ///
    /// Tag, provider and relocation failures are reported to the operator
    /// and handled inside the album; they never stop the run. Running out of
    /// operator input (or `quit`) ends the current album as
    /// [`AlbumOutcome::Abandoned`] and stops here, so later albums are
    /// missing from the result.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::path::PathBuf;
    /// use curator::config::Settings;
    /// use curator::machine::{Reconciler, RunOptions};
    /// use curator::operator::ScriptedOperator;
    /// use curator::provider::{ProviderRegistry, StaticProvider};
    /// use curator::relocate::StdFileSystem;
    /// use curator::tags::LoftyTagStore;
    ///
    /// let registry = ProviderRegistry::new().with(Box::new(StaticProvider::new("memory")));
    /// let mut reconciler = Reconciler::new(
    ///     registry,
    ///     Box::new(LoftyTagStore),
    ///     Box::new(StdFileSystem),
    ///     Settings::default(),
    ///     RunOptions::default(),
    /// );
    /// let mut operator = ScriptedOperator::new(["", "", "commit", "done"]);
    /// let outcomes = reconciler.run(&[PathBuf::from("/incoming/album")], &mut operator)?;
    /// # Ok::<(), anyhow::Error>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Only failures of the operator itself, such as an unreadable terminal.
    pub fn run(&mut self, albums: &[PathBuf], operator: &mut dyn Operator) -> Result<Vec<(PathBuf, AlbumOutcome)>> {
        let mut outcomes = Vec::new();
        for album in albums {
            let outcome = self.reconcile_album(album, operator)?;
            info!("{}: {outcome}", album.display());
            outcomes.push((album.clone(), outcome));
            if outcome == AlbumOutcome::Abandoned {
                break;
            }
        }
        Ok(outcomes)
    }

    /// Run one album until it finishes or operator input ends.
    pub fn reconcile_album(&mut self, dir: &Path, operator: &mut dyn Operator) -> Result<AlbumOutcome> {
        let (mut session, effects) = self.begin(dir);
        operator.present(&session, &effects);

        while !session.is_finished() {
            let Some(event) = operator.next_event(&session)? else {
                let mut effects = Vec::new();
                self.finish(&mut session, AlbumOutcome::Abandoned, &mut effects);
                operator.present(&session, &effects);
                break;
            };
            let effects = self.handle(&mut session, event);
            operator.present(&session, &effects);
        }
        Ok(session.outcome.unwrap_or(AlbumOutcome::Abandoned))
    }

    /// Scan `dir`, open a session at stage A and run the first artist search.
    /// In unattended mode the whole automatic pass happens here.
    pub fn begin(&mut self, dir: &Path) -> (ReconciliationSession, Vec<Effect>) {
        let mut fx = Vec::new();
        let scanned = scan::scan_album(dir, self.store.as_ref(), &self.settings);
        for err in &scanned.unreadable {
            fx.push(Effect::Warning(err.to_string()));
        }

        let mut session = ReconciliationSession::new(
            dir.to_path_buf(),
            scanned.tracks,
            self.settings.default_strategy,
            self.registry.active_name(),
        );
        session.reverse = self.options.reverse;
        session.preview = self.options.preview;
        let guess = session
            .local
            .iter()
            .find_map(|t| AlbumPlacement::from_tags(&t.tags))
            .or_else(|| AlbumPlacement::from_folder(dir));
        if let Some(guess) = guess {
            session.artist_query = guess.artist;
            session.release_query = guess.album;
        }

        fx.push(Effect::Info(format!(
            "{}: {} audio file(s)",
            dir.display(),
            session.local.len()
        )));
        if session.local.is_empty() {
            fx.push(Effect::Warning("no audio files to reconcile".to_string()));
            self.finish(&mut session, AlbumOutcome::Skipped, &mut fx);
            return (session, fx);
        }

        fx.push(Effect::StageEntered(Stage::Artist));
        let query = session.artist_query.clone();
        self.search_artists(&mut session, query, &mut fx);
        if self.options.unattended {
            self.auto_advance(&mut session, &mut fx);
        }
        (session, fx)
    }

    fn auto_advance(&mut self, session: &mut ReconciliationSession, fx: &mut Vec<Effect>) {
        while !session.is_finished() {
            let Some(first) = session.candidates.first().cloned() else {
                fx.push(Effect::Error(format!("no candidates at stage {}", session.stage)));
                self.finish(session, AlbumOutcome::Skipped, fx);
                return;
            };
            fx.push(Effect::Info(format!("unattended: taking {first}")));
            match session.stage {
                Stage::Artist => self.choose_artist(session, first, fx),
                Stage::Release => self.select_release(session, ResolvedRelease::single(&first), fx),
                Stage::Tracks => return,
            }
        }
    }

    // =========================================================================
    // TRANSITION FUNCTION
    // =========================================================================

    /// Apply one event.
    pub fn handle(&mut self, session: &mut ReconciliationSession, event: Event) -> Vec<Effect> {
        let mut fx = Vec::new();
        if session.is_finished() {
            fx.push(Effect::Error("this album is already finished".to_string()));
            return fx;
        }
        debug!("Stage {}: {:?}", session.stage, event);

        match (session.stage, event) {
            (_, Event::Skip) => self.finish(session, AlbumOutcome::Skipped, &mut fx),
            (_, Event::Show) => self.show(session, &mut fx),
            (_, Event::Back) => self.back(session, &mut fx),
            (_, Event::Retry) => self.retry(session, &mut fx),
            (_, Event::TogglePreview) => {
                session.preview = !session.preview;
                let state = if session.preview { "on" } else { "off" };
                fx.push(Effect::Info(format!("preview mode {state}")));
            }
            (_, Event::SwitchProvider(name)) => self.switch_provider(session, name.as_deref(), &mut fx),

            (Stage::Artist, Event::Search(query)) => self.search_artists(session, query, &mut fx),
            (Stage::Release, Event::Search(query)) => self.search_releases(session, query, &mut fx),
            (Stage::Artist | Stage::Release, Event::Choose(n)) => match session.candidates.get(n.wrapping_sub(1)).cloned() {
                Some(candidate) if session.stage == Stage::Artist => self.choose_artist(session, candidate, &mut fx),
                Some(candidate) => self.select_release(session, ResolvedRelease::single(&candidate), &mut fx),
                None => fx.push(Effect::Error(out_of_range("candidate", n, session.candidates.len()))),
            },
            (stage @ (Stage::Artist | Stage::Release), Event::ChooseId(id)) => {
                self.choose_by_id(session, stage, &id, &mut fx)
            }
            (Stage::Release, Event::ChooseCombined(n)) => match session.groups.get(n.wrapping_sub(1)) {
                Some(group) => {
                    let release = ResolvedRelease::combined(group);
                    self.select_release(session, release, &mut fx)
                }
                None => fx.push(Effect::Error(out_of_range("combined release", n, session.groups.len()))),
            },

            (Stage::Tracks, Event::SetStrategy(strategy)) => {
                session.strategy = strategy;
                session.realign();
                self.push_pairs(session, &mut fx);
            }
            (Stage::Tracks, Event::ToggleReverse) => {
                session.reverse = !session.reverse;
                if !session.strategy.honours_reverse() {
                    fx.push(Effect::Info(format!(
                        "reverse order has no effect under {}",
                        session.strategy
                    )));
                }
                session.realign();
                self.push_pairs(session, &mut fx);
            }
            (Stage::Tracks, Event::Swap(a, b)) => self.swap(session, a, b, &mut fx),
            (Stage::Tracks, Event::SetField { selection, field, value }) => {
                self.set_field(session, &selection, field, &value, &mut fx)
            }
            (Stage::Tracks, Event::AlbumArtist(input)) => self.album_artist(session, input, &mut fx),
            (Stage::Tracks, Event::Commit(selection)) => self.commit(session, selection.as_deref(), &mut fx),
            (Stage::Tracks, Event::Relocate) => self.relocate(session, &mut fx),
            (Stage::Tracks, Event::Refresh) => self.refresh(session, &mut fx),
            (Stage::Tracks, Event::Finish) => self.finish(session, AlbumOutcome::Completed, &mut fx),

            (stage, event) => fx.push(Effect::Error(format!(
                "`{}` is not available at stage {stage}",
                event.name()
            ))),
        }
        fx
    }

    fn finish(&self, session: &mut ReconciliationSession, outcome: AlbumOutcome, fx: &mut Vec<Effect>) {
        session.outcome = Some(outcome);
        fx.push(Effect::Finished(outcome));
    }

    fn show(&self, session: &ReconciliationSession, fx: &mut Vec<Effect>) {
        match session.stage {
            Stage::Artist | Stage::Release => fx.push(Effect::Candidates {
                stage: session.stage,
                candidates: session.candidates.clone(),
                groups: session.groups.clone(),
            }),
            Stage::Tracks => {
                if let Some(release) = &session.release {
                    fx.push(Effect::Info(describe_release(release, session.pairs.len())));
                }
                self.push_pairs(session, fx);
            }
        }
    }

    fn push_pairs(&self, session: &ReconciliationSession, fx: &mut Vec<Effect>) {
        fx.push(Effect::Pairs {
            strategy: session.strategy,
            reverse: session.reverse,
            pairs: session.pairs.clone(),
        });
        let (no_file, no_track) = align::unmatched(&session.pairs);
        if no_file + no_track > 0 {
            fx.push(Effect::Warning(format!(
                "{no_track} file(s) without a track, {no_file} track(s) without a file"
            )));
        }
    }

    fn back(&mut self, session: &mut ReconciliationSession, fx: &mut Vec<Effect>) {
        if !session.back() {
            fx.push(Effect::Error("already at the first stage".to_string()));
            return;
        }
        fx.push(Effect::StageEntered(session.stage));
        match session.stage {
            // The candidate list holds releases now; search artists again.
            Stage::Artist => {
                let query = session.artist_query.clone();
                self.search_artists(session, query, fx);
            }
            _ => self.show(session, fx),
        }
    }

    fn retry(&mut self, session: &mut ReconciliationSession, fx: &mut Vec<Effect>) {
        match session.pending.clone() {
            None => fx.push(Effect::Info("nothing to retry".to_string())),
            Some(PendingAction::SearchArtists(query)) if session.stage == Stage::Artist => {
                self.search_artists(session, query, fx)
            }
            Some(PendingAction::SearchReleases(query)) if session.stage == Stage::Release => {
                self.search_releases(session, query, fx)
            }
            Some(PendingAction::LoadTracks(release)) if session.stage == Stage::Release => {
                self.select_release(session, release, fx)
            }
            Some(_) => {
                session.pending = None;
                fx.push(Effect::Info("nothing to retry at this stage".to_string()));
            }
        }
    }

    /// Report a provider failure and what the operator can do about it.
    /// Unattended runs cannot ask, so the album is skipped.
    fn recover(
        &self,
        session: &mut ReconciliationSession,
        error: ProviderError,
        siblings: Vec<(usize, Candidate)>,
        fx: &mut Vec<Effect>,
    ) {
        warn!("Stage {}: {error}", session.stage);
        if self.options.unattended {
            fx.push(Effect::Error(error.to_string()));
            self.finish(session, AlbumOutcome::Skipped, fx);
            return;
        }
        fx.push(Effect::Recovery { error, siblings });
    }

    fn active_provider(&self) -> Result<&dyn Provider, ProviderError> {
        self.registry.active().ok_or_else(|| ProviderError::Unavailable {
            provider: "none".to_string(),
            reason: "no provider is configured".to_string(),
        })
    }

    // =========================================================================
    // STAGES A AND B
    // =========================================================================

    fn search_artists(&mut self, session: &mut ReconciliationSession, query: String, fx: &mut Vec<Effect>) {
        session.artist_query = query.clone();
        session.pending = Some(PendingAction::SearchArtists(query.clone()));
        let found = self
            .active_provider()
            .and_then(|p| p.search(&query, EntityKind::Artist, None));

        match found {
            Ok(candidates) if candidates.is_empty() => self.recover(
                session,
                ProviderError::NoCandidates {
                    kind: EntityKind::Artist,
                    query,
                },
                Vec::new(),
                fx,
            ),
            Ok(candidates) => {
                session.pending = None;
                session.candidates = candidates;
                session.groups.clear();
                self.show(session, fx);
            }
            Err(err) => self.recover(session, err, Vec::new(), fx),
        }
    }

    fn search_releases(&mut self, session: &mut ReconciliationSession, query: String, fx: &mut Vec<Effect>) {
        let Some(artist) = session.artist.clone() else {
            fx.push(Effect::Error("no artist resolved".to_string()));
            return;
        };
        session.release_query = query.clone();
        session.pending = Some(PendingAction::SearchReleases(query.clone()));
        let found = self
            .active_provider()
            .and_then(|p| p.search(&query, EntityKind::Release, Some(&artist.id)));

        match found {
            Ok(candidates) if candidates.is_empty() && !query.trim().is_empty() => {
                fx.push(Effect::Info(format!(
                    "no release of {} matches `{query}`, listing all of them",
                    artist.name
                )));
                self.search_releases(session, String::new(), fx);
            }
            Ok(candidates) if candidates.is_empty() => self.recover(
                session,
                ProviderError::NoCandidates {
                    kind: EntityKind::Release,
                    query,
                },
                Vec::new(),
                fx,
            ),
            Ok(candidates) => {
                session.pending = None;
                session.groups = group_releases(&candidates);
                session.candidates = candidates;
                self.show(session, fx);
            }
            Err(err) => self.recover(session, err, Vec::new(), fx),
        }
    }

    fn choose_by_id(&mut self, session: &mut ReconciliationSession, stage: Stage, id: &str, fx: &mut Vec<Effect>) {
        let kind = if stage == Stage::Artist {
            EntityKind::Artist
        } else {
            EntityKind::Release
        };
        match self.active_provider().and_then(|p| p.lookup(kind, id)) {
            Ok(Some(candidate)) if stage == Stage::Artist => self.choose_artist(session, candidate, fx),
            Ok(Some(candidate)) => self.select_release(session, ResolvedRelease::single(&candidate), fx),
            Ok(None) => fx.push(Effect::Error(format!("no {kind} with id `{id}`"))),
            Err(err) => self.recover(session, err, Vec::new(), fx),
        }
    }

    fn choose_artist(&mut self, session: &mut ReconciliationSession, artist: Candidate, fx: &mut Vec<Effect>) {
        info!("Artist resolved: {artist}");
        session.artist = Some(artist);
        session.candidates.clear();
        session.advance();
        fx.push(Effect::StageEntered(session.stage));
        let query = session.release_query.clone();
        self.search_releases(session, query, fx);
    }

    /// Fetch the release's tracks and enter stage C.
    fn select_release(&mut self, session: &mut ReconciliationSession, release: ResolvedRelease, fx: &mut Vec<Effect>) {
        session.pending = Some(PendingAction::LoadTracks(release.clone()));
        match self.load_tracks(session, &release) {
            Ok(loaded) => {
                for warning in loaded.warnings {
                    fx.push(Effect::Warning(format!("combined release: {warning}")));
                }
                self.enter_tracks(session, release, fx);
            }
            Err(err) => {
                let siblings = match &err {
                    ProviderError::NoTracks { release_id } => siblings_of(session, release_id),
                    _ => Vec::new(),
                };
                self.recover(session, err, siblings, fx);
            }
        }
    }

    /// Tracks of `release`, from the session cache or the provider.
    fn load_tracks(
        &self,
        session: &mut ReconciliationSession,
        release: &ResolvedRelease,
    ) -> Result<CombinedTracks, ProviderError> {
        if let Some(tracks) = session.cache.get(&release.id) {
            debug!("Track cache hit for {}", release.id);
            return Ok(CombinedTracks {
                tracks: tracks.to_vec(),
                warnings: Vec::new(),
            });
        }

        let provider = self.active_provider()?;
        let mut parts = Vec::with_capacity(release.constituents.len());
        for id in &release.constituents {
            let tracks = provider.tracks(id)?;
            if tracks.is_empty() {
                return Err(ProviderError::NoTracks {
                    release_id: id.clone(),
                });
            }
            parts.push((id.clone(), tracks));
        }

        let loaded = if parts.len() == 1 {
            let (_, mut tracks) = parts.remove(0);
            tracks.sort_by_key(|t| t.ordinal);
            CombinedTracks {
                tracks,
                warnings: Vec::new(),
            }
        } else {
            combine_tracks(&parts)
        };
        session.cache.store(&release.id, loaded.tracks.clone());
        Ok(loaded)
    }

    fn enter_tracks(&mut self, session: &mut ReconciliationSession, release: ResolvedRelease, fx: &mut Vec<Effect>) {
        let track_count = session.cache.get(&release.id).map_or(0, |t| t.len());
        info!("Release resolved: {} ({track_count} tracks)", release.title);
        fx.push(Effect::Info(describe_release(&release, track_count)));
        session.release = Some(release);
        session.pending = None;
        session.advance();
        fx.push(Effect::StageEntered(session.stage));

        if self.options.unattended {
            fx.push(Effect::Warning(
                "unattended mode: tracks were not aligned and no tags were written".to_string(),
            ));
            self.finish(session, AlbumOutcome::Inspected, fx);
            return;
        }
        session.realign();
        self.push_pairs(session, fx);
    }

    fn switch_provider(&mut self, session: &mut ReconciliationSession, name: Option<&str>, fx: &mut Vec<Effect>) {
        if session.stage == Stage::Tracks {
            fx.push(Effect::Error(
                "go back to stage B or A before switching providers".to_string(),
            ));
            return;
        }
        let switched = self.registry.switch(name).map(str::to_string);
        match switched {
            Ok(active) => {
                info!("Provider switched to {active}");
                fx.push(Effect::Info(format!("provider: {active}")));
                session.provider = active;
                session.clear_provider_state();
                if session.stage == Stage::Release {
                    session.back();
                    fx.push(Effect::StageEntered(session.stage));
                }
                let query = session.artist_query.clone();
                self.search_artists(session, query, fx);
            }
            Err(message) => fx.push(Effect::Error(message)),
        }
    }

    // =========================================================================
    // STAGE C
    // =========================================================================

    fn swap(&self, session: &mut ReconciliationSession, a: usize, b: usize, fx: &mut Vec<Effect>) {
        if a == 0 || b == 0 {
            fx.push(Effect::Error("rows are numbered from 1".to_string()));
            return;
        }
        match align::swap_remotes(&mut session.pairs, a - 1, b - 1) {
            Ok(()) => {
                session.strategy = AlignStrategy::Manual;
                self.push_pairs(session, fx);
            }
            Err(message) => fx.push(Effect::Error(message)),
        }
    }

    fn set_field(
        &self,
        session: &mut ReconciliationSession,
        selection: &str,
        field: TagField,
        value: &str,
        fx: &mut Vec<Effect>,
    ) {
        let rows = match parse_selection(selection, session.pairs.len()) {
            Ok(rows) => rows,
            Err(err) => {
                fx.push(Effect::Error(err.to_string()));
                return;
            }
        };

        let mut updated = 0;
        for row in rows {
            let Some(local) = session.pairs[row - 1].local() else {
                fx.push(Effect::Warning(format!("row {row} has no file")));
                continue;
            };
            let key = session.relative_key(&local.path);
            if let Err(message) = session.overrides.entry(key).or_default().assign(field, value) {
                fx.push(Effect::Error(message));
                return;
            }
            updated += 1;
        }
        fx.push(Effect::Info(format!("{field} set on {updated} file(s)")));
    }

    fn album_artist(&self, session: &mut ReconciliationSession, input: AlbumArtistInput, fx: &mut Vec<Effect>) {
        match input {
            AlbumArtistInput::Show => {
                fx.push(Effect::Performers(session.performers()));
            }
            AlbumArtistInput::Set(text) => {
                let text = text.trim();
                if text.is_empty() {
                    fx.push(Effect::Error("album artist cannot be empty".to_string()));
                    return;
                }
                session.album_artist_override = Some(text.to_string());
            }
            AlbumArtistInput::Pick(selection) => {
                let performers = session.performers();
                if performers.is_empty() {
                    fx.push(Effect::Error("the scanned files list no performers".to_string()));
                    return;
                }
                match parse_selection(&selection, performers.len()) {
                    Ok(picked) => {
                        let names: Vec<&str> = picked.iter().map(|&i| performers[i - 1].as_str()).collect();
                        session.album_artist_override = Some(names.join(&self.settings.album_artist_separator));
                    }
                    Err(err) => {
                        fx.push(Effect::Error(err.to_string()));
                        return;
                    }
                }
            }
            AlbumArtistInput::Clear => session.album_artist_override = None,
        }
        let current = session.album_artist().unwrap_or_else(|| "(unset)".to_string());
        fx.push(Effect::Info(format!("album artist: {current}")));
    }

    fn commit(&mut self, session: &mut ReconciliationSession, selection: Option<&str>, fx: &mut Vec<Effect>) {
        let (Some(release), Some(tracks)) = (session.release.clone(), session.release_tracks()) else {
            fx.push(Effect::Error("no release tracks to commit".to_string()));
            return;
        };
        let release_tags = ReleaseTags::new(release.title, session.album_artist(), release.year, tracks);

        let rows: Vec<usize> = match selection {
            None => (1..=session.pairs.len()).collect(),
            Some(text) => match parse_selection(text, session.pairs.len()) {
                Ok(rows) => rows,
                Err(err) => {
                    fx.push(Effect::Error(err.to_string()));
                    return;
                }
            },
        };

        let mut reports = Vec::new();
        for row in rows {
            match &session.pairs[row - 1] {
                TrackPair::Matched { local, remote } => {
                    let overrides = session
                        .overrides
                        .get(&session.relative_key(&local.path))
                        .cloned()
                        .unwrap_or_default();
                    reports.push(commit_file(
                        self.store.as_ref(),
                        &local.path,
                        |current| release_tags.apply(current, remote, &overrides),
                        session.preview,
                    ));
                }
                TrackPair::LocalOnly(local) => fx.push(Effect::Warning(format!(
                    "row {row}: {} has no track, not committed",
                    local.file_name()
                ))),
                TrackPair::RemoteOnly(remote) => fx.push(Effect::Warning(format!(
                    "row {row}: no file for track {} `{}`",
                    remote.ordinal, remote.title
                ))),
            }
        }

        let written: Vec<PathBuf> = reports.iter().filter(|r| r.wrote()).map(|r| r.path.clone()).collect();
        let failed = reports.iter().filter(|r| !r.success()).count();
        if failed > 0 {
            fx.push(Effect::Warning(format!("{failed} file(s) failed")));
        }
        fx.push(Effect::Committed(reports));

        if !written.is_empty() {
            for path in &written {
                let key = session.relative_key(path);
                session.committed.insert(key);
            }
            let dir = session.album_dir.clone();
            self.rescan(session, dir, fx);
            for track in session.local.iter().filter(|t| written.contains(&t.path)) {
                self.tally.record(&track.tags.genres);
            }
        }
    }

    fn relocate(&mut self, session: &mut ReconciliationSession, fx: &mut Vec<Effect>) {
        let Some(root) = self.settings.target_root.clone() else {
            fx.push(Effect::Error(
                "no target root configured; pass --target-root or set target_root".to_string(),
            ));
            return;
        };
        let placement = match session.committed_placement() {
            Some(placement) => placement,
            None => match AlbumPlacement::from_folder(&session.album_dir) {
                Some(placement) => {
                    fx.push(Effect::Warning(
                        "nothing committed yet, placing the album by its folder name".to_string(),
                    ));
                    placement
                }
                None => {
                    fx.push(Effect::Error("cannot tell where this album belongs".to_string()));
                    return;
                }
            },
        };
        debug!("Placing album as {placement:?}");

        let from = session.album_dir.clone();
        let policy = self.settings.relocation.policy();
        match relocate::relocate(self.fs.as_ref(), &from, &root, &placement, &policy) {
            Ok(to) if to == from => fx.push(Effect::Info("album is already in place".to_string())),
            Ok(to) => {
                fx.push(Effect::Relocated {
                    from,
                    to: to.clone(),
                });
                // Everything read under the old path is stale now.
                self.rescan(session, to, fx);
            }
            Err(err) => fx.push(Effect::Error(format!(
                "relocating {} failed: {err}",
                from.display()
            ))),
        }
    }

    fn refresh(&mut self, session: &mut ReconciliationSession, fx: &mut Vec<Effect>) {
        let Some(release) = session.release.clone() else {
            fx.push(Effect::Error("no release to refresh".to_string()));
            return;
        };
        session.cache.invalidate();
        match self.load_tracks(session, &release) {
            Ok(loaded) => {
                for warning in loaded.warnings {
                    fx.push(Effect::Warning(format!("combined release: {warning}")));
                }
                fx.push(Effect::Info(describe_release(&release, loaded.tracks.len())));
                session.realign();
                self.push_pairs(session, fx);
            }
            Err(err) => {
                session.back();
                session.pending = Some(PendingAction::LoadTracks(release));
                fx.push(Effect::StageEntered(session.stage));
                let siblings = match &err {
                    ProviderError::NoTracks { release_id } => siblings_of(session, release_id),
                    _ => Vec::new(),
                };
                self.recover(session, err, siblings, fx);
            }
        }
    }

    /// Re-read the album from `dir`, keeping the pairing by relative path.
    fn rescan(&self, session: &mut ReconciliationSession, dir: PathBuf, fx: &mut Vec<Effect>) {
        let scanned = scan::scan_album(&dir, self.store.as_ref(), &self.settings);
        for err in &scanned.unreadable {
            fx.push(Effect::Warning(err.to_string()));
        }
        session.replace_local(dir, scanned.tracks);
        self.push_pairs(session, fx);
    }
}

fn out_of_range(what: &str, n: usize, len: usize) -> String {
    if len == 0 {
        format!("there is no {what} to choose")
    } else {
        format!("choose a {what} between 1 and {len} (got {n})")
    }
}

fn describe_release(release: &ResolvedRelease, track_count: usize) -> String {
    let year = release.year.map(|y| format!(" ({y})")).unwrap_or_default();
    let combined = if release.is_combined() {
        format!(", combined from {} releases", release.constituents.len())
    } else {
        String::new()
    };
    format!("release: {}{year}, {track_count} track(s){combined}", release.title)
}

/// Other members of the group containing `release_id`, numbered as in the
/// candidate list.
fn siblings_of(session: &ReconciliationSession, release_id: &str) -> Vec<(usize, Candidate)> {
    let Some(group) = session
        .groups
        .iter()
        .find(|g| g.members.iter().any(|m| m.id == release_id))
    else {
        return Vec::new();
    };
    group
        .members
        .iter()
        .filter(|m| m.id != release_id)
        .filter_map(|m| {
            session
                .candidates
                .iter()
                .position(|c| c.id == m.id)
                .map(|i| (i + 1, m.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RemoteTrack, TagSnapshot};
    use crate::provider::StaticProvider;
    use crate::relocate::StdFileSystem;
    use crate::tags::MemoryTagStore;
    use tempfile::TempDir;

    fn remote(id: &str, ordinal: usize, title: &str) -> RemoteTrack {
        RemoteTrack {
            id: id.to_string(),
            ordinal,
            disc_number: None,
            track_number: None,
            title: title.to_string(),
            duration_ms: 60_000,
        }
    }

    /// An album folder on disk whose tags live in a memory store.
    fn album(files: &[&str]) -> (TempDir, PathBuf, MemoryTagStore) {
        let dir = TempDir::new().unwrap();
        let album = dir.path().join("incoming").join("Can - Tago Mago");
        std::fs::create_dir_all(&album).unwrap();
        let store = MemoryTagStore::new();
        for name in files {
            let path = album.join(name);
            std::fs::write(&path, b"audio").unwrap();
            store.insert(
                path,
                TagSnapshot {
                    performers: vec!["Can".to_string()],
                    ..Default::default()
                },
                60_000,
            );
        }
        (dir, album, store)
    }

    fn provider() -> StaticProvider {
        let provider = StaticProvider::new("memory");
        provider.add_artist("a1", "Can").add_release(
            "a1",
            "r1",
            "Tago Mago",
            Some(1971),
            vec![remote("t1", 1, "Paperhouse"), remote("t2", 2, "Mushroom")],
        );
        provider
    }

    fn reconciler(provider: &StaticProvider, store: &MemoryTagStore, options: RunOptions) -> Reconciler {
        Reconciler::new(
            ProviderRegistry::new().with(Box::new(provider.clone())),
            Box::new(store.clone()),
            Box::new(StdFileSystem),
            Settings::default(),
            options,
        )
    }

    fn has_error(fx: &[Effect]) -> bool {
        fx.iter().any(|e| matches!(e, Effect::Error(_)))
    }

    #[test]
    fn test_single_candidates_reach_stage_c() {
        let (_tmp, dir, store) = album(&["01.flac", "02.flac"]);
        let provider = provider();
        let mut r = reconciler(&provider, &store, RunOptions::default());

        let (mut session, fx) = r.begin(&dir);
        assert_eq!(session.stage, Stage::Artist);
        assert!(fx.iter().any(|e| matches!(e, Effect::Candidates { candidates, .. } if candidates.len() == 1)));

        r.handle(&mut session, Event::Choose(1));
        assert_eq!(session.stage, Stage::Release);
        r.handle(&mut session, Event::Choose(1));

        assert_eq!(session.stage, Stage::Tracks);
        assert_eq!(session.pairs.len(), 2);
        assert!(session.pairs.iter().all(TrackPair::is_matched));
    }

    #[test]
    fn test_wrong_stage_events_are_rejected() {
        let (_tmp, dir, store) = album(&["01.flac"]);
        let provider = provider();
        let mut r = reconciler(&provider, &store, RunOptions::default());
        let (mut session, _) = r.begin(&dir);

        assert!(has_error(&r.handle(&mut session, Event::Commit(None))));
        assert!(has_error(&r.handle(&mut session, Event::Choose(7))));
        assert!(has_error(&r.handle(&mut session, Event::Back)));
        assert_eq!(session.stage, Stage::Artist);
    }

    #[test]
    fn test_provider_failure_offers_recovery() {
        let (_tmp, dir, store) = album(&["01.flac"]);
        let provider = provider();
        provider.set_offline(true);
        let mut r = reconciler(&provider, &store, RunOptions::default());

        let (mut session, fx) = r.begin(&dir);
        assert!(fx.iter().any(|e| matches!(e, Effect::Recovery { error: ProviderError::Unavailable { .. }, .. })));
        assert!(!session.is_finished());

        provider.set_offline(false);
        let fx = r.handle(&mut session, Event::Retry);
        assert!(fx.iter().any(|e| matches!(e, Effect::Candidates { .. })));
    }

    #[test]
    fn test_track_cache_reused_until_refresh() {
        let (_tmp, dir, store) = album(&["01.flac", "02.flac"]);
        let provider = provider();
        let mut r = reconciler(&provider, &store, RunOptions::default());
        let (mut session, _) = r.begin(&dir);
        r.handle(&mut session, Event::Choose(1));
        r.handle(&mut session, Event::Choose(1));
        assert_eq!(provider.track_fetches(), 1);

        r.handle(&mut session, Event::Back);
        r.handle(&mut session, Event::Choose(1));
        assert_eq!(provider.track_fetches(), 1);

        r.handle(&mut session, Event::Refresh);
        assert_eq!(provider.track_fetches(), 2);
        assert_eq!(session.stage, Stage::Tracks);
    }

    #[test]
    fn test_unattended_stops_at_stage_c() {
        let (_tmp, dir, store) = album(&["01.flac", "02.flac"]);
        let provider = provider();
        provider.add_artist("a2", "Can Jam");
        let mut r = reconciler(
            &provider,
            &store,
            RunOptions {
                unattended: true,
                ..Default::default()
            },
        );

        let (session, fx) = r.begin(&dir);

        assert_eq!(session.outcome, Some(AlbumOutcome::Inspected));
        assert!(session.pairs.is_empty());
        assert!(fx.iter().any(|e| matches!(e, Effect::Warning(w) if w.contains("unattended"))));
        assert!(store.writes().is_empty());
    }

    #[test]
    fn test_swap_switches_to_manual() {
        let (_tmp, dir, store) = album(&["01.flac", "02.flac"]);
        let provider = provider();
        let mut r = reconciler(&provider, &store, RunOptions::default());
        let (mut session, _) = r.begin(&dir);
        r.handle(&mut session, Event::Choose(1));
        r.handle(&mut session, Event::Choose(1));

        r.handle(&mut session, Event::Swap(1, 2));

        assert_eq!(session.strategy, AlignStrategy::Manual);
        assert_eq!(session.pairs[0].remote().map(|t| t.title.as_str()), Some("Mushroom"));
        assert!(has_error(&r.handle(&mut session, Event::Swap(0, 1))));
    }

    #[test]
    fn test_commit_writes_and_tallies() {
        let (_tmp, dir, store) = album(&["01.flac", "02.flac"]);
        let provider = provider();
        let mut r = reconciler(&provider, &store, RunOptions::default());
        let (mut session, _) = r.begin(&dir);
        r.handle(&mut session, Event::Choose(1));
        r.handle(&mut session, Event::Choose(1));
        r.handle(
            &mut session,
            Event::SetField {
                selection: "1-2".to_string(),
                field: TagField::Genres,
                value: "Krautrock".to_string(),
            },
        );

        let fx = r.handle(&mut session, Event::Commit(Some("1".to_string())));

        assert!(fx.iter().any(|e| matches!(e, Effect::Committed(reports) if reports.len() == 1 && reports[0].wrote())));
        let written = store.get(&dir.join("01.flac")).unwrap();
        assert_eq!(written.title.as_deref(), Some("Paperhouse"));
        assert_eq!(written.album.as_deref(), Some("Tago Mago"));
        assert_eq!(written.album_artist.as_deref(), Some("Can"));
        assert_eq!(written.genres, vec!["Krautrock"]);
        assert_eq!(store.get(&dir.join("02.flac")).unwrap().title, None);
        assert_eq!(store.open_handles(), 0);
        assert_eq!(r.finish_run(), vec![("Krautrock".to_string(), 1)]);
    }

    #[test]
    fn test_preview_commit_writes_nothing() {
        let (_tmp, dir, store) = album(&["01.flac"]);
        let provider = provider();
        let mut r = reconciler(
            &provider,
            &store,
            RunOptions {
                preview: true,
                ..Default::default()
            },
        );
        let (mut session, _) = r.begin(&dir);
        r.handle(&mut session, Event::Choose(1));
        r.handle(&mut session, Event::Choose(1));

        r.handle(&mut session, Event::Commit(None));

        assert!(store.writes().is_empty());
        assert!(r.tally().is_empty());
    }

    #[test]
    fn test_album_artist_builder() {
        let (_tmp, dir, store) = album(&["01.flac"]);
        store.insert(
            dir.join("01.flac"),
            TagSnapshot {
                performers: vec!["Holger Czukay".to_string(), "Irmin Schmidt".to_string()],
                ..Default::default()
            },
            0,
        );
        let provider = provider();
        let mut r = reconciler(&provider, &store, RunOptions::default());
        let (mut session, _) = r.begin(&dir);
        r.handle(&mut session, Event::Choose(1));
        r.handle(&mut session, Event::Choose(1));

        r.handle(&mut session, Event::AlbumArtist(AlbumArtistInput::Pick("1,2".to_string())));
        assert_eq!(session.album_artist().as_deref(), Some("Holger Czukay; Irmin Schmidt"));
        r.handle(&mut session, Event::AlbumArtist(AlbumArtistInput::Clear));
        assert_eq!(session.album_artist().as_deref(), Some("Can"));
        assert_eq!(session.stage, Stage::Tracks);
    }

    #[test]
    fn test_combined_release_with_empty_constituent_offers_siblings() {
        let (_tmp, dir, store) = album(&["01.flac"]);
        let provider = StaticProvider::new("memory");
        provider
            .add_artist("a1", "Can")
            .add_release("a1", "r1", "Live", None, vec![remote("x", 1, "One")])
            .add_release("a1", "r2", "Live", None, vec![]);
        let mut r = reconciler(&provider, &store, RunOptions::default());
        let (mut session, _) = r.begin(&dir);
        r.handle(&mut session, Event::Choose(1));
        assert_eq!(session.groups.len(), 1);

        let fx = r.handle(&mut session, Event::ChooseCombined(1));

        assert_eq!(session.stage, Stage::Release);
        assert!(fx.iter().any(|e| matches!(
            e,
            Effect::Recovery { error: ProviderError::NoTracks { release_id }, siblings }
                if release_id == "r2" && siblings.len() == 1 && siblings[0].0 == 1
        )));
    }
}
