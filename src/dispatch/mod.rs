// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Action dispatch against the session backend.
//!
//! [`LiveContext`] holds everything derived from the backend (resolved
//! position, track tree, playing flag) plus the play-from mode. The
//! [`Dispatcher`] owns it, updates it through one entry point per backend
//! signal, and turns [`ControlAction`]s into backend commands.
//!
//! Nothing here aborts a performance: lookup misses and commands that did
//! not take effect are logged as warnings, backend errors as errors.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::{ControlsFile, PlaybackSettings, SoundSettings};
use crate::control::ControlAction;
use crate::markers::{Direction, Marker, PositionChange, PositionTracker, RawMarker};
use crate::session::{BackendEvent, SessionBackend, SessionResult};
use crate::tracks::{self, LeafTrack, Track, TrackId};

/// Where playback starts from when play is pressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayFrom {
    #[default]
    Song,
    Section,
}

impl PlayFrom {
    pub fn toggled(self) -> Self {
        match self {
            PlayFrom::Song => PlayFrom::Section,
            PlayFrom::Section => PlayFrom::Song,
        }
    }
}

impl fmt::Display for PlayFrom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayFrom::Song => f.write_str("song"),
            PlayFrom::Section => f.write_str("section"),
        }
    }
}

/// Latest derived state of the live set
#[derive(Debug, Clone, Default)]
pub struct LiveContext {
    pub tracker: PositionTracker,
    pub tree: Vec<Track>,
    pub playing: bool,
    pub play_from: PlayFrom,
}

impl LiveContext {
    pub fn current_song(&self) -> Option<&Marker> {
        self.tracker.current_song()
    }

    pub fn current_section(&self) -> Option<&Marker> {
        self.tracker.current_section()
    }

    /// Sounds of the current song, in track order
    pub fn current_sounds(&self, settings: &SoundSettings) -> Vec<&LeafTrack> {
        let song = self.current_song().map(|m| m.name.as_str());
        tracks::sounds_for_song(&self.tree, song, settings)
    }

    /// First armed sound of the current song
    pub fn armed_sound(&self, settings: &SoundSettings) -> Option<&LeafTrack> {
        self.current_sounds(settings).into_iter().find(|t| t.armed)
    }

    /// Backing tracks of the current song
    pub fn current_playback_tracks(&self, settings: &PlaybackSettings) -> &[Track] {
        let song = self.current_song().map(|m| m.name.as_str());
        tracks::playback_tracks_for_song(&self.tree, song, settings)
    }

    /// One-line summary for the log
    pub fn status(&self, settings: &SoundSettings) -> String {
        let song = self.current_song().map_or("-", |m| m.name.as_str());
        let section = self.current_section().map_or("-", |m| m.name.as_str());
        let sound = self.armed_sound(settings).map_or("-", |t| t.name.as_str());
        format!(
            "song: {} | section: {} | sound: {} | play from: {} | {}",
            song,
            section,
            sound,
            self.play_from,
            if self.playing { "playing" } else { "stopped" }
        )
    }
}

/// Turns control actions and backend signals into backend commands
pub struct Dispatcher<B> {
    backend: Arc<B>,
    sounds: SoundSettings,
    playback: PlaybackSettings,
    ctx: LiveContext,
}

impl<B: SessionBackend> Dispatcher<B> {
    pub fn new(backend: Arc<B>, config: &ControlsFile) -> Self {
        Self {
            backend,
            sounds: config.sounds.clone(),
            playback: config.playback.clone(),
            ctx: LiveContext::default(),
        }
    }

    pub fn context(&self) -> &LiveContext {
        &self.ctx
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Swap in reloaded settings
    pub fn apply_config(&mut self, config: &ControlsFile) {
        self.sounds = config.sounds.clone();
        self.playback = config.playback.clone();
    }

    pub fn status(&self) -> String {
        self.ctx.status(&self.sounds)
    }

    /// Fetch the full state from the backend
    pub async fn sync(&mut self) -> SessionResult<()> {
        let markers = self.backend.markers().await?;
        let position = self.backend.position().await?;
        self.ctx.tracker.set_markers(&markers);
        self.ctx.tracker.set_position(position);
        self.rewatch_and_rebuild().await?;
        self.ctx.playing = self.backend.is_playing().await?;
        info!("{}", self.status());
        Ok(())
    }

    /// Apply one backend notification
    pub async fn handle_event(&mut self, event: BackendEvent) {
        let result = match event {
            BackendEvent::MarkersChanged(markers) => self.on_markers(&markers).await,
            BackendEvent::PositionChanged(position) => self.on_position(position).await,
            BackendEvent::TracksChanged => self.on_tracks_changed().await,
            BackendEvent::TrackFlagChanged(id) => self.on_track_flag(&id).await,
            BackendEvent::PlayingChanged(playing) => {
                self.on_playing(playing);
                Ok(())
            }
        };
        if let Err(e) = result {
            error!("failed to apply backend update: {}", e);
        }
    }

    pub async fn on_markers(&mut self, markers: &[RawMarker]) -> SessionResult<()> {
        debug!(count = markers.len(), "markers changed");
        match self.ctx.tracker.set_markers(markers) {
            Some(change) => self.on_position_change(change).await,
            None => Ok(()),
        }
    }

    pub async fn on_position(&mut self, position: f64) -> SessionResult<()> {
        match self.ctx.tracker.set_position(position) {
            Some(change) => self.on_position_change(change).await,
            None => Ok(()),
        }
    }

    /// Re-register flag watches for every armable track, then rebuild
    pub async fn on_tracks_changed(&mut self) -> SessionResult<()> {
        debug!("track list changed");
        self.rewatch_and_rebuild().await
    }

    pub async fn on_track_flag(&mut self, id: &TrackId) -> SessionResult<()> {
        debug!(track = %id, "track flags changed");
        self.rebuild_tree().await
    }

    pub fn on_playing(&mut self, playing: bool) {
        if self.ctx.playing != playing {
            self.ctx.playing = playing;
            info!("{}", self.status());
        }
    }

    async fn rewatch_and_rebuild(&mut self) -> SessionResult<()> {
        let records = self.backend.tracks().await?;
        for record in records.iter().filter(|r| r.can_be_armed) {
            self.backend.watch_track_flags(&record.id).await?;
        }
        self.ctx.tree = tracks::build_tree(&records);
        Ok(())
    }

    async fn rebuild_tree(&mut self) -> SessionResult<()> {
        let records = self.backend.tracks().await?;
        self.ctx.tree = tracks::build_tree(&records);
        Ok(())
    }

    async fn on_position_change(&mut self, change: PositionChange) -> SessionResult<()> {
        info!("{}", self.status());
        if change.song_changed && change.resolved.current_song.is_some() {
            self.on_song_changed().await?;
        }
        Ok(())
    }

    async fn on_song_changed(&mut self) -> SessionResult<()> {
        let sounds: Vec<(TrackId, bool)> = self
            .ctx
            .current_sounds(&self.sounds)
            .iter()
            .map(|t| (t.id.clone(), t.armed))
            .collect();

        if let Some(mode) = self.sounds.monitor_mode {
            for (id, _) in &sounds {
                self.backend.set_monitor_mode(id, mode).await?;
            }
        }

        if self.sounds.arm_first_on_song_change {
            if let Some((first, armed)) = sounds.first() {
                if !*armed {
                    self.backend.set_arm(first, true).await?;
                    if !self.backend.is_armed(first).await? {
                        warn!(track = %first, "arming the first sound did not take effect, leaving other sounds armed");
                        return Ok(());
                    }
                }
                for (id, armed) in sounds.iter().skip(1) {
                    if *armed {
                        self.backend.set_arm(id, false).await?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Perform an action. Failures are logged, never returned.
    pub async fn perform(&mut self, action: ControlAction) {
        debug!(%action, "perform");
        if let Err(e) = self.try_perform(action).await {
            error!(%action, "action failed: {}", e);
        }
    }

    async fn try_perform(&mut self, action: ControlAction) -> SessionResult<()> {
        match action {
            ControlAction::NextSound => self.switch_sound(Direction::Next).await,
            ControlAction::PreviousSound => self.switch_sound(Direction::Previous).await,
            ControlAction::ToggleMute => self.toggle_mute().await,
            ControlAction::NextSong => self.switch_song(Direction::Next).await,
            ControlAction::PreviousSong => self.switch_song(Direction::Previous).await,
            ControlAction::NextSection => self.switch_section(Direction::Next).await,
            ControlAction::PreviousSection => self.switch_section(Direction::Previous).await,
            ControlAction::PlayPause => self.play_pause().await,
            ControlAction::TogglePlayFrom => {
                self.ctx.play_from = self.ctx.play_from.toggled();
                info!(play_from = %self.ctx.play_from, "play from mode changed");
                Ok(())
            }
            ControlAction::LoopStartToSection => self.loop_start_to_section().await,
            ControlAction::LoopEndToSection => self.loop_end_to_section().await,
            ControlAction::Quit => Ok(()),
        }
    }

    /// Arm the neighboring sound, then disarm the old one once the new
    /// one is confirmed armed.
    async fn switch_sound(&mut self, direction: Direction) -> SessionResult<()> {
        let sounds: Vec<(TrackId, String, bool)> = self
            .ctx
            .current_sounds(&self.sounds)
            .iter()
            .map(|t| (t.id.clone(), t.name.clone(), t.armed))
            .collect();
        if sounds.is_empty() {
            warn!("no sounds for the current song");
            return Ok(());
        }

        let current = sounds.iter().position(|(_, _, armed)| *armed);
        let target = match (current, direction) {
            // Nothing armed yet: start from the edge of the list
            (None, Direction::Next) => Some(0),
            (None, Direction::Previous) => Some(sounds.len() - 1),
            (Some(i), Direction::Next) => Some(i + 1).filter(|&n| n < sounds.len()),
            (Some(i), Direction::Previous) => i.checked_sub(1),
        };
        let Some(target) = target else {
            warn!(?direction, sound = %sounds[current.unwrap_or(0)].1, "no more sounds in this direction");
            return Ok(());
        };

        let (target_id, target_name, _) = &sounds[target];
        self.backend.set_arm(target_id, true).await?;
        if !self.backend.is_armed(target_id).await? {
            warn!(sound = %target_name, "arming did not take effect, keeping the current sound armed");
            return Ok(());
        }
        info!("armed sound '{}'", target_name);

        if let Some(current) = current {
            let (old_id, old_name, _) = &sounds[current];
            self.backend.set_arm(old_id, false).await?;
            debug!("disarmed sound '{}'", old_name);
        }
        Ok(())
    }

    async fn toggle_mute(&mut self) -> SessionResult<()> {
        let Some(sound) = self.ctx.armed_sound(&self.sounds) else {
            warn!("no armed sound to mute");
            return Ok(());
        };
        let (id, name, muted) = (sound.id.clone(), sound.name.clone(), sound.muted);
        self.backend.set_mute(&id, !muted).await?;
        info!("{} sound '{}'", if muted { "unmuted" } else { "muted" }, name);
        Ok(())
    }

    /// Jump to the neighboring song and disarm the sounds of the old one
    async fn switch_song(&mut self, direction: Direction) -> SessionResult<()> {
        let Some(current) = self.ctx.current_song() else {
            warn!("playhead is before the first song");
            return Ok(());
        };
        let target = match direction {
            Direction::Next => self.ctx.tracker.next_song(),
            Direction::Previous => self.ctx.tracker.previous_song(),
        };
        let Some(target) = target.cloned() else {
            warn!(song = %current.name, ?direction, "no more songs in this direction");
            return Ok(());
        };

        let armed: Vec<TrackId> = self
            .ctx
            .current_sounds(&self.sounds)
            .iter()
            .filter(|t| t.armed)
            .map(|t| t.id.clone())
            .collect();

        self.backend.jump_to_time(target.time).await?;
        info!("jumped to song '{}'", target.name);
        for id in &armed {
            self.backend.set_arm(id, false).await?;
        }
        Ok(())
    }

    async fn switch_section(&mut self, direction: Direction) -> SessionResult<()> {
        let target = match direction {
            Direction::Next => self.ctx.tracker.next_section(),
            Direction::Previous => self.ctx.tracker.previous_section(),
        };
        let Some(target) = target.cloned() else {
            if self.ctx.current_section().is_none() && !self.ctx.tracker.song_sections().is_empty() {
                warn!(?direction, "playhead is before the first section of the song");
            } else {
                warn!(?direction, "no section to jump to in the current song");
            }
            return Ok(());
        };
        self.backend.jump_to_time(target.time).await?;
        info!("jumped to section '{}'", target.name);
        Ok(())
    }

    async fn play_pause(&mut self) -> SessionResult<()> {
        let playing = self.backend.is_playing().await?;
        self.ctx.playing = playing;
        if playing {
            self.backend.set_playing(false).await?;
            info!("stopped");
            return Ok(());
        }

        let start = match self.ctx.play_from {
            PlayFrom::Section => self.ctx.current_section().or(self.ctx.current_song()),
            PlayFrom::Song => self.ctx.current_song(),
        };
        match start.cloned() {
            Some(marker) => {
                self.backend.jump_to_time(marker.time).await?;
                info!("playing from '{}'", marker.name);
            }
            None => warn!("no marker to start from, playing from the current position"),
        }
        self.backend.set_playing(true).await
    }

    async fn loop_start_to_section(&mut self) -> SessionResult<()> {
        let Some(section) = self.ctx.current_section().cloned() else {
            warn!("no current section to start the loop at");
            return Ok(());
        };
        let region = self.backend.loop_region().await?;
        let length = region.end() - section.time;
        if length <= 0.0 {
            warn!(section = %section.name, loop_end = region.end(), "loop start would be after the loop end");
            return Ok(());
        }
        self.push_loop(section.time, length).await?;
        info!("loop starts at section '{}'", section.name);
        Ok(())
    }

    /// Loop end goes to the end of the current section: the next section
    /// of the song, else the next song, else the end of the set.
    async fn loop_end_to_section(&mut self) -> SessionResult<()> {
        let position = self.ctx.tracker.position();
        let next_section = self
            .ctx
            .tracker
            .song_sections()
            .iter()
            .find(|s| s.time > position)
            .map(|s| s.time);
        let end = match next_section.or(self.ctx.tracker.next_song().map(|s| s.time)) {
            Some(end) => end,
            None => self.backend.song_length().await?,
        };

        let region = self.backend.loop_region().await?;
        let length = end - region.start;
        if length <= 0.0 {
            warn!(loop_start = region.start, end, "loop end would be before the loop start");
            return Ok(());
        }
        self.push_loop(region.start, length).await?;
        info!(end, "loop end moved");
        Ok(())
    }

    /// Resetting the start to 0 first keeps every intermediate loop
    /// inside the song.
    async fn push_loop(&self, start: f64, length: f64) -> SessionResult<()> {
        self.backend.set_loop(0.0, length).await?;
        self.backend.set_loop(start, length).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{LoopRegion, MemorySession, SessionCommand, SessionFile};
    use crate::tracks::{MonitorMode, TrackRecord};
    use tokio::sync::mpsc::UnboundedReceiver;

    fn live_set(position: f64) -> SessionFile {
        SessionFile {
            song_length: 200.0,
            position,
            playing: false,
            loop_region: LoopRegion::new(0.0, 16.0),
            markers: vec![
                RawMarker::new("Intro", 0.0),
                RawMarker::new("#Verse", 0.0),
                RawMarker::new("#Chorus", 40.0),
                RawMarker::new("Bridge", 90.0),
            ],
            tracks: vec![
                TrackRecord::group("1", "Guitar Sounds", None),
                TrackRecord::group("2", "Intro", Some("1")),
                TrackRecord::leaf("3", "Clean", Some("2")).armed(true),
                TrackRecord::leaf("4", "Crunch", Some("2")),
                TrackRecord::leaf("5", "Lead", Some("2")),
                TrackRecord::group("6", "Default", Some("1")),
                TrackRecord::leaf("7", "Default Clean", Some("6")),
                TrackRecord::group("8", "Bridge", Some("1")),
                TrackRecord::leaf("9", "Ambient", Some("8")),
                TrackRecord::leaf("10", "Swell", Some("8")),
                TrackRecord::group("11", "Playback Tracks", None),
                TrackRecord::group("12", "Intro", Some("11")),
                TrackRecord::leaf("13", "Keys", Some("12")),
            ],
        }
    }

    async fn setup_with(
        file: SessionFile,
        config: ControlsFile,
    ) -> (Dispatcher<MemorySession>, Arc<MemorySession>, UnboundedReceiver<BackendEvent>) {
        let session = Arc::new(MemorySession::new(file));
        session.connect().await.unwrap();
        let events = session.subscribe();
        let mut dispatcher = Dispatcher::new(session.clone(), &config);
        dispatcher.sync().await.unwrap();
        (dispatcher, session, events)
    }

    async fn setup(position: f64) -> (Dispatcher<MemorySession>, Arc<MemorySession>, UnboundedReceiver<BackendEvent>) {
        setup_with(live_set(position), ControlsFile::default()).await
    }

    /// Feed pending backend events back into the dispatcher
    async fn pump(dispatcher: &mut Dispatcher<MemorySession>, events: &mut UnboundedReceiver<BackendEvent>) {
        while let Ok(event) = events.try_recv() {
            dispatcher.handle_event(event).await;
        }
    }

    fn id(id: &str) -> TrackId {
        TrackId::from(id)
    }

    #[tokio::test]
    async fn test_sync_builds_context() {
        let (dispatcher, _, _) = setup(45.0).await;
        let ctx = dispatcher.context();
        assert_eq!(ctx.current_song().unwrap().name, "Intro");
        assert_eq!(ctx.current_section().unwrap().name, "Chorus");
        assert_eq!(ctx.armed_sound(&SoundSettings::default()).unwrap().name, "Clean");
        let playback = ctx.current_playback_tracks(&PlaybackSettings::default());
        assert_eq!(playback[0].name(), "Keys");
        assert!(!ctx.playing);
    }

    #[tokio::test]
    async fn test_next_sound_arms_before_disarming() {
        let (mut dispatcher, session, mut events) = setup(45.0).await;
        dispatcher.perform(ControlAction::NextSound).await;
        assert_eq!(
            session.commands(),
            vec![
                SessionCommand::SetArm(id("4"), true),
                SessionCommand::SetArm(id("3"), false),
            ]
        );

        pump(&mut dispatcher, &mut events).await;
        let armed = dispatcher.context().armed_sound(&SoundSettings::default()).unwrap();
        assert_eq!(armed.name, "Crunch");
    }

    #[tokio::test]
    async fn test_next_sound_at_last_track_is_noop() {
        let mut file = live_set(45.0);
        file.tracks[2].armed = false;
        file.tracks[4].armed = true;
        let (mut dispatcher, session, _) = setup_with(file, ControlsFile::default()).await;

        dispatcher.perform(ControlAction::NextSound).await;
        assert!(session.commands().is_empty());
        assert!(session.is_armed(&id("5")).await.unwrap());
    }

    #[tokio::test]
    async fn test_previous_sound_at_first_track_is_noop() {
        let (mut dispatcher, session, _) = setup(45.0).await;
        dispatcher.perform(ControlAction::PreviousSound).await;
        assert!(session.commands().is_empty());
    }

    #[tokio::test]
    async fn test_failed_arm_keeps_old_sound() {
        let (mut dispatcher, session, _) = setup(45.0).await;
        session.reject_arm("4");

        dispatcher.perform(ControlAction::NextSound).await;
        assert_eq!(session.commands(), vec![SessionCommand::SetArm(id("4"), true)]);
        assert!(session.is_armed(&id("3")).await.unwrap());
    }

    #[tokio::test]
    async fn test_sound_switch_with_nothing_armed() {
        let mut file = live_set(45.0);
        file.tracks[2].armed = false;
        let (mut dispatcher, session, _) = setup_with(file, ControlsFile::default()).await;

        dispatcher.perform(ControlAction::PreviousSound).await;
        assert_eq!(session.commands(), vec![SessionCommand::SetArm(id("5"), true)]);
    }

    #[tokio::test]
    async fn test_song_switch_jumps_and_disarms() {
        let (mut dispatcher, session, mut events) = setup(45.0).await;
        dispatcher.perform(ControlAction::NextSong).await;
        assert_eq!(
            session.commands(),
            vec![
                SessionCommand::JumpToTime(90.0),
                SessionCommand::SetArm(id("3"), false),
            ]
        );

        pump(&mut dispatcher, &mut events).await;
        assert_eq!(dispatcher.context().current_song().unwrap().name, "Bridge");

        session.clear_commands();
        dispatcher.perform(ControlAction::NextSong).await;
        assert!(session.commands().is_empty());

        dispatcher.perform(ControlAction::PreviousSong).await;
        assert_eq!(session.commands(), vec![SessionCommand::JumpToTime(0.0)]);
    }

    #[tokio::test]
    async fn test_section_switch_stays_in_song() {
        let (mut dispatcher, session, mut events) = setup(10.0).await;
        dispatcher.perform(ControlAction::NextSection).await;
        assert_eq!(session.commands(), vec![SessionCommand::JumpToTime(40.0)]);

        pump(&mut dispatcher, &mut events).await;
        session.clear_commands();
        // Chorus is the last section of Intro
        dispatcher.perform(ControlAction::NextSection).await;
        assert!(session.commands().is_empty());

        dispatcher.perform(ControlAction::PreviousSection).await;
        assert_eq!(session.commands(), vec![SessionCommand::JumpToTime(0.0)]);
    }

    #[tokio::test]
    async fn test_next_section_before_first_section() {
        let (mut dispatcher, session, mut events) = setup(95.0).await;
        session.replace_markers(vec![
            RawMarker::new("Intro", 0.0),
            RawMarker::new("#Verse", 0.0),
            RawMarker::new("#Chorus", 40.0),
            RawMarker::new("Bridge", 90.0),
            RawMarker::new("#Solo", 120.0),
        ]);
        pump(&mut dispatcher, &mut events).await;
        assert_eq!(dispatcher.context().current_song().map(|s| s.name.as_str()), Some("Bridge"));
        assert!(dispatcher.context().current_section().is_none());

        // Not inside a section yet, so there is nothing to step from
        dispatcher.perform(ControlAction::NextSection).await;
        assert!(session.commands().is_empty());
    }

    #[tokio::test]
    async fn test_play_from_song_and_section() {
        let (mut dispatcher, session, mut events) = setup(45.0).await;
        dispatcher.perform(ControlAction::PlayPause).await;
        assert_eq!(
            session.commands(),
            vec![SessionCommand::JumpToTime(0.0), SessionCommand::SetPlaying(true)]
        );

        pump(&mut dispatcher, &mut events).await;
        assert!(dispatcher.context().playing);

        session.clear_commands();
        dispatcher.perform(ControlAction::PlayPause).await;
        assert_eq!(session.commands(), vec![SessionCommand::SetPlaying(false)]);

        // Toggling the mode does not touch playback
        session.clear_commands();
        session.move_playhead(45.0);
        pump(&mut dispatcher, &mut events).await;
        dispatcher.perform(ControlAction::TogglePlayFrom).await;
        assert_eq!(dispatcher.context().play_from, PlayFrom::Section);
        assert!(session.commands().is_empty());

        dispatcher.perform(ControlAction::PlayPause).await;
        assert_eq!(
            session.commands(),
            vec![SessionCommand::JumpToTime(40.0), SessionCommand::SetPlaying(true)]
        );
    }

    #[tokio::test]
    async fn test_play_from_section_falls_back_to_song() {
        let (mut dispatcher, session, _) = setup(95.0).await;
        dispatcher.perform(ControlAction::TogglePlayFrom).await;
        dispatcher.perform(ControlAction::PlayPause).await;
        assert_eq!(
            session.commands(),
            vec![SessionCommand::JumpToTime(90.0), SessionCommand::SetPlaying(true)]
        );
    }

    #[tokio::test]
    async fn test_loop_start_resets_start_first() {
        let mut file = live_set(45.0);
        file.loop_region = LoopRegion::new(0.0, 100.0);
        let (mut dispatcher, session, _) = setup_with(file, ControlsFile::default()).await;

        dispatcher.perform(ControlAction::LoopStartToSection).await;
        assert_eq!(
            session.commands(),
            vec![SessionCommand::SetLoop(0.0, 60.0), SessionCommand::SetLoop(40.0, 60.0)]
        );
        assert_eq!(session.loop_region().await.unwrap(), LoopRegion::new(40.0, 60.0));
    }

    #[tokio::test]
    async fn test_loop_start_after_end_is_rejected() {
        let (mut dispatcher, session, _) = setup(45.0).await;
        // Loop ends at 16, Chorus starts at 40
        dispatcher.perform(ControlAction::LoopStartToSection).await;
        assert!(session.commands().is_empty());
    }

    #[tokio::test]
    async fn test_loop_end_to_section_end() {
        let (mut dispatcher, session, _) = setup(10.0).await;
        dispatcher.perform(ControlAction::LoopEndToSection).await;
        assert_eq!(
            session.commands(),
            vec![SessionCommand::SetLoop(0.0, 40.0), SessionCommand::SetLoop(0.0, 40.0)]
        );

        // Last section of a song ends at the next song
        let (mut dispatcher, session, _) = setup(45.0).await;
        dispatcher.perform(ControlAction::LoopEndToSection).await;
        assert_eq!(session.loop_region().await.unwrap(), LoopRegion::new(0.0, 90.0));

        // Last song ends at the end of the set
        let (mut dispatcher, session, _) = setup(95.0).await;
        dispatcher.perform(ControlAction::LoopEndToSection).await;
        assert_eq!(session.loop_region().await.unwrap(), LoopRegion::new(0.0, 200.0));
    }

    #[tokio::test]
    async fn test_toggle_mute_of_armed_sound() {
        let (mut dispatcher, session, mut events) = setup(45.0).await;
        dispatcher.perform(ControlAction::ToggleMute).await;
        assert_eq!(session.commands(), vec![SessionCommand::SetMute(id("3"), true)]);

        pump(&mut dispatcher, &mut events).await;
        session.clear_commands();
        dispatcher.perform(ControlAction::ToggleMute).await;
        assert_eq!(session.commands(), vec![SessionCommand::SetMute(id("3"), false)]);
    }

    #[tokio::test]
    async fn test_song_change_hooks() {
        let mut config = ControlsFile::default();
        config.sounds.arm_first_on_song_change = true;
        config.sounds.monitor_mode = Some(MonitorMode::In);
        let mut file = live_set(45.0);
        file.tracks[9].armed = true;
        let (mut dispatcher, session, mut events) = setup_with(file, config).await;

        session.move_playhead(95.0);
        pump(&mut dispatcher, &mut events).await;
        assert_eq!(
            session.commands(),
            vec![
                SessionCommand::SetMonitorMode(id("9"), MonitorMode::In),
                SessionCommand::SetMonitorMode(id("10"), MonitorMode::In),
                SessionCommand::SetArm(id("9"), true),
                SessionCommand::SetArm(id("10"), false),
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_auto_arm_keeps_armed_sound() {
        let mut config = ControlsFile::default();
        config.sounds.arm_first_on_song_change = true;
        let mut file = live_set(45.0);
        file.tracks[9].armed = true;
        let (mut dispatcher, session, mut events) = setup_with(file, config).await;
        session.reject_arm("9");

        session.move_playhead(95.0);
        pump(&mut dispatcher, &mut events).await;
        assert_eq!(session.commands(), vec![SessionCommand::SetArm(id("9"), true)]);
        assert!(session.is_armed(&id("10")).await.unwrap());
        assert!(!session.is_armed(&id("9")).await.unwrap());
    }

    #[tokio::test]
    async fn test_position_jitter_does_not_rerun_hooks() {
        let mut config = ControlsFile::default();
        config.sounds.monitor_mode = Some(MonitorMode::Auto);
        let (mut dispatcher, session, _) = setup_with(live_set(45.0), config).await;

        for position in [45.5, 46.0, 60.0, 89.9] {
            dispatcher.on_position(position).await.unwrap();
        }
        assert!(session.commands().is_empty());
    }

    #[tokio::test]
    async fn test_track_edits_rebuild_tree() {
        let (mut dispatcher, session, mut events) = setup(45.0).await;

        session.arm_externally(&id("5"), true);
        pump(&mut dispatcher, &mut events).await;
        let sounds = dispatcher.context().current_sounds(&SoundSettings::default());
        assert!(sounds[2].armed);

        let mut tracks = live_set(45.0).tracks;
        tracks.push(TrackRecord::leaf("14", "Fuzz", Some("2")));
        session.replace_tracks(tracks);
        pump(&mut dispatcher, &mut events).await;
        let names: Vec<String> = dispatcher
            .context()
            .current_sounds(&SoundSettings::default())
            .iter()
            .map(|t| t.name.clone())
            .collect();
        assert_eq!(names, vec!["Clean", "Crunch", "Lead", "Fuzz"]);

        // New tracks are watched after the rebuild
        session.arm_externally(&id("14"), true);
        assert_eq!(events.try_recv().unwrap(), BackendEvent::TrackFlagChanged(id("14")));
    }

    #[tokio::test]
    async fn test_status_line() {
        let (dispatcher, _, _) = setup(45.0).await;
        assert_eq!(
            dispatcher.status(),
            "song: Intro | section: Chorus | sound: Clean | play from: song | stopped"
        );
    }
}
