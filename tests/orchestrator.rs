//! Playback orchestrator integration tests
//!
//! Drive `MusicPlayer` end to end with an in-memory resolver, transport and
//! settings store. Track completion is triggered by hand through the fake
//! transport.

mod common;

use common::*;
use music_maniac::{
    audio::{
        effects::AudioFilter, queue::LoopMode, transport::PlayOutcome, CommandOutcome, PlayerConfig,
        PlayerState,
    },
    error::{PlaybackError, ResolutionError, TransportError},
    storage::GuildSettings,
};
use pretty_assertions::assert_eq;
use std::{sync::Arc, time::Duration};

// ===== Basic flow =====

#[tokio::test]
async fn test_play_on_absent_guild_connects_and_starts() {
    let h = Harness::new();

    let outcome = h.player.play(GUILD, CHANNEL, "A").await.unwrap();
    assert_eq!(outcome, CommandOutcome::Started(track("A")));

    let status = h.player.status(GUILD).await;
    assert_eq!(status.state, PlayerState::Playing);
    assert_eq!(status.current, Some(track("A")));
    assert!(status.queue.is_empty());
    assert_eq!(h.transport.live(), 1);
    assert_eq!(h.transport.last_play(GUILD).unwrap().stream_url, "https://stream.test/A");
}

#[tokio::test]
async fn test_play_while_playing_appends_to_queue() {
    let h = Harness::new();
    h.player.play(GUILD, CHANNEL, "A").await.unwrap();

    assert_eq!(
        h.player.play(GUILD, CHANNEL, "B").await.unwrap(),
        CommandOutcome::Queued { position: 1 }
    );
    assert_eq!(
        h.player.play(GUILD, CHANNEL, "C").await.unwrap(),
        CommandOutcome::Queued { position: 2 }
    );

    let status = h.player.status(GUILD).await;
    assert_eq!(status.state, PlayerState::Playing);
    assert_eq!(status.current, Some(track("A")));
    assert_eq!(status.queue, vec!["B".to_string(), "C".to_string()]);
    assert_eq!(h.transport.state.lock().connects, 1);
}

#[tokio::test]
async fn test_skip_starts_next_track() {
    let h = Harness::new();
    h.player.play(GUILD, CHANNEL, "A").await.unwrap();
    h.player.play(GUILD, CHANNEL, "B").await.unwrap();

    assert_eq!(
        h.player.skip(GUILD).await.unwrap(),
        CommandOutcome::Skipped { next: Some(track("B")) }
    );

    let status = h.player.status(GUILD).await;
    assert_eq!(status.state, PlayerState::Playing);
    assert_eq!(status.current, Some(track("B")));
    assert!(status.queue.is_empty());
}

#[tokio::test]
async fn test_skip_with_empty_queue_goes_idle() {
    let h = Harness::new();
    h.player.play(GUILD, CHANNEL, "A").await.unwrap();

    assert_eq!(h.player.skip(GUILD).await.unwrap(), CommandOutcome::Skipped { next: None });

    let status = h.player.status(GUILD).await;
    assert_eq!(status.state, PlayerState::Idle);
    assert_eq!(status.current, None);
    // Sigue conectado
    assert_eq!(h.transport.live(), 1);
}

#[tokio::test]
async fn test_stop_clears_everything_and_disconnects() {
    let h = Harness::new();
    h.player.play(GUILD, CHANNEL, "A").await.unwrap();
    h.player.play(GUILD, CHANNEL, "B").await.unwrap();

    assert_eq!(h.player.stop(GUILD).await.unwrap(), CommandOutcome::Stopped);

    let status = h.player.status(GUILD).await;
    assert_eq!(status.state, PlayerState::Disconnected);
    assert_eq!(status.current, None);
    assert!(status.queue.is_empty());
    assert_eq!(h.transport.live(), 0);
    assert_eq!(h.player.active_sessions(), 0);

    // Commands against the gone session do nothing
    assert_eq!(
        h.player.skip(GUILD).await,
        Err(PlaybackError::invalid_state("skip", PlayerState::Disconnected))
    );
}

#[tokio::test]
async fn test_play_after_stop_creates_a_fresh_session() {
    let h = Harness::new();
    h.player.play(GUILD, CHANNEL, "A").await.unwrap();
    h.player.play(GUILD, CHANNEL, "B").await.unwrap();
    h.player.stop(GUILD).await.unwrap();

    assert_eq!(
        h.player.play(GUILD, CHANNEL, "C").await.unwrap(),
        CommandOutcome::Started(track("C"))
    );
    let status = h.player.status(GUILD).await;
    assert!(status.queue.is_empty());
    assert_eq!(h.transport.state.lock().connects, 2);
    assert_eq!(h.transport.live(), 1);
}

#[tokio::test]
async fn test_natural_finish_advances_then_idles() {
    let h = Harness::new();
    h.player.play(GUILD, CHANNEL, "A").await.unwrap();
    h.player.play(GUILD, CHANNEL, "B").await.unwrap();

    h.transport.finish_current(GUILD, PlayOutcome::Natural);
    assert_eq!(h.settled(GUILD).await.current, Some(track("B")));

    h.transport.finish_current(GUILD, PlayOutcome::Errored);
    let status = h.player.status(GUILD).await;
    assert_eq!(status.state, PlayerState::Idle);
    assert_eq!(status.current, None);
}

#[tokio::test]
async fn test_play_from_idle_does_not_reconnect() {
    let h = Harness::new();
    h.player.play(GUILD, CHANNEL, "A").await.unwrap();
    h.transport.finish_current(GUILD, PlayOutcome::Natural);
    assert_eq!(h.player.status(GUILD).await.state, PlayerState::Idle);

    assert_eq!(
        h.player.play(GUILD, CHANNEL, "B").await.unwrap(),
        CommandOutcome::Started(track("B"))
    );
    assert_eq!(h.transport.state.lock().connects, 1);
}

// ===== Invalid commands =====

#[tokio::test]
async fn test_commands_that_make_no_sense_are_rejected() {
    let h = Harness::new();

    assert_eq!(
        h.player.pause(GUILD).await,
        Err(PlaybackError::invalid_state("pause", PlayerState::Disconnected))
    );
    assert_eq!(h.player.active_sessions(), 0);

    h.player.play(GUILD, CHANNEL, "A").await.unwrap();
    assert_eq!(
        h.player.resume(GUILD).await,
        Err(PlaybackError::invalid_state("resume", PlayerState::Playing))
    );

    h.player.skip(GUILD).await.unwrap();
    assert_eq!(
        h.player.skip(GUILD).await,
        Err(PlaybackError::invalid_state("skip", PlayerState::Idle))
    );
    assert_eq!(
        h.player.pause(GUILD).await,
        Err(PlaybackError::invalid_state("pause", PlayerState::Idle))
    );
}

#[tokio::test]
async fn test_pause_and_resume() {
    let h = Harness::new();
    h.player.play(GUILD, CHANNEL, "A").await.unwrap();

    assert_eq!(h.player.pause(GUILD).await.unwrap(), CommandOutcome::Paused);
    assert!(h.transport.state.lock().paused);
    assert_eq!(h.player.status(GUILD).await.state, PlayerState::Paused);

    // play while paused only queues
    assert_eq!(
        h.player.play(GUILD, CHANNEL, "B").await.unwrap(),
        CommandOutcome::Queued { position: 1 }
    );

    assert_eq!(h.player.resume(GUILD).await.unwrap(), CommandOutcome::Resumed);
    assert!(!h.transport.state.lock().paused);
    assert_eq!(h.player.status(GUILD).await.state, PlayerState::Playing);
}

#[tokio::test]
async fn test_play_while_paused_only_enqueues() {
    let h = Harness::new();
    h.player.play(GUILD, CHANNEL, "A").await.unwrap();
    h.player.pause(GUILD).await.unwrap();

    assert_eq!(
        h.player.play(GUILD, CHANNEL, "B").await.unwrap(),
        CommandOutcome::Queued { position: 1 }
    );

    let status = h.player.status(GUILD).await;
    assert_eq!(status.state, PlayerState::Paused);
    assert_eq!(status.current, Some(track("A")));
    assert_eq!(status.queue, vec!["B".to_string()]);
    assert_eq!(h.transport.plays_for(GUILD).len(), 1);
    assert!(h.transport.state.lock().paused);
}

#[tokio::test]
async fn test_volume_out_of_range_is_invalid_argument() {
    let h = Harness::new();
    h.player.play(GUILD, CHANNEL, "A").await.unwrap();

    assert!(matches!(
        h.player.set_volume(GUILD, 151).await,
        Err(PlaybackError::InvalidArgument(_))
    ));
    assert_eq!(h.player.status(GUILD).await.volume, 100);
}

#[tokio::test]
async fn test_filters_can_be_disabled() {
    let config = PlayerConfig { enable_filters: false, ..PlayerConfig::default() };
    let h = Harness::build(FakeTransport::default(), MemorySettings::default(), config);
    h.player.play(GUILD, CHANNEL, "A").await.unwrap();

    assert!(matches!(
        h.player.set_filter(GUILD, AudioFilter::Nightcore).await,
        Err(PlaybackError::InvalidArgument(_))
    ));
}

// ===== Errors =====

#[tokio::test]
async fn test_resolution_failure_leaves_guild_disconnected() {
    let h = Harness::new();

    assert_eq!(
        h.player.play(GUILD, CHANNEL, "missing song").await,
        Err(PlaybackError::Resolution(ResolutionError::NotFound("missing song".into())))
    );
    assert_eq!(h.player.active_sessions(), 0);
    assert_eq!(h.transport.state.lock().connects, 0);
    assert_eq!(h.player.status(GUILD).await.state, PlayerState::Disconnected);
}

#[tokio::test]
async fn test_connect_failure_surfaces_transport_error() {
    let h = Harness::new();
    h.transport
        .fail_connects_with(TransportError::JoinDenied("sin permisos".into()));

    assert_eq!(
        h.player.play(GUILD, CHANNEL, "A").await,
        Err(PlaybackError::Transport(TransportError::JoinDenied("sin permisos".into())))
    );
    assert_eq!(h.player.active_sessions(), 0);
}

#[tokio::test]
async fn test_unresolvable_queued_tracks_are_skipped() {
    let h = Harness::new();
    h.player.play(GUILD, CHANNEL, "A").await.unwrap();
    h.player.play(GUILD, CHANNEL, "missing B").await.unwrap();
    h.player.play(GUILD, CHANNEL, "C").await.unwrap();

    h.transport.finish_current(GUILD, PlayOutcome::Natural);

    let status = h.settled(GUILD).await;
    assert_eq!(status.current, Some(track("C")));
    assert!(status.queue.is_empty());
}

#[tokio::test]
async fn test_connection_loss_tears_session_down() {
    let h = Harness::new();
    h.player.play(GUILD, CHANNEL, "A").await.unwrap();
    h.player.play(GUILD, CHANNEL, "B").await.unwrap();

    h.transport.drop_connection(GUILD);

    assert!(eventually(|| h.player.active_sessions() == 0).await);
    assert_eq!(h.transport.live(), 0);
    assert_eq!(h.player.status(GUILD).await.state, PlayerState::Disconnected);
}

// ===== Concurrency =====

#[tokio::test]
async fn test_concurrent_plays_share_one_connection() {
    let h = Harness::new();

    let (first, second) = tokio::join!(
        h.player.play(GUILD, CHANNEL, "A"),
        h.player.play(GUILD, CHANNEL, "A")
    );

    let mut outcomes = vec![first.unwrap(), second.unwrap()];
    outcomes.sort_by_key(|outcome| matches!(outcome, CommandOutcome::Queued { .. }));
    assert_eq!(
        outcomes,
        vec![CommandOutcome::Started(track("A")), CommandOutcome::Queued { position: 1 }]
    );

    let state = h.transport.state.lock();
    assert_eq!(state.connects, 1);
    assert_eq!(state.max_live, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_play_burst_never_opens_two_connections() {
    let h = Arc::new(Harness::new());

    let tasks: Vec<_> = (0..20)
        .map(|i| {
            let h = h.clone();
            tokio::spawn(async move { h.player.play(GUILD, CHANNEL, format!("track {}", i)).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let status = h.player.status(GUILD).await;
    assert_eq!(status.state, PlayerState::Playing);
    assert_eq!(status.queue.len(), 19);
    assert_eq!(h.transport.state.lock().max_live, 1);
}

#[tokio::test]
async fn test_stop_while_connecting_discards_late_connection() {
    let (transport, gate) = FakeTransport::gated();
    let h = Arc::new(Harness::with_transport(transport));

    let pending = {
        let h = h.clone();
        tokio::spawn(async move { h.player.play(GUILD, CHANNEL, "A").await })
    };
    let h2 = h.clone();
    let connecting = move || h2.resolver.calls.lock().len() == 1;
    assert!(eventually(connecting).await);
    assert_eq!(h.player.status(GUILD).await.state, PlayerState::Connecting);

    assert_eq!(h.player.stop(GUILD).await.unwrap(), CommandOutcome::Stopped);
    gate.notify_one();

    assert_eq!(pending.await.unwrap(), Err(PlaybackError::ConcurrencyStale));
    let state = h.transport.state.lock();
    assert_eq!(state.abandoned, 1);
    assert_eq!(state.live, 0);
    assert!(state.plays.is_empty());
    assert!(state.calls.is_empty());
}

#[tokio::test]
async fn test_play_after_stop_while_connecting_is_not_disturbed_by_late_connect() {
    let (transport, gate) = FakeTransport::gated();
    let h = Arc::new(Harness::with_transport(transport));

    let stale = {
        let h = h.clone();
        tokio::spawn(async move { h.player.play(GUILD, CHANNEL, "A").await })
    };
    let h2 = h.clone();
    assert!(eventually(move || h2.resolver.calls.lock().len() == 1).await);
    assert_eq!(h.player.stop(GUILD).await.unwrap(), CommandOutcome::Stopped);

    let fresh = {
        let h = h.clone();
        tokio::spawn(async move { h.player.play(GUILD, CHANNEL, "B").await })
    };
    let h2 = h.clone();
    assert!(eventually(move || h2.resolver.calls.lock().len() == 2).await);
    assert_eq!(h.player.status(GUILD).await.state, PlayerState::Connecting);

    // Both joins are waiting on the same guild; release them together
    gate.notify_waiters();

    assert_eq!(fresh.await.unwrap(), Ok(CommandOutcome::Started(track("B"))));
    assert_eq!(stale.await.unwrap(), Err(PlaybackError::ConcurrencyStale));

    {
        let state = h.transport.state.lock();
        assert_eq!(state.connects, 1);
        assert_eq!(state.abandoned, 1);
        assert_eq!(state.live, 1);
    }
    assert_eq!(h.transport.call_owner(GUILD), Some(1));
    let status = h.player.status(GUILD).await;
    assert_eq!(status.state, PlayerState::Playing);
    assert_eq!(status.current, Some(track("B")));

    // The new call still delivers its own events
    h.player.play(GUILD, CHANNEL, "C").await.unwrap();
    h.transport.finish_current(GUILD, PlayOutcome::Natural);
    assert_eq!(h.settled(GUILD).await.current, Some(track("C")));
    assert_eq!(h.transport.live(), 1);
}

#[tokio::test]
async fn test_stop_is_served_while_next_track_resolves() {
    let h = Harness::new();
    h.player.play(GUILD, CHANNEL, "A").await.unwrap();
    h.player.play(GUILD, CHANNEL, "slow B").await.unwrap();

    h.transport.finish_current(GUILD, PlayOutcome::Natural);
    assert!(eventually(|| h.resolver.calls.lock().len() == 2).await);

    let status = h.player.status(GUILD).await;
    assert_eq!(status.loading, Some("slow B".to_string()));
    assert_eq!(status.current, None);

    assert_eq!(h.player.stop(GUILD).await.unwrap(), CommandOutcome::Stopped);
    assert_eq!(h.transport.live(), 0);

    // La resolución termina después del stop y se descarta
    h.resolver.release_slow();
    tokio::task::yield_now().await;
    assert_eq!(h.transport.plays_for(GUILD).len(), 1);
    assert_eq!(h.player.status(GUILD).await.state, PlayerState::Disconnected);
}

#[tokio::test]
async fn test_commands_are_served_while_next_track_resolves() {
    let h = Harness::new();
    h.player.play(GUILD, CHANNEL, "A").await.unwrap();
    h.player.play(GUILD, CHANNEL, "slow B").await.unwrap();
    h.transport.finish_current(GUILD, PlayOutcome::Natural);
    assert!(eventually(|| h.resolver.calls.lock().len() == 2).await);

    assert_eq!(
        h.player.play(GUILD, CHANNEL, "C").await.unwrap(),
        CommandOutcome::Queued { position: 1 }
    );
    assert_eq!(h.player.set_volume(GUILD, 60).await.unwrap(), CommandOutcome::VolumeSet(60));
    assert_eq!(
        h.player.skip(GUILD).await,
        Err(PlaybackError::invalid_state("skip", PlayerState::Idle))
    );

    h.resolver.release_slow();
    let status = h.settled(GUILD).await;
    assert_eq!(status.state, PlayerState::Playing);
    assert_eq!(status.current, Some(track("slow B")));
    assert_eq!(status.queue, vec!["C".to_string()]);
    assert_eq!(h.transport.last_play(GUILD).unwrap().volume, 60);
}

#[tokio::test]
async fn test_guilds_are_independent() {
    let h = Harness::new();
    h.player.play(GUILD, CHANNEL, "A").await.unwrap();
    h.player.play(OTHER_GUILD, CHANNEL, "X").await.unwrap();

    h.player.stop(GUILD).await.unwrap();

    assert_eq!(h.player.status(GUILD).await.state, PlayerState::Disconnected);
    assert_eq!(h.player.status(OTHER_GUILD).await.current, Some(track("X")));
    assert_eq!(h.transport.live(), 1);
}

// ===== Queue =====

#[tokio::test]
async fn test_queue_keeps_submission_order() {
    let h = Harness::new();
    h.player.play(GUILD, CHANNEL, "first").await.unwrap();
    for name in ["1", "2", "3", "4"] {
        h.player.play(GUILD, CHANNEL, name).await.unwrap();
    }

    let mut played = Vec::new();
    for _ in 0..4 {
        h.transport.finish_current(GUILD, PlayOutcome::Natural);
        played.push(h.settled(GUILD).await.current.unwrap().title);
    }
    assert_eq!(played, vec!["1", "2", "3", "4"]);
}

#[tokio::test]
async fn test_shuffle_permutes_pending_entries() {
    let h = Harness::new();
    h.player.play(GUILD, CHANNEL, "now").await.unwrap();
    let queued: Vec<String> = (0..30).map(|i| i.to_string()).collect();
    for name in &queued {
        h.player.play(GUILD, CHANNEL, name.as_str()).await.unwrap();
    }

    assert_eq!(h.player.shuffle(GUILD).await.unwrap(), CommandOutcome::Shuffled { count: 30 });

    let status = h.player.status(GUILD).await;
    assert_eq!(status.current, Some(track("now")));
    let mut shuffled = status.queue.clone();
    shuffled.sort();
    let mut expected = queued.clone();
    expected.sort();
    assert_eq!(shuffled, expected);
}

#[tokio::test]
async fn test_clear_queue_keeps_current_track() {
    let h = Harness::new();
    h.player.play(GUILD, CHANNEL, "A").await.unwrap();
    h.player.play(GUILD, CHANNEL, "B").await.unwrap();
    h.player.play(GUILD, CHANNEL, "C").await.unwrap();

    assert_eq!(h.player.clear_queue(GUILD).await.unwrap(), CommandOutcome::Cleared { removed: 2 });

    let status = h.player.status(GUILD).await;
    assert_eq!(status.state, PlayerState::Playing);
    assert_eq!(status.current, Some(track("A")));
    assert!(status.queue.is_empty());
}

#[tokio::test]
async fn test_stale_finish_after_skip_is_ignored() {
    let h = Harness::new();
    h.player.play(GUILD, CHANNEL, "A").await.unwrap();
    h.player.play(GUILD, CHANNEL, "B").await.unwrap();
    h.player.play(GUILD, CHANNEL, "C").await.unwrap();
    let token_a = h.transport.last_play(GUILD).unwrap().token;

    h.player.skip(GUILD).await.unwrap();
    // El fin del track A llega tarde
    h.transport.finish(GUILD, token_a, PlayOutcome::Natural);

    let status = h.player.status(GUILD).await;
    assert_eq!(status.current, Some(track("B")));
    assert_eq!(status.queue, vec!["C".to_string()]);
}

// ===== Loop modes =====

#[tokio::test]
async fn test_loop_song_replays_on_natural_finish_only() {
    let h = Harness::new();
    h.player.play(GUILD, CHANNEL, "A").await.unwrap();
    h.player.play(GUILD, CHANNEL, "B").await.unwrap();
    h.player.set_loop_mode(GUILD, LoopMode::Song).await.unwrap();

    h.transport.finish_current(GUILD, PlayOutcome::Natural);
    assert_eq!(h.player.status(GUILD).await.current, Some(track("A")));
    assert_eq!(h.transport.plays_for(GUILD).len(), 2);

    h.player.skip(GUILD).await.unwrap();
    assert_eq!(h.player.status(GUILD).await.current, Some(track("B")));
}

#[tokio::test]
async fn test_loop_queue_rewinds_history() {
    let h = Harness::new();
    h.player.play(GUILD, CHANNEL, "A").await.unwrap();
    h.player.play(GUILD, CHANNEL, "B").await.unwrap();
    h.player.set_loop_mode(GUILD, LoopMode::Queue).await.unwrap();

    h.transport.finish_current(GUILD, PlayOutcome::Natural);
    assert_eq!(h.settled(GUILD).await.current, Some(track("B")));

    h.transport.finish_current(GUILD, PlayOutcome::Natural);
    let status = h.settled(GUILD).await;
    assert_eq!(status.current, Some(track("A")));
    assert_eq!(status.queue, vec!["B".to_string()]);
}

#[tokio::test]
async fn test_skip_with_loop_queue_wraps_to_history() {
    let h = Harness::new();
    h.player.play(GUILD, CHANNEL, "A").await.unwrap();
    h.player.play(GUILD, CHANNEL, "B").await.unwrap();
    h.player.set_loop_mode(GUILD, LoopMode::Queue).await.unwrap();

    h.player.skip(GUILD).await.unwrap();
    assert_eq!(h.player.status(GUILD).await.queue, Vec::<String>::new());

    // Cola vacía: el salto vuelve al principio del historial
    assert_eq!(
        h.player.skip(GUILD).await.unwrap(),
        CommandOutcome::Skipped { next: Some(track("A")) }
    );
    let status = h.player.status(GUILD).await;
    assert_eq!(status.state, PlayerState::Playing);
    assert_eq!(status.current, Some(track("A")));
    assert_eq!(status.queue, vec!["B".to_string()]);
}

// ===== Settings =====

#[tokio::test]
async fn test_stored_settings_apply_to_new_sessions() {
    let stored = GuildSettings {
        volume: 40,
        loop_mode: LoopMode::Queue,
        filter: AudioFilter::BassBoost,
        ..GuildSettings::default()
    };
    let h = Harness::build(
        FakeTransport::default(),
        MemorySettings::with(GUILD, stored),
        PlayerConfig::default(),
    );

    h.player.play(GUILD, CHANNEL, "A").await.unwrap();

    let request = h.transport.last_play(GUILD).unwrap();
    assert_eq!(request.volume, 40);
    assert_eq!(request.filter, AudioFilter::BassBoost);
    assert_eq!(h.player.status(GUILD).await.loop_mode, LoopMode::Queue);
}

#[tokio::test]
async fn test_volume_applies_live_and_persists() {
    let h = Harness::new();
    h.player.play(GUILD, CHANNEL, "A").await.unwrap();

    assert_eq!(h.player.set_volume(GUILD, 70).await.unwrap(), CommandOutcome::VolumeSet(70));
    assert_eq!(h.transport.state.lock().volumes, vec![70]);
    assert!(eventually(|| h.settings.snapshot(GUILD).volume == 70).await);
}

#[tokio::test]
async fn test_filter_applies_from_next_track() {
    let h = Harness::new();
    h.player.play(GUILD, CHANNEL, "A").await.unwrap();
    h.player.play(GUILD, CHANNEL, "B").await.unwrap();

    h.player.set_filter(GUILD, AudioFilter::Nightcore).await.unwrap();
    assert_eq!(h.transport.last_play(GUILD).unwrap().filter, AudioFilter::None);

    h.transport.finish_current(GUILD, PlayOutcome::Natural);
    h.settled(GUILD).await;
    assert_eq!(h.transport.last_play(GUILD).unwrap().filter, AudioFilter::Nightcore);
    assert!(eventually(|| h.settings.snapshot(GUILD).filter == AudioFilter::Nightcore).await);
}

#[tokio::test]
async fn test_broken_settings_store_never_blocks_playback() {
    let transport = FakeTransport::default();
    let player = music_maniac::audio::MusicPlayer::new(
        Arc::new(FakeResolver::default()),
        Arc::new(transport.clone()),
        Arc::new(broken_settings()),
        PlayerConfig::default(),
    );

    assert_eq!(
        player.play(GUILD, CHANNEL, "A").await.unwrap(),
        CommandOutcome::Started(track("A"))
    );
    assert_eq!(player.set_volume(GUILD, 30).await.unwrap(), CommandOutcome::VolumeSet(30));
    assert_eq!(
        player.set_loop_mode(GUILD, LoopMode::Song).await.unwrap(),
        CommandOutcome::LoopModeSet(LoopMode::Song)
    );
    assert_eq!(transport.last_play(GUILD).unwrap().volume, 100);
}

// ===== Idle timeouts =====

#[tokio::test(start_paused = true)]
async fn test_empty_channel_disconnects_after_timeout() {
    let h = Harness::new();
    h.player.play(GUILD, CHANNEL, "A").await.unwrap();
    h.transport.set_self_only(true);

    tokio::time::sleep(Duration::from_secs(50)).await;
    assert_eq!(h.player.status(GUILD).await.state, PlayerState::Playing);

    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(h.player.status(GUILD).await.state, PlayerState::Disconnected);
    assert_eq!(h.transport.live(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_someone_rejoining_keeps_the_bot() {
    let h = Harness::new();
    h.player.play(GUILD, CHANNEL, "A").await.unwrap();
    h.transport.set_self_only(true);

    tokio::time::sleep(Duration::from_secs(40)).await;
    h.transport.set_self_only(false);
    tokio::time::sleep(Duration::from_secs(40)).await;
    h.transport.set_self_only(true);
    tokio::time::sleep(Duration::from_secs(40)).await;

    assert_eq!(h.player.status(GUILD).await.state, PlayerState::Playing);
}

#[tokio::test(start_paused = true)]
async fn test_no_command_timeout_disconnects_idle_session() {
    let h = Harness::new();
    h.player.play(GUILD, CHANNEL, "A").await.unwrap();
    h.transport.finish_current(GUILD, PlayOutcome::Natural);
    assert_eq!(h.player.status(GUILD).await.state, PlayerState::Idle);

    tokio::time::sleep(Duration::from_secs(290)).await;
    assert_eq!(h.player.status(GUILD).await.state, PlayerState::Idle);

    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(h.player.status(GUILD).await.state, PlayerState::Disconnected);
    assert_eq!(h.transport.live(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_commands_reset_the_no_command_timer() {
    let h = Harness::new();
    h.player.play(GUILD, CHANNEL, "A").await.unwrap();
    h.transport.finish_current(GUILD, PlayOutcome::Natural);

    tokio::time::sleep(Duration::from_secs(200)).await;
    h.player.set_volume(GUILD, 80).await.unwrap();

    tokio::time::sleep(Duration::from_secs(200)).await;
    assert_eq!(h.player.status(GUILD).await.state, PlayerState::Idle);

    tokio::time::sleep(Duration::from_secs(110)).await;
    assert_eq!(h.player.status(GUILD).await.state, PlayerState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_playing_session_survives_no_command_timeout() {
    let h = Harness::new();
    h.player.play(GUILD, CHANNEL, "A").await.unwrap();

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(h.player.status(GUILD).await.state, PlayerState::Playing);
}

#[tokio::test(start_paused = true)]
async fn test_idle_ticks_after_stop_change_nothing() {
    let h = Harness::new();
    h.player.play(GUILD, CHANNEL, "A").await.unwrap();
    h.player.stop(GUILD).await.unwrap();

    tokio::time::sleep(Duration::from_secs(600)).await;
    let state = h.transport.state.lock();
    assert_eq!(state.disconnects, 1);
    assert_eq!(state.live, 0);
    drop(state);
    assert_eq!(h.player.active_sessions(), 0);
}

// ===== Shutdown =====

#[tokio::test]
async fn test_shutdown_stops_every_session() {
    let h = Harness::new();
    h.player.play(GUILD, CHANNEL, "A").await.unwrap();
    h.player.play(OTHER_GUILD, CHANNEL, "B").await.unwrap();

    h.player.shutdown().await;

    assert_eq!(h.player.active_sessions(), 0);
    assert_eq!(h.transport.live(), 0);
}
