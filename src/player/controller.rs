use std::{future, sync::Arc, time::Duration};

use anyhow::{anyhow, Context};
use log::debug;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};

use super::{
    FullscreenListener, FullscreenPlatform, MediaBuffer, MediaFetcher, MediaSource,
    PlaybackState, Player, PlayerConfig, PlayerError, PlayerId, PlayerPhase, Transport,
    TransportEvent,
};

#[derive(Debug, Clone, PartialEq)]
pub enum PlayerCommand {
    Initialize(MediaSource),
    TogglePlayback,
    SeekRelative(f64),
    SeekToFraction(f64),
    SetVolume(f64),
    ToggleMute,
    BeginScrub,
    EndScrub,
    ToggleFullscreen,
    PointerActivity,
    PointerEntered,
    PointerLeft,
    Transport(TransportEvent),
    Close,
}

/// Snapshot of a player published after every handled event.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerView {
    pub id: PlayerId,
    pub phase: PlayerPhase,
    pub source: Option<MediaSource>,
    pub state: PlaybackState,
    pub controls_available: bool,
    pub elapsed: String,
    pub duration: String,
}

impl PlayerView {
    fn of<T: Transport>(player: &Player<T>) -> Self {
        let state = *player.state();
        Self {
            id: player.id(),
            phase: player.phase().clone(),
            source: player.source().cloned(),
            controls_available: player.controls_available(),
            elapsed: state.elapsed_label(),
            duration: state.duration_label(),
            state,
        }
    }
}

#[derive(Debug)]
struct LoadOutcome {
    generation: u64,
    result: Result<MediaBuffer, PlayerError>,
}

/// Runs a [`Player`] on its own task. Everything that touches the player (commands, transport
/// feedback, fullscreen notifications, load completion, the controls timer) is handled in one
/// loop, so the player never sees concurrent access.
pub struct PlayerController<T: Transport, P: FullscreenPlatform> {
    running: bool,
    player: Player<T>,
    platform: P,
    fetcher: Arc<dyn MediaFetcher>,
    load_task: Option<JoinHandle<()>>,
    progress_interval: Duration,
    command_rx: mpsc::Receiver<PlayerCommand>,
    load_tx: mpsc::UnboundedSender<LoadOutcome>,
    load_rx: mpsc::UnboundedReceiver<LoadOutcome>,
    fullscreen_rx: mpsc::UnboundedReceiver<bool>,
    view_tx: watch::Sender<PlayerView>,
}

impl<T, P> PlayerController<T, P>
where
    T: Transport + Send + 'static,
    P: FullscreenPlatform,
{
    pub fn spawn(
        transport: T,
        mut platform: P,
        fetcher: Arc<dyn MediaFetcher>,
        config: PlayerConfig,
    ) -> PlayerHandle {
        let (command_tx, command_rx) = mpsc::channel::<PlayerCommand>(32);
        let (load_tx, load_rx) = mpsc::unbounded_channel();
        let (fullscreen_tx, fullscreen_rx) = mpsc::unbounded_channel();
        platform.subscribe(FullscreenListener::new(fullscreen_tx));

        let progress_interval = config.progress_interval();
        let player = Player::new(transport, config);
        let id = player.id();
        let (view_tx, view_rx) = watch::channel(PlayerView::of(&player));

        let mut controller = Self {
            running: true,
            player,
            platform,
            fetcher,
            load_task: None,
            progress_interval,
            command_rx,
            load_tx,
            load_rx,
            fullscreen_rx,
            view_tx,
        };
        let join_handle = tokio::spawn(async move { controller.run().await });

        PlayerHandle {
            id,
            command_tx,
            view_rx,
            join_handle: Some(join_handle),
        }
    }

    fn start_load(&mut self, source: MediaSource) {
        self.cancel_load();
        let ticket = self.player.initialize(source);
        let fetcher = Arc::clone(&self.fetcher);
        let load_tx = self.load_tx.clone();
        self.load_task = Some(tokio::spawn(async move {
            let result = fetcher.fetch(ticket.source).await;
            let _ = load_tx.send(LoadOutcome {
                generation: ticket.generation,
                result,
            });
        }));
    }

    fn cancel_load(&mut self) {
        if let Some(load_task) = self.load_task.take() {
            load_task.abort();
        }
    }

    fn handle_cmd(&mut self, cmd: PlayerCommand) {
        let now = Instant::now();
        match cmd {
            PlayerCommand::Initialize(source) => self.start_load(source),
            PlayerCommand::TogglePlayback => {
                self.player.toggle_playback(now);
            }
            PlayerCommand::SeekRelative(delta) => self.player.seek_relative(delta),
            PlayerCommand::SeekToFraction(fraction) => self.player.seek_to_fraction(fraction),
            PlayerCommand::SetVolume(level) => self.player.set_volume(level),
            PlayerCommand::ToggleMute => self.player.toggle_mute(),
            PlayerCommand::BeginScrub => self.player.begin_scrub(),
            PlayerCommand::EndScrub => self.player.end_scrub(now),
            PlayerCommand::ToggleFullscreen => {
                // failures are already logged by the player
                let _ = self.player.toggle_fullscreen(&mut self.platform);
            }
            PlayerCommand::PointerActivity => self.player.pointer_activity(now),
            PlayerCommand::PointerEntered => self.player.pointer_entered(),
            PlayerCommand::PointerLeft => self.player.pointer_left(),
            PlayerCommand::Transport(event) => self.player.on_transport_event(event),
            PlayerCommand::Close => {
                debug!("Closing player {}", self.player.id());
                self.running = false;
            }
        }
    }

    fn handle_load(&mut self, outcome: LoadOutcome) {
        // A stale outcome must not forget the handle of the load that superseded it.
        if self.player.complete_load(outcome.generation, outcome.result) {
            self.load_task = None;
        }
    }

    async fn run(&mut self) {
        let mut progress = time::interval(self.progress_interval);
        progress.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while self.running {
            let controls_deadline = self.player.controls_deadline();
            tokio::select! {
                cmd = self.command_rx.recv() => {
                    if let Some(cmd) = cmd {
                        self.handle_cmd(cmd)
                    } else {
                        debug!("All handles to player {} were dropped", self.player.id());
                        self.running = false;
                    }
                }
                Some(outcome) = self.load_rx.recv() => self.handle_load(outcome),
                Some(active) = self.fullscreen_rx.recv() => self.player.on_fullscreen_changed(active),
                _ = wait_until(controls_deadline) => self.player.poll_controls_timer(Instant::now()),
                _ = progress.tick() => self.player.poll_transport(Instant::now()),
            }
            self.view_tx.send_replace(PlayerView::of(&self.player));
        }
    }
}

impl<T: Transport, P: FullscreenPlatform> Drop for PlayerController<T, P> {
    fn drop(&mut self) {
        if let Some(load_task) = self.load_task.take() {
            load_task.abort();
        }
        self.platform.unsubscribe();
        self.player.release();
        self.view_tx.send_replace(PlayerView::of(&self.player));
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => future::pending().await,
    }
}

/// Owning handle of a running player. Closing or dropping it tears the player down: the
/// in-flight load is aborted, the media buffer released and the fullscreen listener removed.
#[derive(Debug)]
pub struct PlayerHandle {
    pub id: PlayerId,
    command_tx: mpsc::Sender<PlayerCommand>,
    view_rx: watch::Receiver<PlayerView>,
    join_handle: Option<JoinHandle<()>>,
}

impl PlayerHandle {
    pub async fn send(&self, cmd: PlayerCommand) -> anyhow::Result<()> {
        self.command_tx
            .send(cmd)
            .await
            .map_err(|_| anyhow!("Player {} is no longer running", self.id))
    }

    pub async fn initialize(&self, source: MediaSource) -> anyhow::Result<()> {
        self.send(PlayerCommand::Initialize(source)).await
    }

    pub fn view(&self) -> PlayerView {
        self.view_rx.borrow().clone()
    }

    /// Waits for the next published view.
    pub async fn changed(&mut self) -> anyhow::Result<PlayerView> {
        self.view_rx
            .changed()
            .await
            .context("Player task has stopped")?;
        Ok(self.view_rx.borrow_and_update().clone())
    }

    /// Waits until `predicate` holds for the published view.
    pub async fn wait_for(
        &mut self,
        predicate: impl Fn(&PlayerView) -> bool,
    ) -> anyhow::Result<PlayerView> {
        let view = self
            .view_rx
            .wait_for(|view| predicate(view))
            .await
            .context("Player task has stopped")?;
        Ok(view.clone())
    }

    pub async fn close(mut self) -> anyhow::Result<()> {
        let Some(join_handle) = self.join_handle.take() else {
            return Ok(());
        };
        if self.command_tx.send(PlayerCommand::Close).await.is_err() {
            debug!("Player {} had already stopped", self.id);
        }
        join_handle
            .await
            .context(format!("Failed to close player {}", self.id))?;
        Ok(())
    }
}

impl Drop for PlayerHandle {
    fn drop(&mut self) {
        if let Some(join_handle) = self.join_handle.take() {
            if !join_handle.is_finished() {
                debug!("Player {} dropped without being closed; aborting", self.id);
            }
            join_handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::{future::BoxFuture, FutureExt};
    use tokio::sync::oneshot;

    use crate::player::{
        transport::tests::mp4_with_duration, widget::tests::FakeTransport, ClockTransport,
        VirtualFullscreen,
    };

    use super::*;

    struct StaticFetcher(Result<Vec<u8>, PlayerError>);

    impl MediaFetcher for StaticFetcher {
        fn fetch(
            &self,
            source: MediaSource,
        ) -> BoxFuture<'static, Result<MediaBuffer, PlayerError>> {
            let result = self.0.clone().map(|data| MediaBuffer::new(source, data));
            async move { result }.boxed()
        }
    }

    /// Completes only once released. Each fetch registers a receiver that errors once the fetch
    /// future is dropped.
    #[derive(Clone, Default)]
    struct GatedFetcher {
        gates: Arc<std::sync::Mutex<Vec<Option<oneshot::Sender<()>>>>>,
        fetches: Arc<std::sync::Mutex<Vec<oneshot::Receiver<()>>>>,
    }

    impl GatedFetcher {
        async fn started(&self, count: usize) {
            while self.fetches.lock().unwrap().len() < count {
                tokio::task::yield_now().await;
            }
        }

        fn release(&self, index: usize) {
            if let Some(gate) = self.gates.lock().unwrap()[index].take() {
                let _ = gate.send(());
            }
        }

        fn take(&self, index: usize) -> oneshot::Receiver<()> {
            let mut fetches = self.fetches.lock().unwrap();
            let (_, placeholder) = oneshot::channel();
            std::mem::replace(&mut fetches[index], placeholder)
        }
    }

    impl MediaFetcher for GatedFetcher {
        fn fetch(
            &self,
            source: MediaSource,
        ) -> BoxFuture<'static, Result<MediaBuffer, PlayerError>> {
            let (gate, released) = oneshot::channel::<()>();
            let (guard, dropped) = oneshot::channel::<()>();
            self.gates.lock().unwrap().push(Some(gate));
            self.fetches.lock().unwrap().push(dropped);
            async move {
                let _guard = guard;
                if released.await.is_err() {
                    future::pending::<()>().await;
                }
                Ok(MediaBuffer::new(source, vec![1]))
            }
            .boxed()
        }
    }

    fn spawn_player(fetcher: impl MediaFetcher) -> PlayerHandle {
        PlayerController::spawn(
            FakeTransport::default(),
            VirtualFullscreen::default(),
            Arc::new(fetcher),
            PlayerConfig::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn should_load_and_play() {
        // given
        let mut handle = spawn_player(StaticFetcher(Ok(vec![1, 2, 3])));

        // when
        handle
            .initialize(MediaSource::new("https://storage/scene0000_00.mp4"))
            .await
            .unwrap();
        let view = handle.wait_for(|view| view.phase.is_ready()).await.unwrap();

        // then
        assert!(view.controls_available);
        assert!(!view.state.is_playing);

        // when
        handle.send(PlayerCommand::TogglePlayback).await.unwrap();
        handle
            .send(PlayerCommand::Transport(TransportEvent::Duration(60.0)))
            .await
            .unwrap();
        handle
            .send(PlayerCommand::Transport(TransportEvent::Progress {
                played: 0.5,
                played_seconds: 30.0,
            }))
            .await
            .unwrap();
        let view = handle
            .wait_for(|view| view.state.played_fraction == 0.5)
            .await
            .unwrap();

        // then
        assert!(view.state.is_playing);
        assert_eq!(view.elapsed, "0:30");
        assert_eq!(view.duration, "1:00");

        handle.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn should_report_failed_load() {
        // given
        let mut handle = spawn_player(StaticFetcher(Err(PlayerError::LoadFailure(
            "404 Not Found".to_string(),
        ))));

        // when
        handle
            .initialize(MediaSource::new("https://storage/missing.mp4"))
            .await
            .unwrap();
        let view = handle
            .wait_for(|view| matches!(view.phase, PlayerPhase::Failed(_)))
            .await
            .unwrap();

        // then
        assert!(!view.controls_available);

        // when
        handle.send(PlayerCommand::TogglePlayback).await.unwrap();
        handle.send(PlayerCommand::PointerActivity).await.unwrap();
        let view = handle.changed().await.unwrap();

        // then
        assert!(!view.state.is_playing);
        handle.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn should_hide_controls_after_inactivity() {
        // given
        let mut handle = spawn_player(StaticFetcher(Ok(vec![1])));
        handle
            .initialize(MediaSource::new("https://storage/scene0000_00.mp4"))
            .await
            .unwrap();
        handle.wait_for(|view| view.phase.is_ready()).await.unwrap();
        handle.send(PlayerCommand::TogglePlayback).await.unwrap();
        handle.send(PlayerCommand::PointerActivity).await.unwrap();
        handle.wait_for(|view| view.state.is_playing).await.unwrap();

        // when
        time::sleep(Duration::from_millis(2500)).await;

        // then
        assert!(handle.view().state.controls_visible);

        // when
        time::sleep(Duration::from_millis(600)).await;

        // then
        assert!(!handle.view().state.controls_visible);
        handle.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn should_abort_load_on_close() {
        // given
        let fetcher = GatedFetcher::default();
        let handle = spawn_player(fetcher.clone());
        handle
            .initialize(MediaSource::new("https://storage/huge.mp4"))
            .await
            .unwrap();
        fetcher.started(1).await;

        // when
        handle.close().await.unwrap();

        // then
        assert!(fetcher.take(0).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn should_abort_superseded_load() {
        // given
        let fetcher = GatedFetcher::default();
        let handle = spawn_player(fetcher.clone());
        handle
            .initialize(MediaSource::new("https://storage/first.mp4"))
            .await
            .unwrap();
        fetcher.started(1).await;

        // when
        handle
            .initialize(MediaSource::new("https://storage/second.mp4"))
            .await
            .unwrap();
        fetcher.started(2).await;

        // then
        assert!(fetcher.take(0).await.is_err());
        let mut second = fetcher.take(1);
        assert_eq!(second.try_recv(), Err(oneshot::error::TryRecvError::Empty));
        assert_eq!(handle.view().phase, PlayerPhase::Loading);
        assert_eq!(
            handle.view().source,
            Some(MediaSource::new("https://storage/second.mp4"))
        );

        // when
        handle.close().await.unwrap();

        // then
        assert!(second.await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn should_abort_current_load_after_stale_completion() {
        // the stale outcome and the next source race inside the player loop
        for _ in 0..20 {
            // given
            let fetcher = GatedFetcher::default();
            let handle = spawn_player(fetcher.clone());
            handle
                .initialize(MediaSource::new("https://storage/first.mp4"))
                .await
                .unwrap();
            fetcher.started(1).await;

            // when
            fetcher.release(0);
            handle
                .initialize(MediaSource::new("https://storage/second.mp4"))
                .await
                .unwrap();
            fetcher.started(2).await;
            handle.close().await.unwrap();

            // then
            let second = time::timeout(Duration::from_secs(5), fetcher.take(1)).await;
            assert!(matches!(second, Ok(Err(_))), "second fetch outlived close");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn should_hide_and_show_controls_on_pointer_leave_and_enter() {
        // given
        let mut handle = spawn_player(StaticFetcher(Ok(vec![1])));
        handle
            .initialize(MediaSource::new("https://storage/scene0000_00.mp4"))
            .await
            .unwrap();
        handle.wait_for(|view| view.phase.is_ready()).await.unwrap();
        handle.send(PlayerCommand::TogglePlayback).await.unwrap();
        handle.wait_for(|view| view.state.is_playing).await.unwrap();

        // when
        handle.send(PlayerCommand::PointerLeft).await.unwrap();
        let view = handle
            .wait_for(|view| !view.state.controls_visible)
            .await
            .unwrap();

        // then
        assert!(view.state.is_playing);

        // when
        handle.send(PlayerCommand::PointerEntered).await.unwrap();
        let view = handle
            .wait_for(|view| view.state.controls_visible)
            .await
            .unwrap();

        // then
        assert!(view.state.is_playing);
        handle.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn should_apply_fullscreen_notifications() {
        // given
        let mut handle = spawn_player(StaticFetcher(Ok(vec![1])));

        // when
        handle.send(PlayerCommand::ToggleFullscreen).await.unwrap();
        let view = handle.wait_for(|view| view.state.is_fullscreen).await.unwrap();

        // then
        assert!(view.state.is_fullscreen);

        // when
        handle.send(PlayerCommand::ToggleFullscreen).await.unwrap();
        let view = handle
            .wait_for(|view| !view.state.is_fullscreen)
            .await
            .unwrap();

        // then
        assert!(!view.state.is_fullscreen);
        handle.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn should_track_clock_transport_progress() {
        // given
        let mut handle = PlayerController::spawn(
            ClockTransport::new(),
            VirtualFullscreen::default(),
            Arc::new(StaticFetcher(Ok(mp4_with_duration(1000, 60_000)))),
            PlayerConfig::default(),
        );
        handle
            .initialize(MediaSource::new("https://storage/scene0000_00.mp4"))
            .await
            .unwrap();
        handle
            .wait_for(|view| view.state.duration_seconds == 60.0)
            .await
            .unwrap();

        // when
        handle.send(PlayerCommand::TogglePlayback).await.unwrap();
        let view = handle
            .wait_for(|view| view.state.current_time_seconds >= 5.0)
            .await
            .unwrap();

        // then
        assert!(view.state.is_playing);
        assert!(view.state.played_fraction > 0.0);
        handle.close().await.unwrap();
    }
}
