use log::warn;
use tokio::sync::mpsc;

use super::PlayerError;

/// Delivers fullscreen-change notifications to a player.
#[derive(Debug, Clone)]
pub struct FullscreenListener(mpsc::UnboundedSender<bool>);

impl FullscreenListener {
    pub fn new(tx: mpsc::UnboundedSender<bool>) -> Self {
        Self(tx)
    }

    pub fn notify(&self, active: bool) {
        if self.0.send(active).is_err() {
            warn!("Fullscreen change notification dropped; player is gone");
        }
    }
}

/// Exclusive full-viewport presentation. Requests are only requests: whether the widget is
/// fullscreen is decided by the notifications the platform sends to its listener, which may
/// also fire on their own (e.g. the user pressing escape).
pub trait FullscreenPlatform: Send + 'static {
    fn subscribe(&mut self, listener: FullscreenListener);

    fn unsubscribe(&mut self);

    fn is_fullscreen(&self) -> bool;

    fn request_fullscreen(&mut self) -> Result<(), PlayerError>;

    fn exit_fullscreen(&mut self);
}

/// Platform for headless use; it grants every request unless constructed with
/// [`VirtualFullscreen::denied`].
#[derive(Debug)]
pub struct VirtualFullscreen {
    allowed: bool,
    active: bool,
    listener: Option<FullscreenListener>,
}

impl Default for VirtualFullscreen {
    fn default() -> Self {
        Self {
            allowed: true,
            active: false,
            listener: None,
        }
    }
}

impl VirtualFullscreen {
    pub fn denied() -> Self {
        Self {
            allowed: false,
            ..Self::default()
        }
    }

    fn set_active(&mut self, active: bool) {
        if self.active == active {
            return;
        }
        self.active = active;
        if let Some(listener) = &self.listener {
            listener.notify(active);
        }
    }
}

impl FullscreenPlatform for VirtualFullscreen {
    fn subscribe(&mut self, listener: FullscreenListener) {
        self.listener = Some(listener);
    }

    fn unsubscribe(&mut self) {
        self.listener = None;
    }

    fn is_fullscreen(&self) -> bool {
        self.active
    }

    fn request_fullscreen(&mut self) -> Result<(), PlayerError> {
        if !self.allowed {
            return Err(PlayerError::FullscreenRequestFailure(
                "fullscreen is not permitted".to_string(),
            ));
        }
        self.set_active(true);
        Ok(())
    }

    fn exit_fullscreen(&mut self) {
        self.set_active(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_notify_listener_on_change() {
        // given
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut platform = VirtualFullscreen::default();
        platform.subscribe(FullscreenListener::new(tx));

        // when
        platform.request_fullscreen().unwrap();
        platform.request_fullscreen().unwrap();
        platform.exit_fullscreen();

        // then
        assert_eq!(rx.try_recv(), Ok(true));
        assert_eq!(rx.try_recv(), Ok(false));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn should_deny_when_not_permitted() {
        let mut platform = VirtualFullscreen::denied();
        assert!(matches!(
            platform.request_fullscreen(),
            Err(PlayerError::FullscreenRequestFailure(_))
        ));
        assert!(!platform.is_fullscreen());
    }
}
