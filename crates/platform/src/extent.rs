//! Window size shared between the event loop and the render thread.
//!
//! The event loop publishes every resize and the close request into an
//! [`ExtentSignal`]. The render thread polls it for pending resizes and
//! parks on its condition variable while the window has no area.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use ash::vk;
use tracing::debug;

#[derive(Debug)]
struct SignalState {
    extent: vk::Extent2D,
    pending_resize: Option<vk::Extent2D>,
    closed: bool,
}

/// Latest window extent plus a pending-resize flag.
#[derive(Debug)]
pub struct ExtentSignal {
    state: Mutex<SignalState>,
    changed: Condvar,
}

impl ExtentSignal {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            state: Mutex::new(SignalState {
                extent: vk::Extent2D { width, height },
                pending_resize: None,
                closed: false,
            }),
            changed: Condvar::new(),
        }
    }

    // The guarded state is plain data and stays consistent across a panic.
    fn lock(&self) -> MutexGuard<'_, SignalState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish a new window size. Wakes any thread waiting for area.
    pub fn resize(&self, width: u32, height: u32) {
        let extent = vk::Extent2D { width, height };
        let mut state = self.lock();
        if state.extent == extent && state.pending_resize.is_none() {
            return;
        }
        state.extent = extent;
        state.pending_resize = Some(extent);
        drop(state);
        self.changed.notify_all();
    }

    /// Take the most recent unhandled resize, if any.
    pub fn take_resize(&self) -> Option<vk::Extent2D> {
        self.lock().pending_resize.take()
    }

    /// Mark the window as gone. Waiters return `None` from now on.
    pub fn close(&self) {
        self.lock().closed = true;
        self.changed.notify_all();
        debug!("Extent signal closed");
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn current(&self) -> vk::Extent2D {
        self.lock().extent
    }

    /// Block until the window has a non-zero extent or is closed.
    pub fn wait_presentable(&self) -> Option<vk::Extent2D> {
        let state = self
            .changed
            .wait_while(self.lock(), |state| {
                !state.closed && (state.extent.width == 0 || state.extent.height == 0)
            })
            .unwrap_or_else(PoisonError::into_inner);

        if state.closed {
            None
        } else {
            Some(state.extent)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_take_resize_once() {
        let signal = ExtentSignal::new(800, 600);
        assert_eq!(signal.take_resize(), None);

        signal.resize(1024, 768);
        signal.resize(1280, 720);
        assert_eq!(
            signal.take_resize(),
            Some(vk::Extent2D {
                width: 1280,
                height: 720
            })
        );
        assert_eq!(signal.take_resize(), None);
    }

    #[test]
    fn test_same_size_is_not_a_resize() {
        let signal = ExtentSignal::new(800, 600);
        signal.resize(800, 600);
        assert_eq!(signal.take_resize(), None);
    }

    #[test]
    fn test_wait_returns_immediately_with_area() {
        let signal = ExtentSignal::new(640, 480);
        assert_eq!(
            signal.wait_presentable(),
            Some(vk::Extent2D {
                width: 640,
                height: 480
            })
        );
    }

    #[test]
    fn test_wait_blocks_until_restored() {
        let signal = Arc::new(ExtentSignal::new(0, 0));
        let waiter = {
            let signal = signal.clone();
            thread::spawn(move || signal.wait_presentable())
        };

        thread::sleep(Duration::from_millis(20));
        assert!(!waiter.is_finished());

        signal.resize(0, 600);
        thread::sleep(Duration::from_millis(20));
        assert!(!waiter.is_finished());

        signal.resize(800, 600);
        assert_eq!(
            waiter.join().unwrap(),
            Some(vk::Extent2D {
                width: 800,
                height: 600
            })
        );
    }

    #[test]
    fn test_close_releases_waiter() {
        let signal = Arc::new(ExtentSignal::new(0, 0));
        let waiter = {
            let signal = signal.clone();
            thread::spawn(move || signal.wait_presentable())
        };

        signal.close();
        assert_eq!(waiter.join().unwrap(), None);
        assert!(signal.is_closed());
    }
}
