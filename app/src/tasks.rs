//! Work marshalled onto the UI thread.
//!
//! Anything that happens off the UI thread (today only the hotkey listener)
//! sends a [`UiTask`] instead of touching application state. The UI thread
//! drains the queue in FIFO order after being woken.

use crate::hotkey::Hotkey;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// A user-level action, whatever surface triggered it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiTask {
    ShowPanel,
    HidePanel,
    LoadVideo,
    TogglePlayback,
    ToggleAspect,
    SetAsDefault,
    Quit,
}

type Waker = Arc<dyn Fn() + Send + Sync>;

/// Sending half, cloneable and usable from any thread.
#[derive(Clone)]
pub struct TaskSender {
    tx: mpsc::UnboundedSender<UiTask>,
    waker: Option<Waker>,
}

impl TaskSender {
    /// Call `waker` after every enqueued task so the UI thread notices it.
    pub fn with_waker(mut self, waker: impl Fn() + Send + Sync + 'static) -> Self {
        self.waker = Some(Arc::new(waker));
        self
    }

    /// Enqueue a task. Returns `false` once the UI side has shut down.
    pub fn send(&self, task: UiTask) -> bool {
        if self.tx.send(task).is_err() {
            log::debug!("UI task queue closed, dropping {:?}", task);
            return false;
        }
        if let Some(waker) = &self.waker {
            waker();
        }
        true
    }
}

impl fmt::Debug for TaskSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskSender")
            .field("closed", &self.tx.is_closed())
            .field("has_waker", &self.waker.is_some())
            .finish()
    }
}

/// Receiving half, owned by the UI thread.
#[derive(Debug)]
pub struct TaskReceiver {
    rx: mpsc::UnboundedReceiver<UiTask>,
}

impl TaskReceiver {
    /// Next queued task, without blocking.
    pub fn try_next(&mut self) -> Option<UiTask> {
        self.rx.try_recv().ok()
    }

    /// Everything queued so far, oldest first.
    pub fn drain(&mut self) -> Vec<UiTask> {
        std::iter::from_fn(|| self.try_next()).collect()
    }
}

pub fn channel() -> (TaskSender, TaskReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (TaskSender { tx, waker: None }, TaskReceiver { rx })
}

/// Entry of the tray context menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuEntry {
    Item { label: String, task: UiTask },
    Separator,
}

/// Tray context menu, top to bottom.
pub fn tray_menu(hotkey: Hotkey) -> Vec<MenuEntry> {
    let item = |label: String, task| MenuEntry::Item { label, task };
    vec![
        item("Show Controls".to_string(), UiTask::ShowPanel),
        item("Load Video\u{2026}".to_string(), UiTask::LoadVideo),
        item("Play / Pause".to_string(), UiTask::TogglePlayback),
        item(format!("Toggle Aspect ({})", hotkey), UiTask::ToggleAspect),
        MenuEntry::Separator,
        item("Quit".to_string(), UiTask::Quit),
    ]
}
