use std::cell::RefCell;

use crate::tag::{Tag, TagSet};

thread_local! {
    /// The stack of frames of currently running tracked computations.
    static FRAMES: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

/// One entry on the tracking stack.
enum Frame {
    /// Collects the tags consumed by a tracked computation.
    Tracking(TagSet),
    /// Swallows consumptions while tracking is suspended.
    Paused,
}

/// Run a computation and record which tags it consumed.
///
/// Frames nest: when `f` itself runs a tracked computation, that inner
/// computation's consumed tags are also registered with the outer one once it
/// finishes. So an outer frame always ends up with every tag that was
/// transitively consumed beneath it.
///
/// ```
/// # use tagstore::{Tag, track};
/// let a = Tag::new();
/// let b = Tag::new();
/// let (sum, consumed) = track(|| {
///     a.consume();
///     b.consume();
///     1 + 2
/// });
/// assert_eq!(sum, 3);
/// assert!(consumed.contains(&a) && consumed.contains(&b));
/// ```
///
/// The frame is popped on every exit path. If `f` panics, whatever it
/// consumed so far is dropped instead of leaking into the outer frame.
pub fn track<T>(f: impl FnOnce() -> T) -> (T, TagSet) {
    let guard = FrameGuard::push(Frame::Tracking(TagSet::new()));
    let output = f();
    let consumed = guard.finish();
    (output, consumed)
}

/// Run a computation without recording the tags it consumes.
///
/// Tracked computations started inside `f` still see their own consumptions,
/// but those are not passed on beyond the suspended region.
pub fn untracked<T>(f: impl FnOnce() -> T) -> T {
    let guard = FrameGuard::push(Frame::Paused);
    let output = f();
    guard.finish();
    output
}

/// Whether a tracked computation is running on this thread and consumptions
/// are currently recorded.
pub fn is_tracking() -> bool {
    FRAMES.with(|frames| matches!(frames.borrow().last(), Some(Frame::Tracking(_))))
}

/// Register a tag with the innermost frame.
pub(crate) fn consume(tag: &Tag) {
    FRAMES.with(|frames| {
        if let Some(Frame::Tracking(set)) = frames.borrow_mut().last_mut() {
            set.insert(tag.clone());
        }
    })
}

/// Pops its frame when dropped.
struct FrameGuard {
    /// The stack height right after the push.
    depth: usize,
    /// Whether the frame was already popped by `finish`.
    finished: bool,
}

impl FrameGuard {
    /// Push a frame onto this thread's stack.
    fn push(frame: Frame) -> Self {
        let depth = FRAMES.with(|frames| {
            let mut frames = frames.borrow_mut();
            frames.push(frame);
            frames.len()
        });
        tracing::trace!(depth, "pushed tracking frame");
        Self { depth, finished: false }
    }

    /// Pop the frame and pass its consumptions on to the parent frame.
    fn finish(mut self) -> TagSet {
        self.finished = true;
        FRAMES.with(|frames| {
            let mut frames = frames.borrow_mut();
            debug_assert_eq!(frames.len(), self.depth, "unbalanced tracking frames");

            let consumed = match frames.pop() {
                Some(Frame::Tracking(set)) => set,
                _ => TagSet::new(),
            };

            if let Some(Frame::Tracking(parent)) = frames.last_mut() {
                for tag in &consumed {
                    parent.insert(tag.clone());
                }
            }

            tracing::trace!(depth = self.depth, consumed = consumed.len(), "popped tracking frame");
            consumed
        })
    }
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        if self.finished {
            return;
        }

        // Only reached while unwinding out of the tracked computation.
        let depth = self.depth;
        let _ = FRAMES.try_with(|frames| {
            if let Ok(mut frames) = frames.try_borrow_mut() {
                frames.truncate(depth - 1);
            }
        });
        tracing::trace!(depth, "discarded tracking frame");
    }
}
