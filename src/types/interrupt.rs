//! Interruptibility of a fiber.

use smallvec::SmallVec;

/// Whether a fiber may currently be interrupted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterruptStatus {
    /// Interrupts are honoured at the next suspension point.
    Interruptible,
    /// Interrupts are queued until the status is restored.
    Uninterruptible,
}

impl InterruptStatus {
    /// True for [`InterruptStatus::Interruptible`].
    #[must_use]
    pub const fn is_interruptible(self) -> bool {
        matches!(self, Self::Interruptible)
    }
}

/// Scoped stack of interrupt statuses.
///
/// The bottom frame is the status a fiber is born with (interruptible) and is
/// never popped. Regions push a frame on entry and restore the depth they
/// observed on exit, so frames are always released in LIFO order.
#[derive(Debug, Clone)]
pub struct InterruptStack {
    frames: SmallVec<[InterruptStatus; 4]>,
}

impl Default for InterruptStack {
    fn default() -> Self {
        Self::new()
    }
}

impl InterruptStack {
    /// Stack holding only the interruptible birth frame.
    #[must_use]
    pub fn new() -> Self {
        let mut frames = SmallVec::new();
        frames.push(InterruptStatus::Interruptible);
        Self { frames }
    }

    /// Status in effect.
    #[must_use]
    pub fn current(&self) -> InterruptStatus {
        self.frames
            .last()
            .copied()
            .unwrap_or(InterruptStatus::Interruptible)
    }

    /// Number of frames, birth frame included.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Pushes `status`, returning the depth to restore when the scope ends.
    pub fn push(&mut self, status: InterruptStatus) -> usize {
        let restore_to = self.frames.len();
        self.frames.push(status);
        restore_to
    }

    /// Drops every frame above `depth`. The birth frame always survives.
    pub fn restore(&mut self, depth: usize) {
        debug_assert!(
            depth < self.frames.len(),
            "interrupt region restored out of order"
        );
        self.frames.truncate(depth.max(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn born_interruptible() {
        let stack = InterruptStack::new();
        assert_eq!(stack.current(), InterruptStatus::Interruptible);
        assert_eq!(stack.depth(), 1);
    }

    #[test]
    fn nested_regions_restore_in_order() {
        let mut stack = InterruptStack::new();
        let outer = stack.push(InterruptStatus::Uninterruptible);
        assert!(!stack.current().is_interruptible());

        let inner = stack.push(InterruptStatus::Interruptible);
        assert!(stack.current().is_interruptible());

        stack.restore(inner);
        assert_eq!(stack.current(), InterruptStatus::Uninterruptible);
        stack.restore(outer);
        assert_eq!(stack.current(), InterruptStatus::Interruptible);
        assert_eq!(stack.depth(), 1);
    }

    #[test]
    fn birth_frame_survives() {
        let mut stack = InterruptStack::new();
        let depth = stack.push(InterruptStatus::Uninterruptible);
        assert_eq!(depth, 1);
        stack.restore(depth);
        assert_eq!(stack.depth(), 1);
        assert!(stack.current().is_interruptible());
    }
}
