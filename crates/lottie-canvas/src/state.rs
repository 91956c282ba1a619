use tracing::error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StateKind {
    Clip,
    Opacity,
    Mask,
    Matte,
    MatteSource,
}

/// Bookkeeping for a canvas's push/pop nesting.
///
/// Pops must match the most recent push. A mismatch is a bug in the caller:
/// debug builds panic, release builds log it and leave the stack untouched so
/// the backend can skip the pop.
#[derive(Debug, Default)]
pub struct StateStack {
    entries: Vec<StateKind>,
}

impl StateStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, kind: StateKind) {
        self.entries.push(kind);
    }

    /// Returns `true` when the pop matched and the backend should unwind.
    #[must_use]
    pub fn pop(&mut self, kind: StateKind) -> bool {
        let top = self.entries.last().copied();
        if top == Some(kind) {
            self.entries.pop();
            return true;
        }
        debug_assert!(false, "unbalanced canvas pop: expected {:?}, top is {:?}", kind, top);
        error!(expected = ?kind, top = ?top, "unbalanced canvas pop ignored");
        false
    }

    pub fn depth(&self) -> usize {
        self.entries.len()
    }

    pub fn is_balanced(&self) -> bool {
        self.entries.is_empty()
    }

    /// Called from `flush`; anything still pushed is a contract violation.
    pub fn check_balanced(&self) {
        debug_assert!(
            self.entries.is_empty(),
            "canvas flushed with {} open states: {:?}",
            self.entries.len(),
            self.entries
        );
        if !self.entries.is_empty() {
            error!(open = ?self.entries, "canvas flushed with unbalanced state stack");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_push_pop() {
        let mut stack = StateStack::new();
        stack.push(StateKind::Clip);
        stack.push(StateKind::Opacity);
        assert_eq!(stack.depth(), 2);
        assert!(stack.pop(StateKind::Opacity));
        assert!(stack.pop(StateKind::Clip));
        assert!(stack.is_balanced());
        stack.check_balanced();
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "unbalanced canvas pop")]
    fn test_mismatched_pop_panics_in_debug() {
        let mut stack = StateStack::new();
        stack.push(StateKind::Clip);
        let _ = stack.pop(StateKind::Mask);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "open states")]
    fn test_flush_with_open_state_panics_in_debug() {
        let mut stack = StateStack::new();
        stack.push(StateKind::Opacity);
        stack.check_balanced();
    }
}
