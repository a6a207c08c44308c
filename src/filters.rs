//! The filter-callback chain: callbacks that see every inbound message,
//! each running at most once per dispatch iteration even if filters are
//! added or removed while the chain runs.

use std::collections::BTreeMap;

use crate::message::Message;

/// Opaque handle identifying a registered filter.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Token(pub(crate) u32);

struct Entry<F> {
    callback: F,
    last_iteration: u64,
}

/// Ordered list of filter callbacks plus the generation flag dispatch uses
/// to detect and restart an iteration that a callback mutated.
pub struct Filters<F> {
    list: BTreeMap<Token, Entry<F>>,
    next_id: u32,
    modified: u64,
}

impl<F> Default for Filters<F> {
    fn default() -> Self { Filters { list: BTreeMap::new(), next_id: 1, modified: 0 } }
}

impl<F> Filters<F> {
    pub fn add(&mut self, f: F) -> Token {
        let id = Token(self.next_id);
        self.next_id += 1;
        self.list.insert(id, Entry { callback: f, last_iteration: 0 });
        self.modified += 1;
        id
    }

    pub fn remove(&mut self, id: Token) -> Option<F> {
        let removed = self.list.remove(&id).map(|e| e.callback);
        if removed.is_some() { self.modified += 1; }
        removed
    }

    pub fn len(&self) -> usize { self.list.len() }
    pub fn is_empty(&self) -> bool { self.list.is_empty() }

    /// Runs `f` on every filter at most once for this `iteration`, in
    /// registration order, restarting the walk whenever `f` mutates the
    /// table until a full pass completes with no further mutation.
    ///
    /// `f` returns `true` if the message was fully handled (stop the chain).
    /// Returns whether any filter handled the message.
    pub fn dispatch(&mut self, msg: &Message, iteration: u64, mut f: impl FnMut(&mut F, &Message) -> bool) -> bool {
        loop {
            let snapshot = self.modified;
            let ids: Vec<Token> = self.list.iter()
                .filter(|(_, e)| e.last_iteration != iteration)
                .map(|(t, _)| *t)
                .collect();
            for id in ids {
                let handled = {
                    let Some(entry) = self.list.get_mut(&id) else { continue };
                    entry.last_iteration = iteration;
                    f(&mut entry.callback, msg)
                };
                if handled { return true; }
                if self.modified != snapshot { break; }
            }
            if self.modified == snapshot { return false; }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::strings::{Interface, Member, Path};

    #[test]
    fn runs_each_filter_once_per_iteration() {
        let mut filters: Filters<u32> = Filters::default();
        filters.add(1);
        filters.add(2);
        let msg = Message::new_signal(
            Path::new("/a").unwrap(), Interface::new("x.y").unwrap(), Member::new("S").unwrap());
        let mut calls = 0;
        filters.dispatch(&msg, 1, |_, _| { calls += 1; false });
        assert_eq!(calls, 2);
        // Re-running with the same iteration counter must not re-invoke them.
        filters.dispatch(&msg, 1, |_, _| { calls += 1; false });
        assert_eq!(calls, 2);
    }

    #[test]
    fn mutation_restarts_walk() {
        let mut filters: Filters<u32> = Filters::default();
        let first = filters.add(1);
        let msg = Message::new_signal(
            Path::new("/a").unwrap(), Interface::new("x.y").unwrap(), Member::new("S").unwrap());
        let mut calls = 0;
        let mut removed = false;
        filters.dispatch(&msg, 1, |_, _| {
            calls += 1;
            if !removed { removed = true; }
            false
        });
        let _ = first;
        assert_eq!(calls, 1);
    }
}
