//! Match rules and the server-synchronized match-callback table.
//!
//! `MatchRule` matching itself stays close to the D-Bus broker's own match
//! grammar; a full parser for the textual match-expression syntax
//! (`bus_match_parse`) is an external collaborator and out of scope here —
//! rules are constructed programmatically.

use std::collections::BTreeMap;

use crate::message::{Message, MessageType};
use crate::strings::{BusName, Interface, Member, Path};

/// A "match rule" that can match messages on their headers.
///
/// A field set to `None` means no filter for that header; `Some(_)` must
/// match exactly.
#[derive(Clone, Debug, Default)]
pub struct MatchRule<'a> {
    pub msg_type: Option<MessageType>,
    pub sender: Option<BusName<'a>>,
    pub strict_sender: bool,
    pub path: Option<Path<'a>>,
    pub path_is_namespace: bool,
    pub interface: Option<Interface<'a>>,
    pub member: Option<Member<'a>>,
}

fn msg_type_str(m: MessageType) -> &'static str {
    match m {
        MessageType::Signal => "signal",
        MessageType::MethodCall => "method_call",
        MessageType::MethodReturn => "method_return",
        MessageType::Error => "error",
    }
}

impl<'a> MatchRule<'a> {
    pub fn new() -> Self { Default::default() }

    pub fn new_signal(intf: impl Into<Interface<'a>>, name: impl Into<Member<'a>>) -> Self {
        let mut m = Self::new();
        m.msg_type = Some(MessageType::Signal);
        m.interface = Some(intf.into());
        m.member = Some(name.into());
        m
    }

    /// Renders the textual form expected by `org.freedesktop.DBus.AddMatch`.
    pub fn match_str(&self) -> String {
        let mut v = Vec::new();
        if let Some(x) = self.msg_type { v.push(("type".to_string(), msg_type_str(x).to_string())); }
        if let Some(ref x) = self.sender { v.push(("sender".to_string(), x.to_string())); }
        let pn = if self.path_is_namespace { "path_namespace" } else { "path" };
        if let Some(ref x) = self.path { v.push((pn.to_string(), x.to_string())); }
        if let Some(ref x) = self.interface { v.push(("interface".to_string(), x.to_string())); }
        if let Some(ref x) = self.member { v.push(("member".to_string(), x.to_string())); }
        v.into_iter().map(|(k, v)| format!("{}='{}'", k, v)).collect::<Vec<_>>().join(",")
    }

    fn path_match(&self, msg: &Message) -> bool {
        match (&self.path, msg.path()) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(x), Some(p)) => {
                if x.as_str() == p.as_str() { true }
                else if self.path_is_namespace {
                    p.as_str().starts_with(x.as_str())
                        && p.as_str().as_bytes().get(x.as_str().len()) == Some(&b'/')
                } else { false }
            }
        }
    }

    /// Whether `msg` satisfies every constraint set on this rule.
    pub fn matches(&self, msg: &Message) -> bool {
        if let Some(x) = self.msg_type { if x != msg.msg_type() { return false; } }
        if let Some(ref x) = self.sender {
            match msg.sender() {
                Some(s) => {
                    let check = self.strict_sender || (s.is_unique() == x.is_unique());
                    if check && s.as_str() != x.as_str() { return false; }
                }
                None => if self.strict_sender { return false; },
            }
        }
        if !self.path_match(msg) { return false; }
        if let Some(ref x) = self.interface {
            if msg.interface().map(|i| i.as_str()) != Some(x.as_str()) { return false; }
        }
        if let Some(ref x) = self.member {
            if msg.member().map(|m| m.as_str()) != Some(x.as_str()) { return false; }
        }
        true
    }

    pub fn static_clone(&self) -> MatchRule<'static> {
        MatchRule {
            msg_type: self.msg_type,
            sender: self.sender.as_ref().map(|x| x.clone().into_static()),
            strict_sender: self.strict_sender,
            path: self.path.as_ref().map(|x| x.clone().into_static()),
            path_is_namespace: self.path_is_namespace,
            interface: self.interface.as_ref().map(|x| x.clone().into_static()),
            member: self.member.as_ref().map(|x| x.clone().into_static()),
        }
    }
}

/// Opaque handle identifying a registered match callback.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct MatchToken(pub(crate) u32);

struct MatchEntry<F> {
    rule: MatchRule<'static>,
    callback: F,
    /// Set once the server has confirmed registration (`bus_client` connections only).
    match_cookie: Option<u64>,
}

/// The connection's match-callback table: one entry per `add_match` call,
/// plus the generation flag the dispatcher uses to safely restart its
/// walk if a callback mutates the table mid-iteration.
pub struct MatchCallbacks<F> {
    entries: BTreeMap<MatchToken, MatchEntry<F>>,
    next_token: u32,
    next_cookie: u64,
    /// Bumped by any insert/remove; dispatch compares against a snapshot to
    /// detect whether it must restart its walk.
    pub modified: u64,
}

impl<F> Default for MatchCallbacks<F> {
    fn default() -> Self {
        MatchCallbacks { entries: BTreeMap::new(), next_token: 1, next_cookie: 1, modified: 0 }
    }
}

impl<F> MatchCallbacks<F> {
    pub fn add(&mut self, rule: MatchRule<'static>, callback: F) -> (MatchToken, u64) {
        let token = MatchToken(self.next_token);
        self.next_token += 1;
        let cookie = self.next_cookie;
        self.next_cookie += 1;
        self.entries.insert(token, MatchEntry { rule, callback, match_cookie: Some(cookie) });
        self.modified += 1;
        (token, cookie)
    }

    /// Removes an entry regardless of whether the server ever confirmed it
    /// — used to roll back on `AddMatch` failure.
    pub fn remove(&mut self, token: MatchToken) -> Option<F> {
        let removed = self.entries.remove(&token).map(|e| e.callback);
        if removed.is_some() { self.modified += 1; }
        removed
    }

    pub fn remove_by_cookie(&mut self, cookie: u64) -> Option<MatchToken> {
        let token = self.entries.iter().find(|(_, e)| e.match_cookie == Some(cookie)).map(|(t, _)| *t)?;
        self.entries.remove(&token);
        self.modified += 1;
        Some(token)
    }

    /// Runs `f` on every entry whose rule matches `msg`, restarting the walk
    /// from the beginning whenever `f` mutates the table (detected via
    /// `modified`), until a full pass completes with no mutation.
    pub fn dispatch(&mut self, msg: &Message, mut f: impl FnMut(&mut F, &Message)) {
        loop {
            let snapshot = self.modified;
            let tokens: Vec<MatchToken> = self.entries.iter()
                .filter(|(_, e)| e.rule.matches(msg))
                .map(|(t, _)| *t)
                .collect();
            for t in tokens {
                if let Some(entry) = self.entries.get_mut(&t) {
                    f(&mut entry.callback, msg);
                }
                if self.modified != snapshot { break; }
            }
            if self.modified == snapshot { break; }
        }
    }

    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::strings::{Interface as I, Member as M, Path as P};

    #[test]
    fn path_namespace_matches_children() {
        let mut rule = MatchRule::new();
        rule.path = Some(P::new("/a").unwrap());
        rule.path_is_namespace = true;
        let msg = Message::new_signal(P::new("/a/b").unwrap(), I::new("x.y").unwrap(), M::new("Sig").unwrap());
        assert!(rule.matches(&msg));
        let msg2 = Message::new_signal(P::new("/ab").unwrap(), I::new("x.y").unwrap(), M::new("Sig").unwrap());
        assert!(!rule.matches(&msg2));
    }

    #[test]
    fn dispatch_restarts_on_mutation() {
        let mut table: MatchCallbacks<u32> = MatchCallbacks::default();
        let rule = MatchRule::new_signal(I::new("x.y").unwrap(), M::new("Sig").unwrap());
        table.add(rule.static_clone(), 1);
        table.add(rule.static_clone(), 2);
        let msg = Message::new_signal(P::new("/a").unwrap(), I::new("x.y").unwrap(), M::new("Sig").unwrap());
        let mut seen = Vec::new();
        table.dispatch(&msg, |cb, _| { seen.push(*cb); });
        assert_eq!(seen.len(), 2);
    }
}
