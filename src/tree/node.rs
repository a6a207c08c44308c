//! The object tree: a path-keyed table of nodes, each carrying the set of
//! interface vtables registered there (directly, or as a fallback covering
//! its whole subtree) plus the application data those vtables close over.
//!
//! Grounded on `dbus-crossroads`'s `Crossroads` (`BTreeMap<Path, Object>`)
//! and its `path.rs`, generalized with the fallback/direct distinction and
//! reference-counted GC this crate's spec calls for, neither of which
//! crossroads itself needs since it has no fallback concept.

use std::collections::BTreeMap;

use crate::error::Error;
use crate::strings::{Interface, Path};
use crate::tree::vtable::Vtable;

/// One registered object. A node with no vtables and no children is
/// garbage — see [`Tree::gc`].
pub struct Node<D> {
    pub data: D,
    pub(crate) vtables: Vec<Vtable<D>>,
    /// Whether this path also implements `org.freedesktop.DBus.ObjectManager`,
    /// i.e. whether registering/removing a descendant should emit
    /// `InterfacesAdded`/`InterfacesRemoved` here.
    pub object_manager: bool,
}

impl<D> Node<D> {
    fn new(data: D) -> Self { Node { data, vtables: Vec::new(), object_manager: false } }

    pub fn vtable(&self, interface: &str) -> Option<&Vtable<D>> {
        self.vtables.iter().find(|v| v.interface.as_str() == interface)
    }

    pub fn vtable_mut(&mut self, interface: &str) -> Option<&mut Vtable<D>> {
        self.vtables.iter_mut().find(|v| v.interface.as_str() == interface)
    }

    pub fn interfaces(&self) -> impl Iterator<Item = &Interface<'static>> {
        self.vtables.iter().map(|v| &v.interface)
    }

    fn is_empty(&self) -> bool { self.vtables.is_empty() && !self.object_manager }
}

/// The full object tree for one connection, keyed by object path.
///
/// `D` is the application data type every node carries; handlers registered
/// through a [`Vtable`] close over `&D`/`&mut D` for the node they were
/// registered on.
#[derive(Default)]
pub struct Tree<D> {
    nodes: BTreeMap<Path<'static>, Node<D>>,
}

impl<D> Tree<D> {
    pub fn new() -> Self { Tree { nodes: BTreeMap::new() } }

    pub fn get(&self, path: &Path<'static>) -> Option<&Node<D>> { self.nodes.get(path) }
    pub fn get_mut(&mut self, path: &Path<'static>) -> Option<&mut Node<D>> { self.nodes.get_mut(path) }

    /// Registers a vtable at `path`, allocating the node if it doesn't
    /// already exist. Rejects a second vtable for the same interface at the
    /// same path (`AlreadyExists`), and rejects mixing a fallback and a
    /// direct vtable for the same interface at the same path (`WrongProtocol`),
    /// mirroring the reference implementation's registration rules.
    pub fn insert_vtable(&mut self, path: Path<'static>, data: D, vtable: Vtable<D>) -> Result<(), Error>
    where D: Default {
        let node = self.nodes.entry(path).or_insert_with(|| Node::new(data));
        if let Some(existing) = node.vtable(vtable.interface.as_str()) {
            if existing.is_fallback != vtable.is_fallback {
                return Err(Error::WrongProtocol);
            }
            return Err(Error::AlreadyExists);
        }
        node.vtables.push(vtable);
        Ok(())
    }

    /// Removes one interface's vtable from `path`; GCs the node if it's now empty.
    pub fn remove_vtable(&mut self, path: &Path<'static>, interface: &str) -> Option<Vtable<D>> {
        let node = self.nodes.get_mut(path)?;
        let idx = node.vtables.iter().position(|v| v.interface.as_str() == interface)?;
        let removed = node.vtables.remove(idx);
        self.gc(path);
        Some(removed)
    }

    /// Drops `path`'s node entirely if it's empty (no vtables, not an object
    /// manager), matching §4.7's "GC the node" rule for unregistration.
    fn gc(&mut self, path: &Path<'static>) {
        if matches!(self.nodes.get(path), Some(n) if n.is_empty()) {
            self.nodes.remove(path);
        }
    }

    pub fn set_object_manager(&mut self, path: Path<'static>, data: D, v: bool) where D: Default {
        let node = self.nodes.entry(path.clone()).or_insert_with(|| Node::new(data));
        node.object_manager = v;
        if !v { self.gc(&path); }
    }

    /// Direct children one path-segment below `path` (not full descendants),
    /// for `Introspectable.Introspect`'s `<node name=.../>` listing and
    /// `ObjectManager.GetManagedObjects`'s subtree walk.
    pub fn children(&self, path: &Path<'static>) -> Vec<String> {
        let prefix = if path.as_str() == "/" { "/".to_string() } else { format!("{}/", path.as_str()) };
        let mut out: Vec<String> = self.nodes.keys()
            .filter_map(|p| {
                let rest = p.as_str().strip_prefix(prefix.as_str())?;
                if rest.is_empty() { return None; }
                Some(rest.split('/').next().unwrap().to_string())
            })
            .collect();
        out.sort();
        out.dedup();
        out
    }

    /// All descendant paths (not just direct children) strictly under `path`.
    pub fn descendants(&self, path: &Path<'static>) -> Vec<Path<'static>> {
        let prefix = if path.as_str() == "/" { "/".to_string() } else { format!("{}/", path.as_str()) };
        self.nodes.keys().filter(|p| p.as_str().starts_with(prefix.as_str())).cloned().collect()
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path<'static>> { self.nodes.keys() }

    /// Walks `path` and each of its ancestors (innermost first) looking for
    /// a fallback vtable implementing `interface`, per §4.6's fallback
    /// dispatch rule.
    pub fn find_fallback<'t>(&'t self, path: &Path<'static>, interface: &str) -> Option<&'t Node<D>> {
        for ancestor in path.parents() {
            if let Some(node) = self.nodes.get(&ancestor) {
                if let Some(v) = node.vtable(interface) {
                    if v.is_fallback { return Some(node); }
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::strings::Member;
    use crate::tree::vtable::Vtable;

    fn iface(name: &str) -> Interface<'static> { Interface::new(name.to_string()).unwrap() }
    fn path(s: &str) -> Path<'static> { Path::new(s.to_string()).unwrap() }

    #[test]
    fn insert_then_gc_on_last_remove() {
        let mut t: Tree<()> = Tree::new();
        t.insert_vtable(path("/a"), (), Vtable::new(iface("x.Y"), false)).unwrap();
        assert!(t.get(&path("/a")).is_some());
        t.remove_vtable(&path("/a"), "x.Y");
        assert!(t.get(&path("/a")).is_none());
    }

    #[test]
    fn duplicate_interface_rejected() {
        let mut t: Tree<()> = Tree::new();
        t.insert_vtable(path("/a"), (), Vtable::new(iface("x.Y"), false)).unwrap();
        let err = t.insert_vtable(path("/a"), (), Vtable::new(iface("x.Y"), false));
        assert!(matches!(err, Err(Error::AlreadyExists)));
    }

    #[test]
    fn fallback_direct_mismatch_rejected() {
        let mut t: Tree<()> = Tree::new();
        t.insert_vtable(path("/a"), (), Vtable::new(iface("x.Y"), true)).unwrap();
        let err = t.insert_vtable(path("/a"), (), Vtable::new(iface("x.Y"), false));
        assert!(matches!(err, Err(Error::WrongProtocol)));
    }

    #[test]
    fn children_are_one_level_only() {
        let mut t: Tree<()> = Tree::new();
        t.insert_vtable(path("/a"), (), Vtable::new(iface("x.Y"), false)).unwrap();
        t.insert_vtable(path("/a/b"), (), Vtable::new(iface("x.Y"), false)).unwrap();
        t.insert_vtable(path("/a/b/c"), (), Vtable::new(iface("x.Y"), false)).unwrap();
        assert_eq!(t.children(&path("/a")), vec!["b".to_string()]);
    }

    #[test]
    fn fallback_matches_descendant() {
        let mut t: Tree<()> = Tree::new();
        t.insert_vtable(path("/a"), (), Vtable::new(iface("x.Y"), true)).unwrap();
        let found = t.find_fallback(&path("/a/b/c"), "x.Y");
        assert!(found.is_some());
        assert!(t.find_fallback(&path("/other"), "x.Y").is_none());
    }
}
