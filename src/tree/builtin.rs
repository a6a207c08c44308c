//! The built-in interfaces every object tree implements without explicit
//! registration: `Peer`, `Properties`, `Introspectable`, `ObjectManager`.
//!
//! Grounded on `dbus-crossroads`'s `stdimpl.rs` (`introspectable`,
//! `properties`, `object_manager` registration functions and their
//! `get`/`set`/`getall`/`get_managed_objects` bodies), adapted from
//! crossroads's async `Context`/`Crossroads` callback style to this crate's
//! synchronous dispatch.

use std::collections::BTreeMap;

use crate::arg::Value;
use crate::error::MethodErr;
use crate::strings::{Interface, Path};
use crate::tree::node::{Node, Tree};

pub const PEER_INTERFACE: &str = "org.freedesktop.DBus.Peer";
pub const INTROSPECTABLE_INTERFACE: &str = "org.freedesktop.DBus.Introspectable";
pub const PROPERTIES_INTERFACE: &str = "org.freedesktop.DBus.Properties";
pub const OBJECT_MANAGER_INTERFACE: &str = "org.freedesktop.DBus.ObjectManager";

/// `Peer.Ping` → empty return, `Peer.GetMachineId` → a 32-hex-char id.
/// Returns `None` for any other member (the caller then falls through to
/// `UnknownMethod`).
pub fn peer_call(member: &str, machine_id: &str) -> Option<Vec<Value>> {
    match member {
        "Ping" => Some(Vec::new()),
        "GetMachineId" => Some(vec![Value::Str(machine_id.to_string())]),
        _ => None,
    }
}

/// `Properties.Get`.
pub fn properties_get<D>(node: &Node<D>, interface: &str, property: &str) -> Result<Value, MethodErr> {
    let vtable = node.vtable(interface).ok_or_else(|| MethodErr::no_interface(interface))?;
    let prop = vtable.property(property).ok_or_else(|| MethodErr::no_property(property))?;
    prop.get(&node.data).map(Value::into_variant)
}

/// `Properties.Set`.
pub fn properties_set<D>(node: &mut Node<D>, interface: &str, property: &str, value: Value) -> Result<(), MethodErr> {
    let vtable = node.vtables.iter_mut().find(|v| v.interface.as_str() == interface)
        .ok_or_else(|| MethodErr::no_interface(interface))?;
    let prop = vtable.property_mut(property).ok_or_else(|| MethodErr::no_property(property))?;
    if !prop.writable() { return Err(MethodErr::read_only(property)); }
    prop.set(&mut node.data, value)
}

/// `Properties.GetAll`. An empty `interface` string matches every vtable on
/// the node, mirroring the reference dispatcher's "empty string = any" rule.
pub fn properties_get_all<D>(node: &Node<D>, interface: &str) -> Result<BTreeMap<String, Value>, MethodErr> {
    let mut out = BTreeMap::new();
    let mut matched = false;
    for vtable in &node.vtables {
        if !interface.is_empty() && vtable.interface.as_str() != interface { continue; }
        matched = true;
        for prop in &vtable.properties {
            if let Ok(v) = prop.get(&node.data) {
                out.insert(prop.name.as_str().to_string(), v.into_variant());
            }
        }
    }
    if !matched && !interface.is_empty() {
        return Err(MethodErr::no_interface(interface));
    }
    Ok(out)
}

/// Interfaces implicitly available on every node, plus `ObjectManager` when
/// this node or an ancestor declared it, for `Introspect`'s interface list.
pub fn default_interfaces<D>(tree: &Tree<D>, path: &Path<'static>) -> Vec<Interface<'static>> {
    let mut v = vec![
        Interface::new(PEER_INTERFACE).unwrap(),
        Interface::new(INTROSPECTABLE_INTERFACE).unwrap(),
        Interface::new(PROPERTIES_INTERFACE).unwrap(),
    ];
    let is_object_manager = tree.get(path).map_or(false, |n| n.object_manager)
        || path.parents().iter().any(|p| tree.get(p).map_or(false, |n| n.object_manager));
    if is_object_manager {
        v.push(Interface::new(OBJECT_MANAGER_INTERFACE).unwrap());
    }
    v
}

/// `ObjectManager.GetManagedObjects`: every descendant path mapped to its
/// interfaces' current properties. Effective only when `path` or an
/// ancestor has `object_manager = true` (checked by the caller).
pub fn get_managed_objects<D>(
    tree: &Tree<D>,
    path: &Path<'static>,
) -> BTreeMap<Path<'static>, BTreeMap<String, BTreeMap<String, Value>>> {
    let mut out = BTreeMap::new();
    for descendant in tree.descendants(path) {
        let node = match tree.get(&descendant) { Some(n) => n, None => continue };
        let mut ifaces = BTreeMap::new();
        for vtable in &node.vtables {
            let mut props = BTreeMap::new();
            for prop in &vtable.properties {
                if let Ok(v) = prop.get(&node.data) {
                    props.insert(prop.name.as_str().to_string(), v);
                }
            }
            ifaces.insert(vtable.interface.as_str().to_string(), props);
        }
        out.insert(descendant, ifaces);
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::strings::Member;
    use crate::tree::vtable::{EmitsChanged, PropertyDescriptor, Vtable};

    #[test]
    fn ping_and_get_machine_id() {
        assert_eq!(peer_call("Ping", "abc"), Some(Vec::new()));
        assert_eq!(peer_call("GetMachineId", "abc"), Some(vec![Value::Str("abc".into())]));
        assert_eq!(peer_call("Spurious", "abc"), None);
    }

    #[test]
    fn get_and_set_property() {
        let mut t: Tree<i32> = Tree::new();
        let vtable = Vtable::new(Interface::new("x.Y").unwrap(), false)
            .with_property(PropertyDescriptor::read_only(
                Member::new("Foo").unwrap(), crate::strings::Signature::new("i").unwrap(),
                EmitsChanged::True, |data: &i32| Ok(Value::I32(*data)),
            ));
        t.insert_vtable(Path::new("/a").unwrap(), 42, vtable).unwrap();
        let node = t.get(&Path::new("/a").unwrap()).unwrap();
        let v = properties_get(node, "x.Y", "Foo").unwrap();
        assert_eq!(v, Value::Variant(Box::new(Value::I32(42))));
        let err = properties_get(node, "x.Y", "Bar").unwrap_err();
        assert_eq!(err.name(), crate::error::names::UNKNOWN_PROPERTY);
    }

    #[test]
    fn set_on_read_only_property_errors() {
        let mut t: Tree<i32> = Tree::new();
        let vtable = Vtable::new(Interface::new("x.Y").unwrap(), false)
            .with_property(PropertyDescriptor::read_only(
                Member::new("Foo").unwrap(), crate::strings::Signature::new("i").unwrap(),
                EmitsChanged::False, |data: &i32| Ok(Value::I32(*data)),
            ));
        t.insert_vtable(Path::new("/a").unwrap(), 1, vtable).unwrap();
        let node = t.get_mut(&Path::new("/a").unwrap()).unwrap();
        let err = properties_set(node, "x.Y", "Foo", Value::I32(2)).unwrap_err();
        assert_eq!(err.name(), crate::error::names::PROPERTY_READ_ONLY);
    }
}
