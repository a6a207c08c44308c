//! `process_object`: routes one inbound method-call message to a node's
//! vtables (direct, then fallback ancestors), the built-in interfaces, or a
//! synthesized `UnknownObject`/`UnknownMethod`/`UnknownProperty` error.
//!
//! Grounded on `dbus-crossroads::Crossroads::handle_message` for the
//! path-lookup/interface-lookup/callback-invoke shape, generalized with the
//! fallback-ancestor walk and built-in interfaces this crate's tree adds on
//! top of crossroads's (fallback-free) direct-only model.

use crate::arg::Value;
use crate::error::MethodErr;
use crate::message::Message;
use crate::strings::Path;
use crate::tree::builtin::{self, INTROSPECTABLE_INTERFACE, OBJECT_MANAGER_INTERFACE, PEER_INTERFACE, PROPERTIES_INTERFACE};
use crate::tree::introspect::{IntrospectNode, IntrospectionWriter};
use crate::tree::node::Tree;

/// Dispatches one method-call message against `tree`. Returns the reply to
/// send (method-return or error), or `None` if the caller set
/// `NO_REPLY_EXPECTED` and the call nonetheless succeeded.
///
/// `machine_id` feeds `Peer.GetMachineId`; `writer` is the external
/// introspection-XML collaborator (see [`IntrospectionWriter`]).
pub fn dispatch<D>(
    tree: &mut Tree<D>,
    msg: &Message,
    machine_id: &str,
    writer: &dyn IntrospectionWriter,
) -> Option<Message> {
    let path = match msg.path() {
        Some(p) => p.clone(),
        None => return Some(msg.error_reply_named(crate::error::names::UNKNOWN_OBJECT, "no object path given")),
    };
    let member = match msg.member() {
        Some(m) => m.as_str().to_string(),
        None => return Some(msg.error_reply_named(crate::error::names::UNKNOWN_METHOD, "no member given")),
    };
    let interface = msg.interface().map(|i| i.as_str().to_string());

    // Peer works on any path, registered or not, and never counts toward
    // found_object — it's always implicitly present.
    if interface.as_deref() == Some(PEER_INTERFACE) || interface.is_none() {
        if let Some(body) = builtin::peer_call(&member, machine_id) {
            return reply(msg, Ok(body));
        }
    }

    let object_exists = tree.get(&path).is_some()
        || !tree.children(&path).is_empty()
        || path.parents().iter().any(|p| tree.get(p).is_some());

    let result = dispatch_at_node(tree, &path, &interface, &member, msg.body(), machine_id, writer);

    match result {
        Some(r) => reply(msg, r),
        None if object_exists => reply(msg, Err(MethodErr::no_method(&member))),
        None => Some(msg.error_reply_named(crate::error::names::UNKNOWN_OBJECT, "no such object")),
    }
}

fn reply(msg: &Message, result: Result<Vec<Value>, MethodErr>) -> Option<Message> {
    if msg.no_reply_expected() { return None; }
    Some(match result {
        Ok(body) => {
            let mut m = msg.method_return();
            for v in body { m.append_value(v); }
            m
        }
        Err(e) => msg.error_reply(
            crate::strings::ErrorName::new(e.name().to_string()).unwrap_or_else(|_| {
                crate::strings::ErrorName::new(crate::error::names::INVALID_ARGS).unwrap()
            }),
            e.message(),
        ),
    })
}

/// `None` means "no interface/member matched anywhere" (→ `UnknownMethod`
/// if the object exists, `UnknownObject` otherwise); `Some(_)` means a
/// handler ran (possibly returning an application error).
fn dispatch_at_node<D>(
    tree: &mut Tree<D>,
    path: &Path<'static>,
    interface: &Option<String>,
    member: &str,
    args: &[Value],
    machine_id: &str,
    writer: &dyn IntrospectionWriter,
) -> Option<Result<Vec<Value>, MethodErr>> {
    let _ = machine_id;

    // Properties and Introspectable/ObjectManager apply to the direct node
    // if present, else to the nearest fallback ancestor.
    let props_iface_matches = interface.as_deref() == Some(PROPERTIES_INTERFACE);
    let introspect_matches = interface.as_deref() == Some(INTROSPECTABLE_INTERFACE) && member == "Introspect";
    let object_manager_matches = interface.as_deref() == Some(OBJECT_MANAGER_INTERFACE) && member == "GetManagedObjects";

    if props_iface_matches {
        return Some(dispatch_properties(tree, path, member, args));
    }
    if introspect_matches {
        return Some(Ok(dispatch_introspect(tree, path, writer)));
    }
    if object_manager_matches {
        return Some(dispatch_object_manager(tree, path));
    }

    // Direct vtable on the exact node. `node.vtables` and `node.data` are
    // borrowed as disjoint fields (not via a `&mut self` accessor) so the
    // method call below can hold a `&mut` into each at once.
    if let Some(node) = tree.get_mut(path) {
        let found = node.vtables.iter_mut().find(|v| {
            !v.is_fallback && interface.as_deref().map_or(true, |i| v.interface.as_str() == i)
        });
        if let Some(vtable) = found {
            if let Some(method) = vtable.method_mut(member) {
                if let Err(e) = check_signature(method.in_signature.as_str(), args) {
                    return Some(Err(e));
                }
                return Some(method.call(args, &mut node.data));
            }
            if interface.is_some() { return None; }
        }
    }

    // Fallback ancestors, innermost first.
    for ancestor in path.parents() {
        if let Some(node) = tree.get_mut(&ancestor) {
            let found = node.vtables.iter_mut().find(|v| {
                v.is_fallback && interface.as_deref().map_or(true, |i| v.interface.as_str() == i)
            });
            if let Some(vtable) = found {
                if let Some(method) = vtable.method_mut(member) {
                    if let Err(e) = check_signature(method.in_signature.as_str(), args) {
                        return Some(Err(e));
                    }
                    return Some(method.call(args, &mut node.data));
                }
            }
        }
    }

    None
}

/// Verifies the caller's argument signature against the method's declared
/// `in_signature` before the handler ever sees the arguments.
fn check_signature(expected: &str, args: &[Value]) -> Result<(), MethodErr> {
    let actual: String = args.iter().map(|v| v.signature().as_str().to_string()).collect();
    if actual == expected {
        Ok(())
    } else {
        Err(MethodErr::new(
            crate::error::names::INVALID_ARGS,
            format!("expected signature '{}', got '{}'", expected, actual),
        ))
    }
}

fn dispatch_properties<D>(
    tree: &mut Tree<D>,
    path: &Path<'static>,
    member: &str,
    args: &[Value],
) -> Result<Vec<Value>, MethodErr> {
    match member {
        "Get" => {
            let iface = args.get(0).and_then(Value::as_str).ok_or_else(MethodErr::no_arg)?;
            let prop = args.get(1).and_then(Value::as_str).ok_or_else(MethodErr::no_arg)?;
            let node = find_node_for_properties(tree, path, iface).ok_or_else(|| MethodErr::no_interface(iface))?;
            builtin::properties_get(node, iface, prop).map(|v| vec![v])
        }
        "Set" => {
            let iface = args.get(0).and_then(Value::as_str).ok_or_else(MethodErr::no_arg)?.to_string();
            let prop = args.get(1).and_then(Value::as_str).ok_or_else(MethodErr::no_arg)?.to_string();
            let value = args.get(2).cloned().ok_or_else(MethodErr::no_arg)?;
            let node = find_node_for_properties_mut(tree, path, &iface).ok_or_else(|| MethodErr::no_interface(&iface))?;
            builtin::properties_set(node, &iface, &prop, value).map(|_| Vec::new())
        }
        "GetAll" => {
            let iface = args.get(0).and_then(Value::as_str).unwrap_or("").to_string();
            let node = find_node_for_properties(tree, path, &iface).ok_or_else(|| MethodErr::no_interface(&iface))?;
            let map = builtin::properties_get_all(node, &iface)?;
            Ok(vec![Value::Dict(map.into_iter().map(|(k, v)| (k, v.into_variant())).collect())])
        }
        other => Err(MethodErr::no_method(other)),
    }
}

fn find_node_for_properties<'t, D>(tree: &'t Tree<D>, path: &Path<'static>, interface: &str) -> Option<&'t crate::tree::node::Node<D>> {
    if let Some(n) = tree.get(path) {
        if interface.is_empty() || n.vtable(interface).is_some() { return Some(n); }
    }
    tree.find_fallback(path, interface)
}

fn find_node_for_properties_mut<'t, D>(tree: &'t mut Tree<D>, path: &Path<'static>, interface: &str) -> Option<&'t mut crate::tree::node::Node<D>> {
    if tree.get(path).map_or(false, |n| n.vtable(interface).is_some()) {
        return tree.get_mut(path);
    }
    for ancestor in path.parents() {
        if tree.get(&ancestor).map_or(false, |n| n.vtable(interface).map_or(false, |v| v.is_fallback)) {
            return tree.get_mut(&ancestor);
        }
    }
    None
}

fn dispatch_introspect<D>(tree: &Tree<D>, path: &Path<'static>, writer: &dyn IntrospectionWriter) -> Vec<Value> {
    let mut interfaces = builtin::default_interfaces(tree, path);
    let mut direct: Vec<_> = tree.get(path).map(|n| n.interfaces().cloned().collect()).unwrap_or_default();
    interfaces.append(&mut direct);
    interfaces.sort();
    interfaces.dedup();
    let children = tree.children(path);
    let node = IntrospectNode { path, interfaces: interfaces.iter().collect(), children };
    vec![Value::Str(writer.write(&node))]
}

fn dispatch_object_manager<D>(tree: &mut Tree<D>, path: &Path<'static>) -> Result<Vec<Value>, MethodErr> {
    let effective = tree.get(path).map_or(false, |n| n.object_manager)
        || path.parents().iter().any(|p| tree.get(p).map_or(false, |n| n.object_manager));
    if !effective {
        return Err(MethodErr::no_interface(OBJECT_MANAGER_INTERFACE));
    }
    let managed = builtin::get_managed_objects(tree, path);
    let mut outer = std::collections::BTreeMap::new();
    for (p, ifaces) in managed {
        let inner: std::collections::BTreeMap<String, Value> = ifaces.into_iter()
            .map(|(iface, props)| (iface, Value::Dict(props.into_iter().map(|(k, v)| (k, v.into_variant())).collect())))
            .collect();
        outer.insert(p.as_str().to_string(), Value::Dict(inner));
    }
    Ok(vec![Value::Dict(outer)])
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::strings::{BusName, Interface, Member};
    use crate::tree::introspect::DefaultIntrospectionWriter;
    use crate::tree::vtable::{MethodDescriptor, Vtable};

    fn call(dest: &str, path: &str, iface: &str, member: &str) -> Message {
        let mut m = Message::new_method_call(
            BusName::new(dest.to_string()).unwrap(), Path::new(path.to_string()).unwrap(),
            Interface::new(iface.to_string()).unwrap(), Member::new(member.to_string()).unwrap());
        m.seal(std::num::NonZeroU32::new(1).unwrap()).unwrap();
        m
    }

    #[test]
    fn peer_ping_replies_empty() {
        let mut t: Tree<()> = Tree::new();
        let msg = call("a.b", "/", PEER_INTERFACE, "Ping");
        let reply = dispatch(&mut t, &msg, "abc", &DefaultIntrospectionWriter).unwrap();
        assert!(reply.body().is_empty());
        assert_eq!(reply.reply_serial(), Some(1));
    }

    #[test]
    fn unknown_object_when_nothing_registered() {
        let mut t: Tree<()> = Tree::new();
        let msg = call("a.b", "/nope", "x.Y", "Z");
        let reply = dispatch(&mut t, &msg, "abc", &DefaultIntrospectionWriter).unwrap();
        assert_eq!(reply.error_name().unwrap().as_str(), crate::error::names::UNKNOWN_OBJECT);
    }

    #[test]
    fn direct_method_dispatch() {
        let mut t: Tree<i32> = Tree::new();
        let vtable = Vtable::new(Interface::new("x.Y").unwrap(), false).with_method(
            MethodDescriptor::new(Member::new("Double").unwrap(), "", "i",
                |_args, data: &mut i32| Ok(vec![Value::I32(*data * 2)])));
        t.insert_vtable(Path::new("/a").unwrap(), 21, vtable).unwrap();
        let msg = call("a.b", "/a", "x.Y", "Double");
        let reply = dispatch(&mut t, &msg, "abc", &DefaultIntrospectionWriter).unwrap();
        assert_eq!(reply.body(), &[Value::I32(42)]);
    }

    #[test]
    fn wrong_argument_signature_is_invalid_args() {
        let mut t: Tree<i32> = Tree::new();
        let vtable = Vtable::new(Interface::new("x.Y").unwrap(), false).with_method(
            MethodDescriptor::new(Member::new("Double").unwrap(), "i", "i",
                |args, _data: &mut i32| Ok(vec![args[0].clone()])));
        t.insert_vtable(Path::new("/a").unwrap(), 21, vtable).unwrap();
        let mut msg = call("a.b", "/a", "x.Y", "Double");
        msg.append_value(Value::Str("not an int".into()));
        let reply = dispatch(&mut t, &msg, "abc", &DefaultIntrospectionWriter).unwrap();
        assert_eq!(reply.error_name().unwrap().as_str(), crate::error::names::INVALID_ARGS);
    }

    #[test]
    fn fallback_method_dispatch_on_descendant() {
        let mut t: Tree<i32> = Tree::new();
        let vtable = Vtable::new(Interface::new("x.Y").unwrap(), true).with_method(
            MethodDescriptor::new(Member::new("Echo").unwrap(), "", "s",
                |_args, _data: &mut i32| Ok(vec![Value::Str("hi".into())])));
        t.insert_vtable(Path::new("/a").unwrap(), 0, vtable).unwrap();
        let msg = call("a.b", "/a/b/c", "x.Y", "Echo");
        let reply = dispatch(&mut t, &msg, "abc", &DefaultIntrospectionWriter).unwrap();
        assert_eq!(reply.body(), &[Value::Str("hi".into())]);
    }
}
