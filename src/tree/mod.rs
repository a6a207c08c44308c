//! The server-side object tree: path-keyed vtables, built-in interfaces,
//! and method/property dispatch.
//!
//! Grounded on `dbus-crossroads` (`Crossroads`/`path.rs`/`ifacedesc.rs`/
//! `stdimpl.rs`), adapted from its async callback model to this crate's
//! synchronous one and extended with the fallback-vtable/object-manager
//! machinery the reference connection core provides that crossroads, being
//! direct-only, does not need.

pub mod builtin;
pub mod dispatch;
pub mod introspect;
pub mod node;
pub mod vtable;

pub use dispatch::dispatch;
pub use introspect::{DefaultIntrospectionWriter, IntrospectionWriter};
pub use node::{Node, Tree};
pub use vtable::{EmitsChanged, MethodDescriptor, PropertyDescriptor, SignalDescriptor, Vtable};

use crate::arg::Value;
use crate::error::Error;
use crate::message::Message;
use crate::strings::{Interface, Path};

/// `emit_properties_changed_strv` (§4.8): builds one `PropertiesChanged`
/// signal per applicable vtable (the path's own, plus any fallback ancestor
/// that also implements `interface`), for each name in `names` that the
/// owning vtable declares `EMITS_CHANGE` for.
///
/// Returns the signals to send. `Error::NoEntry` if `interface` is
/// registered nowhere along the path's ancestor chain; `Error::ArgumentOutOfDomain`
/// if a requested property exists but isn't flagged to emit changes.
pub fn emit_properties_changed_strv<D>(
    tree: &Tree<D>,
    path: &Path<'static>,
    interface: &Interface<'static>,
    names: &[&str],
) -> Result<Vec<Message>, Error> {
    let mut candidates: Vec<&Path<'static>> = Vec::new();
    if tree.get(path).map_or(false, |n| n.vtable(interface.as_str()).is_some()) {
        candidates.push(path);
    }
    let parents = path.parents();
    for p in &parents {
        if tree.get(p).map_or(false, |n| n.vtable(interface.as_str()).map_or(false, |v| v.is_fallback)) {
            candidates.push(p);
        }
    }
    if candidates.is_empty() {
        return Err(Error::NoEntry);
    }

    let mut signals = Vec::new();
    for owner in candidates {
        let node = tree.get(owner).unwrap();
        let vtable = node.vtable(interface.as_str()).unwrap();
        let mut changed = std::collections::BTreeMap::new();
        let mut invalidated = Vec::new();
        for name in names {
            let prop = vtable.property(name).ok_or(Error::NoEntry)?;
            if !prop.emits_change() {
                return Err(Error::ArgumentOutOfDomain);
            }
            if prop.invalidates_only() {
                invalidated.push(Value::Str((*name).to_string()));
            } else {
                let value = prop.get(&node.data).map_err(|e| Error::invalid_argument(e.message().to_string()))?;
                changed.insert((*name).to_string(), value.into_variant());
            }
        }
        let sig = Message::new_signal(path.clone(), interface.clone(), crate::strings::Member::new("PropertiesChanged").unwrap())
            .append(Value::Str(interface.as_str().to_string()))
            .append(Value::Dict(changed))
            .append(Value::Array(invalidated));
        signals.push(sig);
    }
    Ok(signals)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::strings::{Member, Signature};
    use vtable::PropertyDescriptor;

    #[test]
    fn emits_one_signal_with_changed_and_invalidated_props() {
        let mut t: Tree<i32> = Tree::new();
        let vtable = Vtable::new(Interface::new("x.Y").unwrap(), false)
            .with_property(PropertyDescriptor::read_only(
                Member::new("A").unwrap(), Signature::new("i").unwrap(),
                EmitsChanged::True, |d: &i32| Ok(Value::I32(*d)),
            ))
            .with_property(PropertyDescriptor::read_only(
                Member::new("B").unwrap(), Signature::new("i").unwrap(),
                EmitsChanged::Invalidates, |d: &i32| Ok(Value::I32(*d)),
            ));
        t.insert_vtable(Path::new("/a").unwrap(), 7, vtable).unwrap();
        let sigs = emit_properties_changed_strv(
            &t, &Path::new("/a").unwrap(), &Interface::new("x.Y").unwrap(), &["A", "B"],
        ).unwrap();
        assert_eq!(sigs.len(), 1);
        assert_eq!(sigs[0].body().len(), 3);
    }

    #[test]
    fn rejects_property_without_emits_change() {
        let mut t: Tree<i32> = Tree::new();
        let vtable = Vtable::new(Interface::new("x.Y").unwrap(), false)
            .with_property(PropertyDescriptor::read_only(
                Member::new("A").unwrap(), Signature::new("i").unwrap(),
                EmitsChanged::False, |d: &i32| Ok(Value::I32(*d)),
            ));
        t.insert_vtable(Path::new("/a").unwrap(), 0, vtable).unwrap();
        let err = emit_properties_changed_strv(
            &t, &Path::new("/a").unwrap(), &Interface::new("x.Y").unwrap(), &["A"],
        );
        assert!(matches!(err, Err(Error::ArgumentOutOfDomain)));
    }

    #[test]
    fn no_vtable_anywhere_is_no_entry() {
        let t: Tree<i32> = Tree::new();
        let err = emit_properties_changed_strv(
            &t, &Path::new("/a").unwrap(), &Interface::new("x.Y").unwrap(), &["A"],
        );
        assert!(matches!(err, Err(Error::NoEntry)));
    }
}
