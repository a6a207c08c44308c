//! The `Introspectable.Introspect` XML writer.
//!
//! Generating introspection XML is explicitly out of scope for this crate —
//! it's a pure serialization concern with no bearing on the connection state
//! machine or dispatch pipeline. What belongs here is the seam:
//! [`IntrospectionWriter`] is the trait `process_object` calls through, so an
//! embedder can plug in a real writer (or none at all, accepting
//! `UnknownMethod` on `Introspect`). [`DefaultIntrospectionWriter`] is a
//! minimal implementation used by this crate's own tests.

use crate::strings::{Interface, Path};

/// What one introspectable node looks like, gathered by the dispatch
/// pipeline per §4.6d before handing off to the writer.
pub struct IntrospectNode<'a> {
    pub path: &'a Path<'static>,
    pub interfaces: Vec<&'a Interface<'static>>,
    pub children: Vec<String>,
}

/// External collaborator that turns a gathered [`IntrospectNode`] into XML.
pub trait IntrospectionWriter: Send {
    fn write(&self, node: &IntrospectNode) -> String;
}

/// A minimal writer good enough to exercise the dispatch path in tests: it
/// emits the DOCTYPE, one empty `<interface name="...">` per interface and
/// one `<node name="...">` per child, but does not describe methods,
/// properties or signal arguments (that detail lives in the vtable
/// descriptors, not in this crate's scope to serialize).
pub struct DefaultIntrospectionWriter;

impl IntrospectionWriter for DefaultIntrospectionWriter {
    fn write(&self, node: &IntrospectNode) -> String {
        let mut body = String::new();
        for i in &node.interfaces {
            body += &format!("  <interface name=\"{}\"/>\n", i);
        }
        for c in &node.children {
            body += &format!("  <node name=\"{}\"/>\n", c);
        }
        format!(
            "<!DOCTYPE node PUBLIC \"-//freedesktop//DTD D-BUS Object Introspection 1.0//EN\"\n\
             \"http://www.freedesktop.org/standards/dbus/1.0/introspect.dtd\">\n\
             <node name=\"{}\">\n{}</node>",
            node.path, body
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_writer_lists_interfaces_and_children() {
        let path = Path::new("/a").unwrap();
        let iface = Interface::new("org.test.X").unwrap();
        let node = IntrospectNode { path: &path, interfaces: vec![&iface], children: vec!["b".into()] };
        let xml = DefaultIntrospectionWriter.write(&node);
        assert!(xml.contains("org.test.X"));
        assert!(xml.contains("<node name=\"b\"/>"));
    }
}
