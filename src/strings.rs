//! Strings with a specific format, such as a valid Interface name, a valid
//! Error name, etc.
//!
//! Unlike the FFI-backed `dbus` crate this core is descended from, validation
//! here is done in pure Rust (no libdbus call) against the same grammars,
//! and the internal representation is a plain `Cow<str>` rather than `Cow<CStr>`.

use std::{fmt, ops, default, hash};
use std::borrow::Cow;

use crate::error::Error;
use crate::validate;

macro_rules! dstring_wrapper {
    ($(#[$comments:meta])* $t:ident, $check:path) => {

$(#[$comments])*
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone)]
pub struct $t<'a>(Cow<'a, str>);

impl<'m> $t<'m> {
    #[cfg(feature = "no-string-validation")]
    fn check_valid(_: &str) -> bool { true }

    #[cfg(not(feature = "no-string-validation"))]
    fn check_valid(s: &str) -> bool { $check(s) }

    /// Creates a new instance of this struct, validating it against the D-Bus grammar.
    ///
    /// Note: if the `no-string-validation` feature is enabled, no check is performed.
    pub fn new<S: Into<Cow<'m, str>>>(s: S) -> Result<$t<'m>, Error> {
        let s = s.into();
        if $t::check_valid(&s) { Ok($t(s)) }
        else { Err(Error::invalid_argument(format!("'{}' is not a valid {}", s, stringify!($t)))) }
    }

    /// Makes sure this string does not contain borrows.
    pub fn into_static(self) -> $t<'static> { $t(Cow::Owned(self.0.into_owned())) }

    /// Views this value as a plain `&str`.
    pub fn as_str(&self) -> &str { &self.0 }
}

impl<'m> From<$t<'m>> for String { fn from(s: $t<'m>) -> String { s.0.into_owned() } }

/// # Panics
/// If the given string is not valid.
impl<'m> From<String> for $t<'m> { fn from(s: String) -> $t<'m> { $t::new(s).unwrap() } }

/// # Panics
/// If the given string is not valid.
impl<'m> From<&'m str> for $t<'m> { fn from(s: &'m str) -> $t<'m> { $t::new(s).unwrap() } }

impl<'inner, 'm: 'inner> From<&'m $t<'inner>> for $t<'m> {
    fn from(borrow: &'m $t<'inner>) -> $t<'m> { $t(Cow::Borrowed(borrow.0.as_ref())) }
}

impl<'m> ops::Deref for $t<'m> {
    type Target = str;
    fn deref(&self) -> &str { &self.0 }
}

impl<'m> AsRef<str> for $t<'m> {
    fn as_ref(&self) -> &str { &self.0 }
}

impl<'m> fmt::Display for $t<'m> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result { fmt::Display::fmt(&self.0, f) }
}

impl<'m> hash::Hash for $t<'m> {
    fn hash<H: hash::Hasher>(&self, state: &mut H) { self.0.hash(state); }
}

}}

dstring_wrapper!(
    /// A wrapper around a string that is guaranteed to be a valid (single)
    /// D-Bus type signature.
    Signature, crate::strings::check_signature
);

impl<'a> default::Default for Signature<'a> {
    fn default() -> Signature<'a> { Signature(Cow::Borrowed("")) }
}

fn check_signature(s: &str) -> bool { validate::is_valid_signature_single(s.as_bytes()) }

dstring_wrapper!(
    /// A wrapper around a string that is guaranteed to be a valid D-Bus object path.
    Path, validate::is_valid_object_path
);

impl<'a> Path<'a> {
    /// The root path, `/`.
    pub fn root() -> Path<'static> { Path(Cow::Borrowed("/")) }

    /// Yields every strict parent prefix of this path, innermost first, down to (and
    /// including) `/`. Used by fallback dispatch and by `PropertiesChanged` emission
    /// to walk the ancestor chain of an object path.
    pub fn parents(&self) -> Vec<Path<'static>> {
        let s = self.0.as_ref();
        let mut out = Vec::new();
        if s == "/" { return out; }
        let mut end = s.rfind('/').unwrap_or(0);
        loop {
            let prefix = if end == 0 { "/" } else { &s[..end] };
            out.push(Path(Cow::Owned(prefix.to_string())));
            if prefix == "/" { break; }
            end = prefix.rfind('/').unwrap_or(0);
        }
        out
    }
}

impl<'a> default::Default for Path<'a> {
    fn default() -> Path<'a> { Path::root() }
}

dstring_wrapper!(
    /// A wrapper around a string that is guaranteed to be a valid D-Bus member
    /// (a signal or method name).
    Member, validate::is_valid_member_name
);

impl<'a> default::Default for Member<'a> {
    fn default() -> Member<'a> { Member(Cow::Borrowed("")) }
}

dstring_wrapper!(
    /// A wrapper around a string that is guaranteed to be a valid D-Bus interface name.
    Interface, validate::is_valid_interface_name
);

impl<'a> default::Default for Interface<'a> {
    fn default() -> Interface<'a> { Interface(Cow::Borrowed("")) }
}

dstring_wrapper!(
    /// A wrapper around a string that is guaranteed to be a valid D-Bus bus name.
    BusName, validate::is_valid_bus_name
);

impl<'a> default::Default for BusName<'a> {
    fn default() -> BusName<'a> { BusName(Cow::Borrowed("")) }
}

dstring_wrapper!(
    /// A wrapper around a string that is guaranteed to be a valid D-Bus error name.
    ErrorName, validate::is_valid_error_name
);

impl<'a> default::Default for ErrorName<'a> {
    fn default() -> ErrorName<'a> { ErrorName(Cow::Borrowed("")) }
}

impl<'a> BusName<'a> {
    /// Whether this is a unique (broker-assigned, `:x.y`) name as opposed to a
    /// well-known name.
    pub fn is_unique(&self) -> bool { self.0.starts_with(':') }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn some_path() {
        let p1: Path = "/valid".into();
        assert_eq!(p1.as_str(), "/valid");
        assert!(Path::new("##invalid##").is_err());
    }

    #[test]
    fn reborrow_path() {
        let p1 = Path::from("/valid");
        let p2 = p1.clone();
        {
            let p2_borrow: &Path = &p2;
            let p3 = Path::from(p2_borrow);
            assert_eq!(p2, p3);
        }
        assert_eq!(p1, p2);
    }

    #[test]
    fn path_parents() {
        let p = Path::new("/a/b/c").unwrap();
        let parents: Vec<String> = p.parents().into_iter().map(|x| x.into()).collect();
        assert_eq!(parents, vec!["/a/b".to_string(), "/a".to_string(), "/".to_string()]);
        assert!(Path::root().parents().is_empty());
    }

    #[test]
    fn unique_name() {
        let b = BusName::new(":1.42").unwrap();
        assert!(b.is_unique());
        let b2 = BusName::new("org.freedesktop.DBus").unwrap();
        assert!(!b2.is_unique());
    }
}
