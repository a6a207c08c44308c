//! Pure-Rust validators for the D-Bus name grammars (object paths, interface
//! names, bus names, member names, error names and single/multi type
//! signatures). No FFI, no libdbus: these are plain byte-grammar walks.

fn is_az_(b: u8) -> bool {
    matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'_')
}

fn is_az09_(b: u8) -> bool {
    matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_')
}

fn is_az_hyphen(b: u8) -> bool {
    matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'_' | b'-')
}

fn is_az09_hyphen(b: u8) -> bool {
    matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_' | b'-')
}

/// Validates a D-Bus member (method/signal) name: `[A-Za-z_][A-Za-z0-9_]*`, max 255 bytes.
pub fn is_valid_member_name(s: &str) -> bool {
    if s.is_empty() || s.len() > 255 { return false; }
    let mut it = s.bytes();
    let Some(first) = it.next() else { return false };
    if !is_az_(first) { return false; }
    it.all(is_az09_)
}

/// Validates a D-Bus error name: identical grammar to an interface name.
pub fn is_valid_error_name(s: &str) -> bool {
    is_valid_interface_name(s)
}

/// Validates a D-Bus interface name: dot-separated elements, each `[A-Za-z_][A-Za-z0-9_]*`,
/// at least two elements, max 255 bytes.
pub fn is_valid_interface_name(s: &str) -> bool {
    if s.is_empty() || s.len() > 255 { return false; }
    let mut elements = 0usize;
    for part in s.split('.') {
        elements += 1;
        let mut it = part.bytes();
        let Some(first) = it.next() else { return false };
        if !is_az_(first) { return false; }
        if !it.all(is_az09_) { return false; }
    }
    elements > 1
}

fn is_valid_unique_conn_name_suffix(s: &str) -> bool {
    let mut elements = 0usize;
    for part in s.split('.') {
        elements += 1;
        let mut it = part.bytes();
        let Some(first) = it.next() else { return false };
        if !is_az09_hyphen(first) { return false; }
        if !it.all(is_az09_hyphen) { return false; }
    }
    elements > 1
}

/// Validates a D-Bus bus name: either a unique name (`:x.y…`) or a well-known
/// dot-separated name, max 255 bytes.
pub fn is_valid_bus_name(s: &str) -> bool {
    if s.is_empty() || s.len() > 255 { return false; }
    if let Some(rest) = s.strip_prefix(':') {
        return is_valid_unique_conn_name_suffix(rest);
    }
    let mut elements = 0usize;
    for part in s.split('.') {
        elements += 1;
        let mut it = part.bytes();
        let Some(first) = it.next() else { return false };
        if !is_az_hyphen(first) { return false; }
        if !it.all(is_az09_hyphen) { return false; }
    }
    elements > 1
}

/// Validates a D-Bus object path: `/` or `/` followed by `/`-separated
/// elements of `[A-Za-z0-9_]+`, no trailing slash, no empty elements.
pub fn is_valid_object_path(s: &str) -> bool {
    if !s.starts_with('/') { return false; }
    if s.len() == 1 { return true; }
    if s.ends_with('/') { return false; }
    s[1..].split('/').all(|part| !part.is_empty() && part.bytes().all(is_az09_))
}

const BASIC_TYPES: &[u8] = b"ybnqiuxtdhsog";

fn sig_multi(s: &[u8]) -> Option<usize> {
    let mut pos = 0;
    while pos < s.len() {
        if s.get(pos) == Some(&b')') { return Some(pos); }
        pos += sig_single(&s[pos..])?;
    }
    Some(pos)
}

fn sig_single(s: &[u8]) -> Option<usize> {
    let c = s.first()?;
    if BASIC_TYPES.contains(c) { return Some(1); }
    Some(1 + match c {
        b'v' => 0,
        b'a' => {
            if s.get(1) == Some(&b'{') {
                let key = s.get(2)?;
                if !BASIC_TYPES.contains(key) { return None; }
                let pos = 3 + sig_single(&s[3..])?;
                if s.get(pos)? != &b'}' { return None; }
                pos
            } else {
                sig_single(&s[1..])?
            }
        }
        b'(' => {
            let pos = 1 + sig_multi(&s[1..])?;
            if pos == 1 || s.get(pos)? != &b')' { return None; }
            pos
        }
        _ => return None,
    })
}

/// Validates that `s` is exactly one complete D-Bus type signature.
pub fn is_valid_signature_single(s: &[u8]) -> bool {
    matches!(sig_single(s), Some(pos) if pos == s.len())
}

/// Validates that `s` is zero or more concatenated complete D-Bus type signatures.
pub fn is_valid_signature_multi(s: &[u8]) -> bool {
    matches!(sig_multi(s), Some(pos) if pos == s.len())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn member() {
        assert!(!is_valid_member_name(""));
        assert!(is_valid_member_name("He11o"));
        assert!(!is_valid_member_name("He11o!"));
        assert!(!is_valid_member_name("1Hello"));
        assert!(!is_valid_member_name(":1.54"));
    }

    #[test]
    fn interface() {
        assert!(!is_valid_interface_name(""));
        assert!(!is_valid_interface_name("He11o"));
        assert!(!is_valid_interface_name("Hello."));
        assert!(!is_valid_interface_name("Hello!.World"));
        assert!(!is_valid_interface_name("ZZZ.1Hello"));
        assert!(is_valid_interface_name("Hello.W0rld"));
        assert!(!is_valid_interface_name(":1.54"));
    }

    #[test]
    fn bus() {
        assert!(!is_valid_bus_name(""));
        assert!(!is_valid_bus_name("He11o"));
        assert!(!is_valid_bus_name("Hello."));
        assert!(is_valid_bus_name("Hello.W0rld"));
        assert!(is_valid_bus_name(":1.54"));
        assert!(!is_valid_bus_name("1.54"));
    }

    #[test]
    fn object_path() {
        assert!(!is_valid_object_path(""));
        assert!(is_valid_object_path("/"));
        assert!(is_valid_object_path("/1234"));
        assert!(!is_valid_object_path("/abce/"));
        assert!(!is_valid_object_path("/ab//c/d"));
        assert!(is_valid_object_path("/a/c/df1"));
        assert!(!is_valid_object_path("/12.43/fasd"));
        assert!(is_valid_object_path("/asdf/_123"));
    }

    #[test]
    fn signature() {
        assert!(!is_valid_signature_single(b""));
        assert!(is_valid_signature_single(b"i"));
        assert!(!is_valid_signature_single(b"ii"));
        assert!(!is_valid_signature_single(b"vi"));
        assert!(is_valid_signature_single(b"g"));
        assert!(!is_valid_signature_single(b"{ss}"));
        assert!(is_valid_signature_single(b"ad"));
        assert!(is_valid_signature_single(b"a{ss}"));
        assert!(!is_valid_signature_single(b"a{vs}"));
        assert!(is_valid_signature_single(b"a{oa{sv}}"));
        assert!(is_valid_signature_single(b"v"));
        assert!(!is_valid_signature_single(b"()"));
        assert!(is_valid_signature_single(b"(s)"));
        assert!(is_valid_signature_multi(b"dbus"));
        assert!(is_valid_signature_multi(b""));
        assert!(!is_valid_signature_multi(b"dbus)"));
    }
}
