//! Interface vtables: the method/property/signal descriptors an application
//! registers at an object path.
//!
//! Grounded on `dbus-crossroads`'s `IfaceDesc`/`Registry` (one descriptor per
//! registered interface, methods looked up by name, a take/give-back dance
//! around the callback to guard against a handler re-entering its own
//! dispatch), simplified to the synchronous call model this crate uses.

use crate::arg::Value;
use crate::error::MethodErr;
use crate::strings::{Interface, Member, Signature};

pub type MethodResult = Result<Vec<Value>, MethodErr>;

/// A method handler. Boxed `FnMut` rather than `Fn` so a handler can close
/// over mutable state (a counter, a channel sender) the way application
/// code typically does.
pub type MethodHandler<D> = Box<dyn FnMut(&[Value], &mut D) -> MethodResult + Send>;

pub type PropertyGetter<D> = Box<dyn Fn(&D) -> Result<Value, MethodErr> + Send>;
pub type PropertySetter<D> = Box<dyn FnMut(&mut D, Value) -> Result<(), MethodErr> + Send>;

/// Mirrors the `org.freedesktop.DBus.Properties.EmitsChangedSignal`
/// annotation values.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum EmitsChanged {
    True,
    Invalidates,
    Const,
    False,
}

/// Method argument/return signatures are zero-or-more concatenated complete
/// types (e.g. `""`, `"i"`, `"ii"`), unlike [`Signature`] which wraps
/// exactly one — so these are validated `String`s, not `Signature`s.
pub struct MethodDescriptor<D> {
    pub name: Member<'static>,
    pub in_signature: String,
    pub out_signature: String,
    handler: MethodHandler<D>,
    /// Taken out of the descriptor for the duration of the call, and given
    /// back afterwards; `None` here means a call is already in flight on
    /// this descriptor.
    taken: bool,
}

impl<D> MethodDescriptor<D> {
    /// # Panics
    /// If `in_signature`/`out_signature` is not a valid (possibly empty)
    /// concatenation of complete D-Bus types.
    pub fn new(
        name: Member<'static>,
        in_signature: impl Into<String>,
        out_signature: impl Into<String>,
        handler: impl FnMut(&[Value], &mut D) -> MethodResult + Send + 'static,
    ) -> Self {
        let in_signature = in_signature.into();
        let out_signature = out_signature.into();
        assert!(crate::validate::is_valid_signature_multi(in_signature.as_bytes()), "invalid in_signature");
        assert!(crate::validate::is_valid_signature_multi(out_signature.as_bytes()), "invalid out_signature");
        MethodDescriptor { name, in_signature, out_signature, handler: Box::new(handler), taken: false }
    }

    /// Invokes the handler. Returns `UnknownMethod`-flavored via `Busy`-like
    /// recursion guard if this descriptor is already mid-call.
    pub(crate) fn call(&mut self, args: &[Value], data: &mut D) -> MethodResult {
        if self.taken {
            return Err(MethodErr::new(
                crate::error::names::UNKNOWN_METHOD,
                format!("recursive call to {}", self.name),
            ));
        }
        self.taken = true;
        let r = (self.handler)(args, data);
        self.taken = false;
        r
    }
}

pub struct PropertyDescriptor<D> {
    pub name: Member<'static>,
    pub signature: Signature<'static>,
    pub emits_changed: EmitsChanged,
    get: Option<PropertyGetter<D>>,
    set: Option<PropertySetter<D>>,
}

impl<D> PropertyDescriptor<D> {
    pub fn read_only(
        name: Member<'static>,
        signature: Signature<'static>,
        emits_changed: EmitsChanged,
        get: impl Fn(&D) -> Result<Value, MethodErr> + Send + 'static,
    ) -> Self {
        PropertyDescriptor { name, signature, emits_changed, get: Some(Box::new(get)), set: None }
    }

    pub fn read_write(
        name: Member<'static>,
        signature: Signature<'static>,
        emits_changed: EmitsChanged,
        get: impl Fn(&D) -> Result<Value, MethodErr> + Send + 'static,
        set: impl FnMut(&mut D, Value) -> Result<(), MethodErr> + Send + 'static,
    ) -> Self {
        PropertyDescriptor { name, signature, emits_changed, get: Some(Box::new(get)), set: Some(Box::new(set)) }
    }

    pub fn writable(&self) -> bool { self.set.is_some() }

    pub fn emits_change(&self) -> bool {
        matches!(self.emits_changed, EmitsChanged::True | EmitsChanged::Invalidates)
    }

    pub fn invalidates_only(&self) -> bool { matches!(self.emits_changed, EmitsChanged::Invalidates) }

    pub(crate) fn get(&self, data: &D) -> Result<Value, MethodErr> {
        match &self.get {
            Some(g) => g(data),
            None => Err(MethodErr::new(crate::error::names::PROPERTY_READ_ONLY, "property is write-only")),
        }
    }

    pub(crate) fn set(&mut self, data: &mut D, v: Value) -> Result<(), MethodErr> {
        match &mut self.set {
            Some(s) => s(data, v),
            None => Err(MethodErr::read_only(&self.name)),
        }
    }
}

pub struct SignalDescriptor {
    pub name: Member<'static>,
    pub arg_signatures: Vec<Signature<'static>>,
}

/// One interface's worth of methods, properties and signal descriptors,
/// registered at a path (or, if `is_fallback`, at a path prefix).
pub struct Vtable<D> {
    pub interface: Interface<'static>,
    pub is_fallback: bool,
    pub methods: Vec<MethodDescriptor<D>>,
    pub properties: Vec<PropertyDescriptor<D>>,
    pub signals: Vec<SignalDescriptor>,
}

impl<D> Vtable<D> {
    pub fn new(interface: Interface<'static>, is_fallback: bool) -> Self {
        Vtable { interface, is_fallback, methods: Vec::new(), properties: Vec::new(), signals: Vec::new() }
    }

    pub fn with_method(mut self, m: MethodDescriptor<D>) -> Self { self.methods.push(m); self }
    pub fn with_property(mut self, p: PropertyDescriptor<D>) -> Self { self.properties.push(p); self }
    pub fn with_signal(mut self, s: SignalDescriptor) -> Self { self.signals.push(s); self }

    pub(crate) fn method_mut(&mut self, name: &str) -> Option<&mut MethodDescriptor<D>> {
        self.methods.iter_mut().find(|m| m.name.as_str() == name)
    }

    pub(crate) fn property(&self, name: &str) -> Option<&PropertyDescriptor<D>> {
        self.properties.iter().find(|p| p.name.as_str() == name)
    }

    pub(crate) fn property_mut(&mut self, name: &str) -> Option<&mut PropertyDescriptor<D>> {
        self.properties.iter_mut().find(|p| p.name.as_str() == name)
    }
}
