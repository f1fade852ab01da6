//! Component 2: Handler Metadata (spec §3/§4, `HandlerMetadata`).
//!
//! An immutable record per handler method: arity, declared parameter
//! types, the `acceptsSubtypes`/`acceptsVarArgs` flags, and a type-erased
//! invoker. Built by the small family of `handlerN`/`handlerN_poly`/
//! `handler_vararg` constructors that a [`crate::Listener::handlers`]
//! implementation calls.
//!
//! Two families exist for arity 1-3 because Rust has no reference
//! covariance between unrelated concrete types (spec §0): a handler
//! invoked only on an exact publication of its declared type can be
//! handed a concrete `&T` (`handler1`/`handler2`/`handler3`,
//! `acceptsSubtypes` fixed to `false`), but a handler that also matches
//! subtype publications cannot know in advance which subtype it will
//! receive, so it is handed the type-erased `&dyn Message`
//! (`handler1_poly`/`handler2_poly`/`handler3_poly`, `acceptsSubtypes`
//! fixed to `true`). `handler_vararg` does not need the split: its
//! argument is always the uniform array representation
//! (`error::SharedMessage`'s `Vec<SharedMessage>` impl) regardless of
//! `acceptsSubtypes`.

use std::any::{Any, TypeId};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::error::SharedMessage;
use crate::types::Message;

/// Declared arity of a handler method (spec §3: `arity: 1|2|3|N`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    One,
    Two,
    Three,
    /// A handler declared over `T[]` — used both for varargs
    /// (`acceptsVarArgs = true`) and for direct array-typed publishes.
    Variadic,
}

type Invoker = Arc<dyn Fn(&(dyn Any + Send + Sync), &[SharedMessage]) + Send + Sync>;

/// Immutable per-(listener-class, handler-method) metadata.
#[derive(Clone)]
pub struct HandlerMetadata {
    pub(crate) arity: Arity,
    /// Declared parameter types. For `Arity::Variadic` this holds the
    /// array's *element* type, not a distinct array type — see
    /// `types::Kind` for how scalar and array buckets stay distinct.
    pub(crate) param_types: Vec<TypeId>,
    pub(crate) param_type_names: Vec<&'static str>,
    pub(crate) accepts_subtypes: bool,
    pub(crate) accepts_var_args: bool,
    invoke: Invoker,
}

impl HandlerMetadata {
    pub fn arity(&self) -> Arity {
        self.arity
    }

    pub fn param_types(&self) -> &[TypeId] {
        &self.param_types
    }

    pub fn accepts_subtypes(&self) -> bool {
        self.accepts_subtypes
    }

    pub fn accepts_var_args(&self) -> bool {
        self.accepts_var_args
    }

    /// Apply the handler to a listener instance and an argument tuple.
    /// Handler panics are caught and converted into a `Err` describing
    /// the failure; this is what lets [`crate::subscription::Subscription::publish`]
    /// continue iterating the remaining listeners (spec §7).
    pub(crate) fn invoke(
        &self,
        listener: &(dyn Any + Send + Sync),
        args: &[SharedMessage],
    ) -> Result<(), Box<dyn Any + Send>> {
        panic::catch_unwind(AssertUnwindSafe(|| (self.invoke)(listener, args)))
    }
}

fn downcast_listener<'a, L: Any>(listener: &'a (dyn Any + Send + Sync)) -> &'a L {
    listener
        .downcast_ref::<L>()
        .expect("bus-core: listener type mismatch — subscription built for the wrong type")
}

/// Downcast an exact-bucket argument. Only reachable from an invoker
/// built by a non-`_poly` constructor, which is only ever invoked via
/// `subscriptions_exact*`/`vararg_exact` — the runtime type is therefore
/// always exactly `T`, so this never fails in practice.
fn downcast_arg<'a, T: Any>(arg: &'a SharedMessage) -> &'a T {
    arg.as_any()
        .downcast_ref::<T>()
        .expect("bus-core: exact-bucket handler invoked with a mismatched runtime type (dispatch bug)")
}

/// Build metadata for a single-argument handler `fn(&L, &T)`, matching
/// only an exact publication of `T` (spec's `acceptsSubtypes = false`).
pub fn handler1<L, T, F>(f: F) -> HandlerMetadata
where
    L: Any + Send + Sync + 'static,
    T: Message,
    F: Fn(&L, &T) + Send + Sync + 'static,
{
    HandlerMetadata {
        arity: Arity::One,
        param_types: vec![TypeId::of::<T>()],
        param_type_names: vec![std::any::type_name::<T>()],
        accepts_subtypes: false,
        accepts_var_args: false,
        invoke: Arc::new(move |listener, args| {
            f(downcast_listener::<L>(listener), downcast_arg::<T>(&args[0]))
        }),
    }
}

/// Single-argument handler declared over `T` with `acceptsSubtypes =
/// true`: also matches a publication of any subtype of `T`. Since the
/// runtime value may not actually be a `T`, the handler receives the
/// type-erased `&dyn Message` rather than `&T`.
pub fn handler1_poly<L, T, F>(f: F) -> HandlerMetadata
where
    L: Any + Send + Sync + 'static,
    T: Message,
    F: Fn(&L, &dyn Message) + Send + Sync + 'static,
{
    HandlerMetadata {
        arity: Arity::One,
        param_types: vec![TypeId::of::<T>()],
        param_type_names: vec![std::any::type_name::<T>()],
        accepts_subtypes: true,
        accepts_var_args: false,
        invoke: Arc::new(move |listener, args| f(downcast_listener::<L>(listener), args[0].as_ref())),
    }
}

/// Build metadata for a two-argument handler `fn(&L, &A, &B)`, exact match only.
pub fn handler2<L, A, B, F>(f: F) -> HandlerMetadata
where
    L: Any + Send + Sync + 'static,
    A: Message,
    B: Message,
    F: Fn(&L, &A, &B) + Send + Sync + 'static,
{
    HandlerMetadata {
        arity: Arity::Two,
        param_types: vec![TypeId::of::<A>(), TypeId::of::<B>()],
        param_type_names: vec![std::any::type_name::<A>(), std::any::type_name::<B>()],
        accepts_subtypes: false,
        accepts_var_args: false,
        invoke: Arc::new(move |listener, args| {
            f(downcast_listener::<L>(listener), downcast_arg::<A>(&args[0]), downcast_arg::<B>(&args[1]))
        }),
    }
}

/// Two-argument handler, `acceptsSubtypes = true`: each position is
/// delivered type-erased since either may be a subtype of its declared type.
pub fn handler2_poly<L, A, B, F>(f: F) -> HandlerMetadata
where
    L: Any + Send + Sync + 'static,
    A: Message,
    B: Message,
    F: Fn(&L, &dyn Message, &dyn Message) + Send + Sync + 'static,
{
    HandlerMetadata {
        arity: Arity::Two,
        param_types: vec![TypeId::of::<A>(), TypeId::of::<B>()],
        param_type_names: vec![std::any::type_name::<A>(), std::any::type_name::<B>()],
        accepts_subtypes: true,
        accepts_var_args: false,
        invoke: Arc::new(move |listener, args| {
            f(downcast_listener::<L>(listener), args[0].as_ref(), args[1].as_ref())
        }),
    }
}

/// Build metadata for a three-argument handler `fn(&L, &A, &B, &C)`, exact match only.
pub fn handler3<L, A, B, C, F>(f: F) -> HandlerMetadata
where
    L: Any + Send + Sync + 'static,
    A: Message,
    B: Message,
    C: Message,
    F: Fn(&L, &A, &B, &C) + Send + Sync + 'static,
{
    HandlerMetadata {
        arity: Arity::Three,
        param_types: vec![TypeId::of::<A>(), TypeId::of::<B>(), TypeId::of::<C>()],
        param_type_names: vec![
            std::any::type_name::<A>(),
            std::any::type_name::<B>(),
            std::any::type_name::<C>(),
        ],
        accepts_subtypes: false,
        accepts_var_args: false,
        invoke: Arc::new(move |listener, args| {
            f(
                downcast_listener::<L>(listener),
                downcast_arg::<A>(&args[0]),
                downcast_arg::<B>(&args[1]),
                downcast_arg::<C>(&args[2]),
            )
        }),
    }
}

/// Three-argument handler, `acceptsSubtypes = true`.
pub fn handler3_poly<L, A, B, C, F>(f: F) -> HandlerMetadata
where
    L: Any + Send + Sync + 'static,
    A: Message,
    B: Message,
    C: Message,
    F: Fn(&L, &dyn Message, &dyn Message, &dyn Message) + Send + Sync + 'static,
{
    HandlerMetadata {
        arity: Arity::Three,
        param_types: vec![TypeId::of::<A>(), TypeId::of::<B>(), TypeId::of::<C>()],
        param_type_names: vec![
            std::any::type_name::<A>(),
            std::any::type_name::<B>(),
            std::any::type_name::<C>(),
        ],
        accepts_subtypes: true,
        accepts_var_args: false,
        invoke: Arc::new(move |listener, args| {
            f(downcast_listener::<L>(listener), args[0].as_ref(), args[1].as_ref(), args[2].as_ref())
        }),
    }
}

/// Build metadata for a handler declared over `T[]` (`acceptsVarArgs =
/// true`). `accepts_subtypes` controls whether the handler also matches
/// arrays of a subtype element (spec's `varArgSuper`); either way the
/// handler receives the uniform type-erased element slice, since a
/// matched array's elements may be subtypes of the declared `T`.
pub fn handler_vararg<L, T, F>(accepts_subtypes: bool, f: F) -> HandlerMetadata
where
    L: Any + Send + Sync + 'static,
    T: Message,
    F: Fn(&L, &[SharedMessage]) + Send + Sync + 'static,
{
    HandlerMetadata {
        arity: Arity::Variadic,
        param_types: vec![TypeId::of::<T>()],
        param_type_names: vec![std::any::type_name::<T>()],
        accepts_subtypes,
        accepts_var_args: true,
        invoke: Arc::new(move |listener, args| {
            let items = args[0]
                .as_any()
                .downcast_ref::<Vec<SharedMessage>>()
                .expect("bus-core: vararg handler invoked with a non-array argument (dispatch bug)");
            f(downcast_listener::<L>(listener), items.as_slice());
        }),
    }
}
