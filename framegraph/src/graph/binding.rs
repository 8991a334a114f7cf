//! The binding contract between a pass type and the graph.
//!
//! A pass type declares its resource slots with [`pass_slots!`](crate::pass_slots).
//! Every slot becomes a zero-sized marker type, and the pass gets a
//! type-level list of all its markers. [`GraphBuilder::add_operation`]
//! returns a [`Binder`] parameterized by the slots that are still unbound;
//! each [`bind`](Binder::bind) removes one slot from that list, and
//! [`finalize`](Binder::finalize) only exists once the list is empty.
//!
//! Binding a slot twice, binding a slot of another pass type or finalizing
//! with a slot left unbound are therefore compile errors:
//!
//! ```
//! use redlilium_framegraph::backend::DummyBackend;
//! use redlilium_framegraph::graph::{GraphBuilder, PassContext, PassKind, RenderPass};
//! use redlilium_framegraph::types::{TextureDescriptor, TextureFormat, TextureUsage};
//! use redlilium_framegraph::{pass_slots, GraphicsError};
//! use std::sync::Arc;
//!
//! struct Blur;
//!
//! pass_slots!(Blur {
//!     Input: General => ShaderResource,
//!     Output: RenderTarget => RenderTarget,
//! });
//!
//! impl RenderPass for Blur {
//!     const KIND: PassKind = PassKind::Graphics;
//!
//!     fn execute(&mut self, _ctx: &mut PassContext<'_, Self>) -> Result<(), GraphicsError> {
//!         Ok(())
//!     }
//! }
//!
//! let mut graph = GraphBuilder::new(Arc::new(DummyBackend::new()));
//! let desc = TextureDescriptor::new_2d(
//!     64,
//!     64,
//!     TextureFormat::Rgba8Unorm,
//!     TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
//! );
//! let a = graph.create_transient_resource(desc.clone());
//! let b = graph.create_transient_resource(desc);
//!
//! // Slots may be bound in any order.
//! graph
//!     .add_operation("blur", Blur)
//!     .bind(Output, b)
//!     .bind(Input, a)
//!     .finalize();
//! assert_eq!(graph.operation_count(), 1);
//! ```
//!
//! Leaving a slot unbound does not compile:
//!
//! ```compile_fail
//! use redlilium_framegraph::backend::DummyBackend;
//! use redlilium_framegraph::graph::{GraphBuilder, PassContext, PassKind, RenderPass};
//! use redlilium_framegraph::types::{BufferDescriptor, BufferUsage};
//! use redlilium_framegraph::{pass_slots, GraphicsError};
//! use std::sync::Arc;
//!
//! struct Pair;
//!
//! pass_slots!(Pair {
//!     A: General => CopySource,
//!     B: General => CopyDest,
//! });
//!
//! impl RenderPass for Pair {
//!     const KIND: PassKind = PassKind::Transfer;
//!
//!     fn execute(&mut self, _ctx: &mut PassContext<'_, Self>) -> Result<(), GraphicsError> {
//!         Ok(())
//!     }
//! }
//!
//! let mut graph = GraphBuilder::new(Arc::new(DummyBackend::new()));
//! let a = graph.create_transient_resource(BufferDescriptor::new(64, BufferUsage::COPY_SRC));
//! graph.add_operation("pair", Pair).bind(A, a).finalize();
//! ```
//!
//! Neither does binding the same slot twice:
//!
//! ```compile_fail
//! use redlilium_framegraph::backend::DummyBackend;
//! use redlilium_framegraph::graph::{GraphBuilder, PassContext, PassKind, RenderPass};
//! use redlilium_framegraph::types::{BufferDescriptor, BufferUsage};
//! use redlilium_framegraph::{pass_slots, GraphicsError};
//! use std::sync::Arc;
//!
//! struct Pair;
//!
//! pass_slots!(Pair {
//!     A: General => CopySource,
//!     B: General => CopyDest,
//! });
//!
//! impl RenderPass for Pair {
//!     const KIND: PassKind = PassKind::Transfer;
//!
//!     fn execute(&mut self, _ctx: &mut PassContext<'_, Self>) -> Result<(), GraphicsError> {
//!         Ok(())
//!     }
//! }
//!
//! let mut graph = GraphBuilder::new(Arc::new(DummyBackend::new()));
//! let a = graph.create_transient_resource(BufferDescriptor::new(64, BufferUsage::COPY_SRC));
//! graph.add_operation("pair", Pair).bind(A, a).bind(A, a).finalize();
//! ```
//!
//! [`GraphBuilder::add_operation`]: super::GraphBuilder::add_operation

use std::marker::PhantomData;

use crate::error::graph_assert;
use crate::types::ResourceState;

use super::access::AccessCategory;
use super::builder::GraphBuilder;
use super::pass::{OperationHandle, RenderPass};
use super::resource::ResourceHandle;

/// Declaration of one slot: its name, category and desired state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotDescriptor {
    /// Slot name, as written in the declaration.
    pub name: &'static str,
    /// How the resource bound to the slot is used.
    pub category: AccessCategory,
    /// State the resource must be in while the pass runs.
    pub state: ResourceState,
}

impl SlotDescriptor {
    /// Create a slot descriptor.
    pub const fn new(name: &'static str, category: AccessCategory, state: ResourceState) -> Self {
        Self {
            name,
            category,
            state,
        }
    }
}

/// Marker type of one declared slot.
pub trait Slot: Copy {
    /// Pass type declaring the slot.
    type Pass;
    /// Position of the slot in the pass's declaration.
    const INDEX: usize;
}

/// Slot declaration of a pass type. Implemented by [`pass_slots!`](crate::pass_slots).
pub trait PassSlots {
    /// Type-level list of every slot marker.
    type Slots;
    /// Slot table in declaration order.
    const SLOTS: &'static [SlotDescriptor];
}

/// Empty slot list.
#[derive(Debug, Clone, Copy, Default)]
pub struct SlotNil;

/// Slot list with head `H` and tail `T`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SlotCons<H, T>(PhantomData<(H, T)>);

/// Index: the slot is the head of the list.
#[derive(Debug, Clone, Copy, Default)]
pub struct Here;

/// Index: the slot is in the tail at position `I`.
#[derive(Debug, Clone, Copy, Default)]
pub struct There<I>(PhantomData<I>);

/// Removes slot `S`, found at type-level position `I`, from a slot list.
///
/// `I` is always inferred. A list that does not contain `S` implements no
/// `Pluck<S, _>`.
pub trait Pluck<S, I> {
    /// The list without `S`.
    type Remainder;
}

impl<S, T> Pluck<S, Here> for SlotCons<S, T> {
    type Remainder = T;
}

impl<S, H, T, I> Pluck<S, There<I>> for SlotCons<H, T>
where
    T: Pluck<S, I>,
{
    type Remainder = SlotCons<H, T::Remainder>;
}

/// An operation waiting for its slots to be bound.
#[doc(hidden)]
pub struct PendingOperation<P> {
    pub(crate) name: String,
    pub(crate) pass: P,
    pub(crate) bindings: Vec<ResourceHandle>,
}

impl<P: RenderPass> PendingOperation<P> {
    pub(crate) fn new(name: String, pass: P) -> Self {
        Self {
            name,
            pass,
            bindings: vec![ResourceHandle::INVALID; P::SLOTS.len()],
        }
    }
}

/// Binds the slots of one operation.
///
/// `Remaining` is the type-level list of unbound slots. The operation is only
/// added to the graph by [`finalize`](Binder::finalize); dropping a binder
/// leaves the graph unchanged.
#[must_use = "the operation is only added to the graph by `finalize()`"]
pub struct Binder<'g, P: RenderPass, Remaining> {
    builder: &'g mut GraphBuilder,
    pending: PendingOperation<P>,
    _remaining: PhantomData<Remaining>,
}

impl<'g, P: RenderPass, Remaining> Binder<'g, P, Remaining> {
    /// Bind `resource` to `slot`.
    pub fn bind<S, I>(
        mut self,
        _slot: S,
        resource: ResourceHandle,
    ) -> Binder<'g, P, <Remaining as Pluck<S, I>>::Remainder>
    where
        S: Slot<Pass = P>,
        Remaining: Pluck<S, I>,
    {
        graph_assert!(
            resource.index() < self.builder.resource_count(),
            "operation '{}' binds slot {} to resource {} but only {} resources exist",
            self.pending.name,
            P::SLOTS[S::INDEX].name,
            resource.index(),
            self.builder.resource_count()
        );
        self.pending.bindings[S::INDEX] = resource;
        Binder {
            builder: self.builder,
            pending: self.pending,
            _remaining: PhantomData,
        }
    }
}

impl<'g, P: RenderPass> Binder<'g, P, SlotNil> {
    /// Add the operation to the graph.
    pub fn finalize(self) -> OperationHandle {
        self.builder.push_operation(self.pending)
    }
}

/// What [`GraphBuilder::add_operation`](super::GraphBuilder::add_operation)
/// returns for a slot list: a [`Binder`] when slots are declared, the
/// finished [`OperationHandle`] otherwise.
pub trait IntoBinder<'g, P: RenderPass> {
    /// Binder or handle.
    type Output;

    #[doc(hidden)]
    fn into_binder(builder: &'g mut GraphBuilder, pending: PendingOperation<P>) -> Self::Output;
}

impl<'g, P: RenderPass> IntoBinder<'g, P> for SlotNil {
    type Output = OperationHandle;

    fn into_binder(builder: &'g mut GraphBuilder, pending: PendingOperation<P>) -> Self::Output {
        builder.push_operation(pending)
    }
}

impl<'g, P: RenderPass, H, T> IntoBinder<'g, P> for SlotCons<H, T> {
    type Output = Binder<'g, P, SlotCons<H, T>>;

    fn into_binder(builder: &'g mut GraphBuilder, pending: PendingOperation<P>) -> Self::Output {
        Binder {
            builder,
            pending,
            _remaining: PhantomData,
        }
    }
}

/// Type-level list of slot markers.
///
/// `slot_list![A, B]` is `SlotCons<A, SlotCons<B, SlotNil>>`.
#[macro_export]
macro_rules! slot_list {
    () => { $crate::graph::SlotNil };
    ($head:ty $(, $tail:ty)* $(,)?) => {
        $crate::graph::SlotCons<$head, $crate::slot_list!($($tail),*)>
    };
}

/// Declare the resource slots of a pass type.
///
/// Each entry is `Name: Category => State`, where `Category` is an
/// [`AccessCategory`](crate::graph::AccessCategory) variant and `State` a
/// [`ResourceState`](crate::types::ResourceState) variant. One unit struct
/// per slot is generated next to the invocation, with the given visibility.
///
/// ```
/// use redlilium_framegraph::graph::{PassSlots, Slot};
/// use redlilium_framegraph::pass_slots;
///
/// pub struct Tonemap;
///
/// pass_slots!(Tonemap {
///     /// HDR input.
///     pub HdrInput: General => ShaderResource,
///     pub LdrOutput: RenderTarget => RenderTarget,
/// });
///
/// assert_eq!(Tonemap::SLOTS.len(), 2);
/// assert_eq!(Tonemap::SLOTS[1].name, "LdrOutput");
/// assert_eq!(<LdrOutput as Slot>::INDEX, 1);
/// ```
#[macro_export]
macro_rules! pass_slots {
    (@index $pass:ty; $n:expr;) => {};
    (@index $pass:ty; $n:expr; $slot:ident $($rest:ident)*) => {
        impl $crate::graph::Slot for $slot {
            type Pass = $pass;
            const INDEX: usize = $n;
        }
        $crate::pass_slots!(@index $pass; $n + 1; $($rest)*);
    };
    ($pass:ty {
        $(
            $(#[$meta:meta])*
            $vis:vis $slot:ident : $category:ident => $state:ident
        ),* $(,)?
    }) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
            $vis struct $slot;
        )*

        $crate::pass_slots!(@index $pass; 0; $($slot)*);

        impl $crate::graph::PassSlots for $pass {
            type Slots = $crate::slot_list![$($slot),*];
            const SLOTS: &'static [$crate::graph::SlotDescriptor] = &[
                $(
                    $crate::graph::SlotDescriptor::new(
                        stringify!($slot),
                        $crate::graph::AccessCategory::$category,
                        $crate::types::ResourceState::$state,
                    ),
                )*
            ];
        }
    };
}
