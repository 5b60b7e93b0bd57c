//! Table-driven binding of compositor globals.
//!
//! The compositor advertises every global it offers through the registry.
//! gridpoint describes the globals it cares about in a static table of
//! [`Descriptor`]s and lets a [`CapabilityBinder`] match advertisements
//! against it:
//!
//! * unknown interfaces are ignored, so newer compositors do not break us;
//! * [`Binding::Singleton`] entries are bound once, duplicates are ignored;
//! * [`Binding::Multi`] entries are bound for every advertisement and handed
//!   to a registration callback (one per output, one per seat, …).
//!
//! The table is searched with a binary search, so it **must** be sorted by
//! interface name.  [`CapabilityBinder::new`] refuses a table that is not.
//!
//! # Lifecycle
//!
//! ```text
//! Init ──complete_discovery──▶ Discovered ──complete_metadata──▶ Ready
//! ```
//!
//! `complete_discovery` runs after the first roundtrip.  It checks that
//! every required singleton is bound and then asks the context to attach
//! per-instance metadata that had to wait for those singletons (xdg-output
//! objects for outputs seen during `Init`).  `complete_metadata` runs after
//! the second roundtrip, once that metadata has arrived.

use log::{debug, trace};
use std::fmt;

/// Where the binding handshake currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Lifecycle {
    /// Globals are still being discovered; singletons may be missing.
    Init,
    /// All required singletons are bound; metadata is being resolved.
    Discovered,
    /// Metadata for every known instance has arrived.
    Ready,
}

impl Lifecycle {
    /// Whether a newly discovered instance can attach its metadata right
    /// away instead of waiting for the `Discovered` transition.
    pub fn attaches_immediately(self) -> bool {
        self != Lifecycle::Init
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lifecycle::Init => write!(f, "init"),
            Lifecycle::Discovered => write!(f, "discovered"),
            Lifecycle::Ready => write!(f, "ready"),
        }
    }
}

/// A global as advertised by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertised {
    /// Numeric registry name.
    pub id: u32,
    /// Interface name, e.g. `"wl_output"`.
    pub interface: String,
    /// Highest version the compositor supports.
    pub version: u32,
}

/// What a binding callback needs to bind a global.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grant {
    /// Numeric registry name.
    pub id: u32,
    /// Negotiated version: the lower of the advertised and supported one.
    pub version: u32,
}

/// How a table entry is bound.
pub enum Binding<C> {
    /// At most one instance, stored in the context.
    Singleton {
        /// Startup fails if this is still unbound after discovery.
        required: bool,
        /// Whether the context already holds an instance.
        is_bound: fn(&C) -> bool,
        /// Bind and store the instance.
        bind: fn(&mut C, Grant),
    },
    /// Any number of instances; the callback binds and registers each one.
    Multi(fn(&mut C, Grant)),
}

/// One entry of the capability table.
pub struct Descriptor<C> {
    /// Interface name, the sort key of the table.
    pub name: &'static str,
    /// Highest version we know how to speak.
    pub version: u32,
    pub binding: Binding<C>,
}

/// The context a [`CapabilityBinder`] binds into.
pub trait BindingContext {
    fn lifecycle(&self) -> Lifecycle;

    fn set_lifecycle(&mut self, lifecycle: Lifecycle);

    /// Attach metadata to every known instance that does not have it yet.
    ///
    /// Called once, on entry to [`Lifecycle::Discovered`].
    fn attach_pending_metadata(&mut self);
}

/// Errors from the binding handshake.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CapabilityError {
    /// A required singleton was not advertised by the compositor.
    #[error("required interface unsupported by compositor: {0}")]
    Missing(&'static str),

    /// The table is not strictly sorted by name.
    #[error("capability table out of order: {before:?} must sort before {after:?}")]
    Unsorted {
        before: &'static str,
        after: &'static str,
    },

    /// A lifecycle transition was attempted from the wrong state.
    #[error("cannot move to {to} from {from}")]
    Lifecycle { from: Lifecycle, to: Lifecycle },
}

/// Matches registry advertisements against a sorted descriptor table.
pub struct CapabilityBinder<C: 'static> {
    table: &'static [Descriptor<C>],
}

impl<C: 'static> Clone for CapabilityBinder<C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C: 'static> Copy for CapabilityBinder<C> {}

impl<C: BindingContext + 'static> CapabilityBinder<C> {
    /// Wrap `table`, checking that it is strictly sorted by name.
    pub fn new(table: &'static [Descriptor<C>]) -> Result<Self, CapabilityError> {
        for pair in table.windows(2) {
            if pair[0].name >= pair[1].name {
                return Err(CapabilityError::Unsorted {
                    before: pair[1].name,
                    after: pair[0].name,
                });
            }
        }
        Ok(Self { table })
    }

    pub fn table(&self) -> &'static [Descriptor<C>] {
        self.table
    }

    /// Look up the descriptor for `interface`.
    pub fn find(&self, interface: &str) -> Option<&'static Descriptor<C>> {
        let table = self.table;
        table
            .binary_search_by(|d| d.name.cmp(interface))
            .ok()
            .map(|i| &table[i])
    }

    /// Handle one registry advertisement.
    pub fn bind(&self, ctx: &mut C, global: &Advertised) {
        let Some(descriptor) = self.find(&global.interface) else {
            trace!("ignoring {} v{}", global.interface, global.version);
            return;
        };
        let grant = Grant {
            id: global.id,
            version: global.version.min(descriptor.version),
        };
        match descriptor.binding {
            Binding::Singleton { is_bound, bind, .. } => {
                if is_bound(ctx) {
                    debug!("{} advertised twice, keeping the first", descriptor.name);
                    return;
                }
                debug!("binding {} v{}", descriptor.name, grant.version);
                bind(ctx, grant);
            }
            Binding::Multi(register) => {
                debug!("binding {} #{} v{}", descriptor.name, grant.id, grant.version);
                register(ctx, grant);
            }
        }
    }

    /// First barrier passed: `Init -> Discovered`.
    ///
    /// Fails with the first required singleton (in table order) that is
    /// still unbound.  On success the context attaches deferred metadata.
    pub fn complete_discovery(&self, ctx: &mut C) -> Result<(), CapabilityError> {
        expect_lifecycle(ctx, Lifecycle::Init, Lifecycle::Discovered)?;
        if let Some(missing) = self.missing(ctx).next() {
            return Err(CapabilityError::Missing(missing));
        }
        ctx.set_lifecycle(Lifecycle::Discovered);
        ctx.attach_pending_metadata();
        Ok(())
    }

    /// Second barrier passed: `Discovered -> Ready`.
    pub fn complete_metadata(&self, ctx: &mut C) -> Result<(), CapabilityError> {
        expect_lifecycle(ctx, Lifecycle::Discovered, Lifecycle::Ready)?;
        ctx.set_lifecycle(Lifecycle::Ready);
        Ok(())
    }

    /// Names of required singletons `ctx` has not bound, in table order.
    pub fn missing<'a>(&'a self, ctx: &'a C) -> impl Iterator<Item = &'static str> + 'a {
        self.table.iter().filter_map(move |d| match d.binding {
            Binding::Singleton {
                required: true,
                is_bound,
                ..
            } if !is_bound(ctx) => Some(d.name),
            _ => None,
        })
    }
}

fn expect_lifecycle<C: BindingContext>(
    ctx: &C,
    from: Lifecycle,
    to: Lifecycle,
) -> Result<(), CapabilityError> {
    if ctx.lifecycle() == from {
        Ok(())
    } else {
        Err(CapabilityError::Lifecycle {
            from: ctx.lifecycle(),
            to,
        })
    }
}
