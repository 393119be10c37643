// ============================================================================
// spark-observe - Constants
// Lifecycle flags, component state bits and hook capability bits
// ============================================================================

// =============================================================================
// LIFECYCLE FLAGS
// =============================================================================
//
// Flags travel with every bind/attach/flush call and every change notification.
// They describe where a call originated and how far it is allowed to propagate.
// =============================================================================

/// No flags
pub const NONE: u32 = 0;

/// Call originates from a bind batch
pub const FROM_BIND: u32 = 1 << 0;

/// Call originates from an unbind batch
pub const FROM_UNBIND: u32 = 1 << 1;

/// Call originates from an attach batch
pub const FROM_ATTACH: u32 = 1 << 2;

/// Call originates from a detach batch
pub const FROM_DETACH: u32 = 1 << 3;

/// Call originates from a flush queue drain
pub const FROM_FLUSH: u32 = 1 << 4;

/// Flush is being processed synchronously at a batch boundary
pub const FROM_SYNC_FLUSH: u32 = 1 << 5;

/// Call originates from a dirty-check tick
pub const FROM_TICK: u32 = 1 << 6;

/// Call originates from the initial start of an application root
pub const FROM_START_TASK: u32 = 1 << 7;

/// Propagate the source value to the binding target
pub const UPDATE_TARGET_INSTANCE: u32 = 1 << 8;

/// Propagate the target value back to the source expression
pub const UPDATE_SOURCE_EXPRESSION: u32 = 1 << 9;

/// Force expression evaluation even where a cached value could be reused
pub const MUST_EVALUATE: u32 = 1 << 10;

/// Changes must not reach the render target (view is being torn down)
pub const DO_NOT_UPDATE_DOM: u32 = 1 << 11;

/// An ancestor already queued its unmount, children must not queue their own
pub const PARENT_UNMOUNT_QUEUED: u32 = 1 << 12;

/// Notification caused by a structural collection mutation
pub const IS_COLLECTION_MUTATION: u32 = 1 << 13;

/// Observe through interception wrappers instead of replacement accessors
pub const PROXY_STRATEGY: u32 = 1 << 14;

/// Allow one scope lookup hop across an encapsulation boundary
pub const ALLOW_PARENT_SCOPE_TRAVERSAL: u32 = 1 << 15;

/// Flags captured at bind time and carried by every later update of a binding
/// or observer.
pub const PERSISTENT_BINDING_FLAGS: u32 = PROXY_STRATEGY | ALLOW_PARENT_SCOPE_TRAVERSAL;

// =============================================================================
// STATE FLAGS
// =============================================================================

/// Bind is in progress
pub const IS_BINDING: u32 = 1 << 0;

/// Bound to a scope
pub const IS_BOUND: u32 = 1 << 1;

/// Attach is in progress
pub const IS_ATTACHING: u32 = 1 << 2;

/// Attached
pub const IS_ATTACHED: u32 = 1 << 3;

/// Detach is in progress
pub const IS_DETACHING: u32 = 1 << 4;

/// Unbind is in progress
pub const IS_UNBINDING: u32 = 1 << 5;

/// Sitting in a view factory cache
pub const IS_CACHED: u32 = 1 << 6;

/// Nodes are inserted into the render target
pub const IS_MOUNTED: u32 = 1 << 7;

// =============================================================================
// HOOK CAPABILITIES
// =============================================================================
//
// Lifecycle nodes declare up front which queue callbacks they implement.
// Enqueueing a node for a hook it does not declare is a no-op.
// =============================================================================

pub const HOOK_CONNECT: u32 = 1 << 0;
pub const HOOK_PATCH: u32 = 1 << 1;
pub const HOOK_BOUND: u32 = 1 << 2;
pub const HOOK_MOUNT: u32 = 1 << 3;
pub const HOOK_ATTACHED: u32 = 1 << 4;
pub const HOOK_UNMOUNT: u32 = 1 << 5;
pub const HOOK_DETACHED: u32 = 1 << 6;
pub const HOOK_UNBOUND: u32 = 1 << 7;
pub const HOOK_UNBIND_AFTER_DETACH: u32 = 1 << 8;

/// Every hook
pub const HOOK_ALL: u32 = HOOK_CONNECT
    | HOOK_PATCH
    | HOOK_BOUND
    | HOOK_MOUNT
    | HOOK_ATTACHED
    | HOOK_UNMOUNT
    | HOOK_DETACHED
    | HOOK_UNBOUND
    | HOOK_UNBIND_AFTER_DETACH;

// =============================================================================
// TESTS
// =============================================================================
