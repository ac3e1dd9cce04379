//! Object, internal, class and property flag sets

use bitflags::bitflags;

bitflags! {
    /// Lifecycle and visibility flags stored on every object
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EObjectFlags: u32 {
        /// Visible outside its package
        const PUBLIC = 0x0000_0001;
        /// Kept even if unreferenced
        const STANDALONE = 0x0000_0002;
        /// Native object, only valid during construction
        const MARK_AS_NATIVE = 0x0000_0004;
        /// Supports undo/redo
        const TRANSACTIONAL = 0x0000_0008;
        /// Default instance of a class
        const CLASS_DEFAULT_OBJECT = 0x0000_0010;
        /// Template for another object
        const ARCHETYPE_OBJECT = 0x0000_0020;
        /// Never saved
        const TRANSIENT = 0x0000_0040;
        /// Added to the root set at construction
        const MARK_AS_ROOT_SET = 0x0000_0080;
        /// Temporary garbage tag
        const TAG_GARBAGE_TEMP = 0x0000_0100;
        /// Constructed but not yet initialized
        const NEED_INITIALIZATION = 0x0000_0200;
        /// Needs loading
        const NEED_LOAD = 0x0000_0400;
        /// Needs post-load
        const NEED_POST_LOAD = 0x0000_1000;
        /// Destruction has begun
        const BEGIN_DESTROYED = 0x0000_8000;
        /// Destruction has finished
        const FINISH_DESTROYED = 0x0001_0000;
        /// Default subobject of a class default object
        const DEFAULT_SUB_OBJECT = 0x0004_0000;
        /// Loaded from storage
        const WAS_LOADED = 0x0008_0000;
        /// Mirror of the internal garbage flag
        const MIRRORED_GARBAGE = 0x4000_0000;
    }
}

bitflags! {
    /// Flags owned by the object table rather than the object itself
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EInternalObjectFlags: u32 {
        /// Marked for destruction
        const GARBAGE = 1 << 21;
        /// Construction has not finished
        const PENDING_CONSTRUCTION = 1 << 22;
        /// Reachable through a cluster
        const REACHABLE_IN_CLUSTER = 1 << 23;
        /// Root of a cluster
        const CLUSTER_ROOT = 1 << 24;
        /// Native object
        const NATIVE = 1 << 25;
        /// Created on an async thread
        const ASYNC = 1 << 26;
        /// Being loaded asynchronously
        const ASYNC_LOADING = 1 << 27;
        /// Unreachable from the root set
        const UNREACHABLE = 1 << 28;
        /// Pending kill
        const PENDING_KILL = 1 << 29;
        /// Never collected
        const ROOT_SET = 1 << 30;
    }
}

bitflags! {
    /// Flags describing a class
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EClassFlags: u32 {
        /// Cannot be instantiated
        const ABSTRACT = 0x0000_0001;
        /// Loads default config
        const DEFAULT_CONFIG = 0x0000_0002;
        /// Config-driven
        const CONFIG = 0x0000_0004;
        /// Instances are never saved
        const TRANSIENT = 0x0000_0008;
        /// Compiled-in class
        const NATIVE = 0x0000_0080;
        /// Not exported to headers
        const NO_EXPORT = 0x0000_0100;
        /// Registration finished
        const CONSTRUCTED = 0x0000_8000;
        /// Generated from a script asset
        const COMPILED_FROM_BLUEPRINT = 0x0004_0000;
        /// Deprecated class
        const DEPRECATED = 0x0200_0000;
        /// Intrinsic class, bootstrapped by the core
        const INTRINSIC = 0x1000_0000;
    }
}

bitflags! {
    /// Flags describing a property
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EPropertyFlags: u64 {
        /// Editable in the editor
        const EDIT = 0x0000_0000_0000_0001;
        /// Const parameter
        const CONST_PARM = 0x0000_0000_0000_0002;
        /// Visible to scripts
        const BLUEPRINT_VISIBLE = 0x0000_0000_0000_0004;
        /// Replicated
        const NET = 0x0000_0000_0000_0020;
        /// Not saved
        const TRANSIENT = 0x0000_0000_0000_2000;
        /// Loaded from config
        const CONFIG = 0x0000_0000_0000_4000;
        /// Plain old data, zero-initialized is valid
        const ZERO_CONSTRUCTOR = 0x0000_0000_0000_0200;
        /// No destructor needed
        const NO_DESTRUCTOR = 0x0000_0000_0010_0000;
        /// Declared in native code
        const NATIVE = 0x0000_0000_0000_0800;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_any_flags_with_empty_mask_is_false() {
        let flags = EObjectFlags::PUBLIC | EObjectFlags::TRANSIENT;
        assert!(!flags.intersects(EObjectFlags::empty()));
        assert!(flags.intersects(EObjectFlags::PUBLIC | EObjectFlags::STANDALONE));
        assert!(!flags.intersects(EObjectFlags::STANDALONE));
    }

    #[test]
    fn test_internal_flags_are_disjoint_bits() {
        let all = EInternalObjectFlags::all();
        assert_eq!(all.bits().count_ones(), 10);
        assert!(all.contains(EInternalObjectFlags::ROOT_SET | EInternalObjectFlags::GARBAGE));
    }
}
