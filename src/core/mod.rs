pub(crate) mod block;
pub(crate) mod marks;
pub(crate) mod raw;
pub(crate) mod registry;
