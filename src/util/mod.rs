pub(crate) mod hex;
pub(crate) mod layout;
pub(crate) mod size;
