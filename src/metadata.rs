pub(crate) mod bencode;
pub(crate) mod file;
pub(crate) mod tracker;
