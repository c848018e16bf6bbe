pub mod backend;
pub mod handshake;
pub mod identity;
pub mod page;
pub mod polling;
pub mod protocol;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;
