pub(crate) mod aligned;
pub mod backend;
pub(crate) mod copy;
pub(crate) mod foreign;
pub mod heap;
pub(crate) mod manager;
pub mod pressure;
pub mod scalar;
pub(crate) mod stats;
pub(crate) mod vm;

#[cfg(test)]
crate::sync::static_rwlock! {
    pub static TEST_MUTEX: crate::sync::RwLock<()> = crate::sync::RwLock::new(());
}
