//! Transactional resource handle
//!
//! A [`ResourceHandle`] is owned by the caller and lent to a chain for one
//! `invoke`. Invokers never keep it past the call.

use crate::error::ResourceError;
use async_trait::async_trait;

/// External transactional resource, typically a database connection
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResourceHandle: Send {
    /// Current auto-commit mode
    async fn auto_commit(&mut self) -> Result<bool, ResourceError>;

    /// Switch auto-commit mode
    async fn set_auto_commit(&mut self, enabled: bool) -> Result<(), ResourceError>;

    /// Commit pending work
    async fn commit(&mut self) -> Result<(), ResourceError>;

    /// Discard pending work
    async fn rollback(&mut self) -> Result<(), ResourceError>;
}

/// Reborrow an optional handle for a single nested call
///
/// Lets a layer hand the same handle to its delegate more than once.
pub fn reborrow<'s>(
    handle: &'s mut Option<&mut dyn ResourceHandle>,
) -> Option<&'s mut dyn ResourceHandle> {
    match handle {
        Some(handle) => {
            let handle: &mut dyn ResourceHandle = &mut **handle;
            Some(handle)
        }
        None => None,
    }
}
