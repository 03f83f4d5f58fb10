use crate::error::FetchError;

use super::record::{ResourceId, Snapshot};

/// Supplies the current state of a resource on demand.
///
/// Implementations wrap the provider's REST client. `fetch` may block on
/// network I/O; the monitor runs each watched resource on its own worker so a
/// slow fetch only delays that resource.
pub trait ResourceInspector: Send + Sync {
    /// Fetch a whole, normalized snapshot of `resource_id`.
    fn fetch(&self, resource_id: ResourceId) -> Result<Snapshot, FetchError>;
}

impl<F> ResourceInspector for F
where
    F: Fn(ResourceId) -> Result<Snapshot, FetchError> + Send + Sync,
{
    fn fetch(&self, resource_id: ResourceId) -> Result<Snapshot, FetchError> {
        self(resource_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closures_are_inspectors() {
        let inspector = |id: ResourceId| {
            if id.get() == 0 {
                Err(FetchError::NotFound { resource_id: id })
            } else {
                Ok(Snapshot::new(id).with_state("running", "running"))
            }
        };

        let dynamic: &dyn ResourceInspector = &inspector;
        assert_eq!(dynamic.fetch(ResourceId::new(3)).unwrap().state, "running");
        assert!(dynamic.fetch(ResourceId::new(0)).is_err());
    }
}
