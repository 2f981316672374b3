//! Scoped container handles.

use h5store_format::{Container, FormatError, Hid};

/// A container handle that is closed when the guard goes out of scope.
///
/// Every handle the engine opens is wrapped in a guard, so early returns
/// through `?` release it as well.
#[derive(Debug)]
pub struct HandleGuard<'c> {
    container: &'c Container,
    hid: Hid,
}

impl<'c> HandleGuard<'c> {
    pub fn new(container: &'c Container, hid: Hid) -> Self {
        HandleGuard { container, hid }
    }

    /// Wrap the result of a handle-issuing call.
    pub fn wrap(container: &'c Container, hid: Result<Hid, FormatError>) -> Result<Self, FormatError> {
        hid.map(|hid| HandleGuard::new(container, hid))
    }

    pub fn hid(&self) -> Hid {
        self.hid
    }

    pub fn container(&self) -> &'c Container {
        self.container
    }
}

impl Drop for HandleGuard<'_> {
    fn drop(&mut self) {
        let _ = self.container.close(self.hid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_closes_on_drop() {
        let c = Container::in_memory();
        {
            let _root = HandleGuard::wrap(&c, c.open_root()).unwrap();
            assert_eq!(c.open_handle_count(), 1);
        }
        assert_eq!(c.open_handle_count(), 0);
    }

    #[test]
    fn guard_closes_on_early_return() {
        fn fails(c: &Container) -> Result<(), FormatError> {
            let root = HandleGuard::wrap(c, c.open_root())?;
            c.open_group(root.hid(), "missing")?;
            Ok(())
        }
        let c = Container::in_memory();
        assert!(fails(&c).is_err());
        assert_eq!(c.open_handle_count(), 0);
    }
}
