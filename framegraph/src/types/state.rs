//! GPU-visible resource states.

/// State a resource must be in for a given kind of access.
///
/// The execution engine tracks the current state of every resource and
/// emits a transition whenever an access desires a different one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResourceState {
    /// Default state every resource can be created in; contents may be undefined.
    #[default]
    Common,
    /// Written as a color attachment.
    RenderTarget,
    /// Written as a depth/stencil attachment.
    DepthWrite,
    /// Read-only depth testing or sampling of a depth texture.
    DepthRead,
    /// Read by shaders.
    ShaderResource,
    /// Read and written by shaders in arbitrary order.
    UnorderedAccess,
    /// Source of a copy.
    CopySource,
    /// Destination of a copy.
    CopyDest,
    /// Ready for presentation.
    Present,
}

impl ResourceState {
    /// Returns true if accesses in this state may race with each other and
    /// need a hazard barrier between dependent operations.
    pub fn is_read_modify_write(self) -> bool {
        matches!(self, Self::UnorderedAccess)
    }

    /// Returns true if the state allows GPU writes.
    pub fn is_write(self) -> bool {
        matches!(
            self,
            Self::RenderTarget | Self::DepthWrite | Self::UnorderedAccess | Self::CopyDest
        )
    }

    /// Returns true for depth attachment states.
    pub fn is_depth(self) -> bool {
        matches!(self, Self::DepthWrite | Self::DepthRead)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_modify_write() {
        assert!(ResourceState::UnorderedAccess.is_read_modify_write());
        assert!(!ResourceState::RenderTarget.is_read_modify_write());
        assert!(!ResourceState::Common.is_read_modify_write());
    }

    #[test]
    fn test_write_states() {
        assert!(ResourceState::CopyDest.is_write());
        assert!(ResourceState::DepthWrite.is_write());
        assert!(!ResourceState::DepthRead.is_write());
        assert!(!ResourceState::Present.is_write());
    }
}
