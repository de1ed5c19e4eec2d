//! Write-path services: dispatch, authorization, resolution

mod acl;
mod dispatcher;
mod resolver;

pub use acl::AclResolver;
pub use dispatcher::{ActionService, Context, PostOutcome};
pub use resolver::{NullResolver, PreprintResolver, StaticResolver};
