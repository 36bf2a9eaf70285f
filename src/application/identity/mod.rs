pub mod resolver;

pub use resolver::{
    ConfiguredIdentity, IdentitySource, MetadataIdentity, Resolution, ResourceIdentityResolver,
};
