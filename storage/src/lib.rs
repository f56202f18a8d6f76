pub mod artifact;
pub mod pool;
pub mod repo;
pub mod wal;

pub use artifact::{ArtifactError, ArtifactKey, ContactStore, FsContactStore, InMemoryContactStore};
pub use pool::{PoolError, PooledConnection, StorePool};
pub use repo::{
    InteractionDraft, InteractionPair, Mutation, NewProtein, RepoError, Repository, Tables,
    ValidationRequest,
};
