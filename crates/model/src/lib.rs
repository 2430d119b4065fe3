pub mod collection;
pub mod connection;
pub mod errors;
pub mod filter;
pub mod model;
pub mod operation;
pub mod pending;
pub mod schema;

pub use collection::{
    id_filter, Collection, DeleteResult, MemoryCollection, MemoryDatabase, ReturnDocument,
    UpdateResult,
};
pub use connection::{model_token, Connection, SchemaPlugin};
pub use errors::ModelError;
pub use model::Model;
pub use operation::{HookKind, HookScope, Operation};
pub use pending::{PendingOperation, UpdatePayload};
pub use schema::{PreHook, Schema};
