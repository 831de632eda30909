// Entity Models
// Stores have a stable identity (store_id) that never changes; names and
// addresses are values used to find that identity.
//
// - store: canonical registry + automatic normalized-key index
// - alias: hand-curated overrides consulted first

pub mod alias;
pub mod store;

pub use alias::{AliasEntry, AliasTable};
pub use store::{StoreEntry, StoreIndex, StoreRegistry};
