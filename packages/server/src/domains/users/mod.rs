pub mod models;

pub use models::user::{
    AuthProvider, NewUser, PostgresUserStore, ProfileFields, User, UserPatch, UserStore,
};
