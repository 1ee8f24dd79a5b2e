pub mod ephemeral;
pub mod identity;
pub mod redis_service;
pub mod storage;
pub mod tables;
pub mod webhook;

pub use ephemeral::{CachedImage, EphemeralStore, InProcessStore};
pub use identity::{IdentityService, SignIn, SignUp, SupabaseIdentity};
pub use redis_service::RedisService;
pub use storage::{FetchedObject, GcsStorage, ObjectStorage};
pub use tables::{PostgrestTables, TableService};
pub use webhook::{GenerationWebhook, HttpWebhook};
