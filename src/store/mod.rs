//! Template store: one encrypted embedding per enrolled user.

mod redb;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::crypto::EncryptedVector;
use crate::error::ServiceResult;

pub use self::redb::RedbTemplateStore;

/// Acknowledgment of a stored template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreAck {
    pub status: String,
    pub user_id: String,
}

impl StoreAck {
    pub fn registered(user_id: impl Into<String>) -> Self {
        Self {
            status: "registered".to_string(),
            user_id: user_id.into(),
        }
    }
}

/// A stored template. The ciphertext stays in its serialized form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateRecord {
    pub user_id: String,
    pub full_name: Option<String>,
    pub ciphertext: Vec<u8>,
}

/// Keyed put with overwrite-on-conflict.
pub trait TemplateStore: Send + Sync {
    fn put<'a>(
        &'a self,
        user_id: &'a str,
        full_name: Option<&'a str>,
        template: &'a EncryptedVector,
    ) -> BoxFuture<'a, ServiceResult<StoreAck>>;
}
