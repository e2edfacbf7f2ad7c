//! ReDB-backed template store for the compute role.
//!
//! Keys are user ids; values are bincode-encoded `StoredTemplate`s holding
//! the display name and the serialized ciphertext.

use std::path::Path;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};
use serde::{Deserialize, Serialize};

use super::{StoreAck, TemplateRecord, TemplateStore};
use crate::crypto::EncryptedVector;
use crate::error::{ServiceError, ServiceResult};

const TEMPLATES: TableDefinition<&str, &[u8]> = TableDefinition::new("templates");

#[derive(Serialize, Deserialize)]
struct StoredTemplate {
    full_name: Option<String>,
    ciphertext: Vec<u8>,
}

/// Thread-safe via internal Arc. Clone is cheap.
#[derive(Clone)]
pub struct RedbTemplateStore {
    db: Arc<Database>,
}

impl RedbTemplateStore {
    /// Open or create the database at `path`, creating parent directories.
    pub fn open(path: &Path) -> ServiceResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;
        let store = Self::init(db)?;
        tracing::info!(path = %path.display(), "Opened template store");
        Ok(store)
    }

    /// In-memory database, for tests and throwaway deployments.
    pub fn open_memory() -> ServiceResult<Self> {
        let db = Database::builder()
            .create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::init(db)
    }

    fn init(db: Database) -> ServiceResult<Self> {
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(TEMPLATES)?;
        }
        write_txn.commit()?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Insert or replace the template for `user_id`.
    pub fn put_template(
        &self,
        user_id: &str,
        full_name: Option<&str>,
        ciphertext: &[u8],
    ) -> ServiceResult<()> {
        if user_id.trim().is_empty() {
            return Err(ServiceError::InvalidInput("user_id must not be empty".to_string()));
        }
        let value = bincode::serialize(&StoredTemplate {
            full_name: full_name.map(str::to_string),
            ciphertext: ciphertext.to_vec(),
        })?;

        let write_txn = self.db.begin_write()?;
        let replaced = {
            let mut table = write_txn.open_table(TEMPLATES)?;
            let previous = table.insert(user_id, value.as_slice())?;
            previous.is_some()
        };
        write_txn.commit()?;
        tracing::debug!(user_id, replaced, "Stored template");
        Ok(())
    }

    pub fn get_template(&self, user_id: &str) -> ServiceResult<Option<TemplateRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TEMPLATES)?;
        match table.get(user_id)? {
            Some(value) => Ok(Some(decode_record(user_id, value.value())?)),
            None => Ok(None),
        }
    }

    /// Every stored template, ordered by user id.
    pub fn templates(&self) -> ServiceResult<Vec<TemplateRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TEMPLATES)?;

        let mut records = Vec::new();
        for entry in table.iter()? {
            let (key, value) = entry?;
            records.push(decode_record(key.value(), value.value())?);
        }
        Ok(records)
    }

    pub fn len(&self) -> ServiceResult<u64> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TEMPLATES)?;
        Ok(table.len()?)
    }

    pub fn is_empty(&self) -> ServiceResult<bool> {
        Ok(self.len()? == 0)
    }
}

fn decode_record(user_id: &str, bytes: &[u8]) -> ServiceResult<TemplateRecord> {
    let stored: StoredTemplate = bincode::deserialize(bytes)
        .map_err(|e| ServiceError::Store(format!("corrupt template for {user_id}: {e}")))?;
    Ok(TemplateRecord {
        user_id: user_id.to_string(),
        full_name: stored.full_name,
        ciphertext: stored.ciphertext,
    })
}

impl TemplateStore for RedbTemplateStore {
    fn put<'a>(
        &'a self,
        user_id: &'a str,
        full_name: Option<&'a str>,
        template: &'a EncryptedVector,
    ) -> BoxFuture<'a, ServiceResult<StoreAck>> {
        Box::pin(async move {
            let bytes = template.to_bytes()?;
            let store = self.clone();
            let user = user_id.to_string();
            let name = full_name.map(str::to_string);
            tokio::task::spawn_blocking(move || store.put_template(&user, name.as_deref(), &bytes))
                .await??;
            Ok(StoreAck::registered(user_id))
        })
    }
}
