//! Small metadata store living alongside the index.
//!
//! Holds the docid watermark so ids allocated as `last + 1` are never
//! reused, even after the highest-numbered document is purged.

use std::path::Path;

use redb::{Database, ReadableTable, TableDefinition};

use crate::error::Result;

const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

const LAST_DOCID: &str = "last_docid";
const SCHEMA_VERSION: &str = "schema_version";

pub(crate) struct MetaDb {
    db: Database,
}

impl MetaDb {
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path)?;

        let txn = db.begin_write()?;
        {
            let mut table = txn.open_table(META)?;
            if table.get(SCHEMA_VERSION)?.is_none() {
                table.insert(SCHEMA_VERSION, 1)?;
            }
        }
        txn.commit()?;

        Ok(Self { db })
    }

    /// Allocate and persist the next docid.
    pub fn allocate_docid(&self) -> Result<u64> {
        let txn = self.db.begin_write()?;
        let next = {
            let mut table = txn.open_table(META)?;
            let last = table.get(LAST_DOCID)?.map(|v| v.value()).unwrap_or(0);
            let next = last + 1;
            table.insert(LAST_DOCID, next)?;
            next
        };
        txn.commit()?;
        Ok(next)
    }

    /// Raise the watermark to cover an explicitly assigned docid.
    pub fn note_docid(&self, docid: u64) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(META)?;
            let last = table.get(LAST_DOCID)?.map(|v| v.value()).unwrap_or(0);
            if docid > last {
                table.insert(LAST_DOCID, docid)?;
            }
        }
        txn.commit()?;
        Ok(())
    }
}

impl std::fmt::Debug for MetaDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetaDb").finish_non_exhaustive()
    }
}
