//! Stores rebuilt in batch from the forward and inverted indexes.

use crate::store::{decode_f64, encode_f64, id_key, KvStore, Namespace};
use crate::{Error, PageId, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// page ID -> IDs of fetched pages linking to it.
pub struct ParentLinkIndex {
    store: Arc<dyn KvStore>,
}

impl ParentLinkIndex {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    pub fn get(&self, page: PageId) -> Result<Option<Vec<PageId>>> {
        match self.store.get(Namespace::Parents, &id_key(page))? {
            Some(bytes) => bincode::deserialize(&bytes)
                .map(Some)
                .map_err(|e| Error::encoding(Namespace::Parents, page, e)),
            None => Ok(None),
        }
    }

    pub fn replace_all(&self, parents: &HashMap<PageId, Vec<PageId>>) -> Result<()> {
        self.store.clear(Namespace::Parents)?;
        for (page, ids) in parents {
            self.store.put(Namespace::Parents, &id_key(*page), &bincode::serialize(ids)?)?;
        }
        tracing::info!(pages = parents.len(), "parent links rebuilt");
        Ok(())
    }
}

/// page ID -> document vector length, the cosine denominator.
pub struct DocLengthCache {
    store: Arc<dyn KvStore>,
}

impl DocLengthCache {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    pub fn get(&self, page: PageId) -> Result<Option<f64>> {
        match self.store.get(Namespace::DocLengths, &id_key(page))? {
            Some(bytes) => decode_f64(Namespace::DocLengths, page, &bytes).map(Some),
            None => Ok(None),
        }
    }

    pub fn replace_all(&self, lengths: &HashMap<PageId, f64>) -> Result<()> {
        self.store.clear(Namespace::DocLengths)?;
        for (page, len) in lengths {
            self.store.put(Namespace::DocLengths, &id_key(*page), &encode_f64(*len))?;
        }
        tracing::info!(pages = lengths.len(), "document lengths rebuilt");
        Ok(())
    }
}
