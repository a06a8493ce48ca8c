//! Scoped exclusive checkout of one child record.

use std::collections::HashSet;
use std::ops::{Deref, DerefMut};
use std::sync::{Condvar, Mutex};

use ots_types::ContentHash;
use tracing::{debug, error};

use crate::error::{TreeError, TreeResult};
use crate::index::IndexNode;
use crate::record::Record;

/// IDs currently checked out of one index node.
#[derive(Default)]
pub(crate) struct Checkouts {
    held: Mutex<HashSet<String>>,
    released: Condvar,
}

impl Checkouts {
    /// Block until `id` is free, then claim it.
    pub(crate) fn acquire(&self, id: &str) -> TreeResult<CheckoutSlot<'_>> {
        let mut held = self.held.lock().map_err(TreeError::poisoned)?;
        while held.contains(id) {
            held = self.released.wait(held).map_err(TreeError::poisoned)?;
        }
        held.insert(id.to_string());
        Ok(CheckoutSlot {
            owner: self,
            id: id.to_string(),
        })
    }
}

/// Claim on one ID; released on drop.
pub(crate) struct CheckoutSlot<'a> {
    owner: &'a Checkouts,
    id: String,
}

impl Drop for CheckoutSlot<'_> {
    fn drop(&mut self) {
        let mut held = self.owner.held.lock().unwrap_or_else(|e| e.into_inner());
        held.remove(&self.id);
        drop(held);
        self.owner.released.notify_all();
    }
}

/// Exclusive mutable handle to one record of an [`IndexNode`].
///
/// Dereferences to the record. Dropping the editor commits it; call
/// [`Editor::commit`] to observe the result, or [`Editor::discard`] to drop
/// the changes. A commit that fails during drop is logged, since `Drop`
/// cannot return it.
pub struct Editor<'a, R: Record> {
    node: &'a IndexNode<R>,
    record: R,
    alias: Option<String>,
    created: bool,
    finished: bool,
    slot: CheckoutSlot<'a>,
}

impl<'a, R: Record> Editor<'a, R> {
    pub(crate) fn new(node: &'a IndexNode<R>, slot: CheckoutSlot<'a>, record: R, created: bool) -> Self {
        Self {
            node,
            record,
            alias: None,
            created,
            finished: false,
            slot,
        }
    }

    /// The checked-out ID.
    pub fn id(&self) -> &str {
        &self.slot.id
    }

    /// True if the ID was absent and the record started blank.
    pub fn is_new(&self) -> bool {
        self.created
    }

    /// Alias to write on commit. Without one the current alias is kept.
    pub fn set_alias(&mut self, alias: impl Into<String>) {
        self.alias = Some(alias.into());
    }

    /// Store the record and cascade the save to the root.
    pub fn commit(mut self) -> TreeResult<ContentHash> {
        self.finish()
    }

    /// Drop the changes; the index is left as it was.
    pub fn discard(mut self) {
        self.finished = true;
        debug!(role = %self.node.role(), id = self.id(), "discarded checkout");
    }

    fn finish(&mut self) -> TreeResult<ContentHash> {
        self.finished = true;
        let record = std::mem::replace(&mut self.record, R::blank(&self.slot.id));
        self.node.store_as(&self.slot.id, record, self.alias.take())
    }
}

impl<R: Record> Deref for Editor<'_, R> {
    type Target = R;

    fn deref(&self) -> &R {
        &self.record
    }
}

impl<R: Record> DerefMut for Editor<'_, R> {
    fn deref_mut(&mut self) -> &mut R {
        &mut self.record
    }
}

impl<R: Record> Drop for Editor<'_, R> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(e) = self.finish() {
            error!(role = %self.node.role(), id = self.id(), error = %e, "commit on drop failed");
        }
    }
}
