use std::collections::BTreeSet;

use ots_types::ContentHash;
use serde::{Deserialize, Serialize};

use crate::error::{TreeError, TreeResult};
use crate::index::IndexNode;
use crate::record::Record;

/// One message or payment notice in a conversation thread.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadItem {
    pub id: String,
    /// Seconds since the Unix epoch.
    pub timestamp: u64,
    #[serde(default)]
    pub unread: bool,
}

impl ThreadItem {
    pub fn new(id: impl Into<String>, timestamp: u64) -> Self {
        Self {
            id: id.into(),
            timestamp,
            unread: true,
        }
    }
}

/// A conversation thread between a fixed set of participants.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    pub version: u32,
    pub id: String,
    /// Participant nym IDs, kept sorted and unique.
    #[serde(default)]
    pub participants: BTreeSet<String>,
    #[serde(default)]
    pub items: Vec<ThreadItem>,
    /// Count of unread items. Added in version 2.
    #[serde(default)]
    pub unread: u64,
}

impl Thread {
    pub fn new<I, S>(id: impl Into<String>, participants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            version: Self::CURRENT_VERSION,
            id: id.into(),
            participants: participants.into_iter().map(Into::into).collect(),
            items: Vec::new(),
            unread: 0,
        }
    }

    /// Append an item, or replace the one with the same ID.
    pub fn add_item(&mut self, item: ThreadItem) {
        match self.items.iter_mut().find(|i| i.id == item.id) {
            Some(existing) => *existing = item,
            None => self.items.push(item),
        }
        self.items.sort_by_key(|i| i.timestamp);
        self.recount();
    }

    /// Mark every item read. Returns how many changed.
    pub fn mark_read(&mut self) -> usize {
        let mut changed = 0;
        for item in self.items.iter_mut().filter(|i| i.unread) {
            item.unread = false;
            changed += 1;
        }
        self.recount();
        changed
    }

    fn recount(&mut self) {
        self.unread = self.items.iter().filter(|i| i.unread).count() as u64;
    }
}

impl Record for Thread {
    const KIND: &'static str = "thread";
    const CURRENT_VERSION: u32 = 2;

    fn blank(id: &str) -> Self {
        Self::new(id, std::iter::empty::<String>())
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn upgrade(&mut self) {
        if self.version < 2 {
            self.recount();
            self.version = 2;
        }
    }

    fn validate(&self) -> Result<(), String> {
        if self.participants.is_empty() {
            return Err("no participants".into());
        }
        if self.participants.iter().any(String::is_empty) {
            return Err("empty participant id".into());
        }
        let mut ids = BTreeSet::new();
        for item in &self.items {
            if !ids.insert(item.id.as_str()) {
                return Err(format!("duplicate item {:?}", item.id));
            }
        }
        let unread = self.items.iter().filter(|i| i.unread).count() as u64;
        if unread != self.unread {
            return Err(format!("unread count {} but {unread} unread items", self.unread));
        }
        Ok(())
    }
}

impl IndexNode<Thread> {
    /// Start a new thread between `participants`.
    ///
    /// Fails with [`TreeError::AlreadyExists`] if `id` is taken.
    pub fn create<I, S>(&self, id: &str, participants: I) -> TreeResult<ContentHash>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut editor = self.checkout(id)?;
        if !editor.is_new() {
            editor.discard();
            return Err(TreeError::AlreadyExists {
                kind: Thread::KIND,
                id: id.to_string(),
            });
        }
        editor.participants = participants.into_iter().map(Into::into).collect();
        editor.commit()
    }

    /// Append `item` to an existing thread. Returns `false` if the thread
    /// does not exist.
    pub fn add_item(&self, id: &str, item: ThreadItem) -> TreeResult<bool> {
        let mut editor = self.checkout(id)?;
        if editor.is_new() {
            editor.discard();
            return Ok(false);
        }
        editor.add_item(item);
        editor.commit()?;
        Ok(true)
    }

    /// Mark every item of a thread read. Returns how many changed, or
    /// `None` if the thread does not exist.
    pub fn mark_read(&self, id: &str) -> TreeResult<Option<usize>> {
        let mut editor = self.checkout(id)?;
        if editor.is_new() {
            editor.discard();
            return Ok(None);
        }
        let changed = editor.mark_read();
        if changed == 0 {
            editor.discard();
        } else {
            editor.commit()?;
        }
        Ok(Some(changed))
    }
}
