//! Ordered conversation history. Append-biased: the only non-append mutation
//! is the critique-path rewrite in [`History::replace_last_action`].

use crate::error::SessionError;
use crate::items::{Action, Item, Role};

#[derive(Debug, Default)]
pub struct History {
    items: Vec<Item>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: Item) {
        self.items.push(item);
    }

    pub fn append(&mut self, items: impl IntoIterator<Item = Item>) {
        self.items.extend(items);
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Role of the most recent item; `None` for roleless items (calls,
    /// outputs, reasoning). The turn loop terminates on `Some(Assistant)`.
    pub fn last_role(&self) -> Option<Role> {
        self.items.last().and_then(Item::role)
    }

    /// Scans backward for the nearest `call_id`-bearing item, truncates the
    /// history so it ends exactly there, and re-appends that item with its
    /// action replaced. Items before it are never touched. Returns the
    /// preserved `call_id`, which the replacement execution must answer.
    pub fn replace_last_action(&mut self, new_action: Action) -> Result<String, SessionError> {
        let idx = self
            .items
            .iter()
            .rposition(|item| item.call_id().is_some())
            .ok_or_else(|| SessionError::History("no call to replace".into()))?;

        match &self.items[idx] {
            Item::ComputerCall {
                call_id,
                pending_safety_checks,
                ..
            } => {
                let call_id = call_id.clone();
                let pending_safety_checks = pending_safety_checks.clone();
                self.items.truncate(idx);
                self.items.push(Item::ComputerCall {
                    call_id: call_id.clone(),
                    action: new_action,
                    pending_safety_checks,
                });
                Ok(call_id)
            }
            Item::ComputerCallOutput { call_id, .. } => Err(SessionError::History(format!(
                "latest call {call_id} already answered, nothing to replace"
            ))),
            _ => unreachable!("rposition matched a call_id-bearing item"),
        }
    }
}
