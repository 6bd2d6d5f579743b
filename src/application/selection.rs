use crate::domain::models::TaskId;
use crate::domain::store::TaskStore;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    ids: Vec<TaskId>,
}

impl Selection {
    pub fn ids(&self) -> &[TaskId] {
        &self.ids
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.ids.contains(id)
    }

    pub fn toggle(&mut self, id: TaskId) -> bool {
        if let Some(index) = self.ids.iter().position(|selected| selected == &id) {
            self.ids.remove(index);
            false
        } else {
            self.ids.push(id);
            true
        }
    }

    pub fn first(&self) -> Option<&TaskId> {
        self.ids.first()
    }

    pub fn remove(&mut self, id: &TaskId) -> bool {
        let before = self.ids.len();
        self.ids.retain(|selected| selected != id);
        self.ids.len() != before
    }

    pub fn retarget(&mut self, old: &TaskId, new: &TaskId) -> bool {
        let mut changed = false;
        for selected in self.ids.iter_mut().filter(|selected| *selected == old) {
            *selected = new.clone();
            changed = true;
        }
        changed
    }

    pub fn take(&mut self) -> Vec<TaskId> {
        std::mem::take(&mut self.ids)
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }
}

pub fn complete_selected(selection: &mut Selection, store: &mut TaskStore, now: DateTime<Utc>) -> Vec<TaskId> {
    selection
        .take()
        .into_iter()
        .filter(|id| store.complete(id, now))
        .collect()
}
