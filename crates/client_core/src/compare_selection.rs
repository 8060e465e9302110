use shared::domain::AppId;

pub const DEFAULT_MAX_SELECTION: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedApp {
    pub id: AppId,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct CompareSelection {
    max_selection: usize,
    selected: Vec<SelectedApp>,
}

impl Default for CompareSelection {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SELECTION)
    }
}

impl CompareSelection {
    pub fn new(max_selection: usize) -> Self {
        Self {
            max_selection,
            selected: Vec::new(),
        }
    }

    /// Returns whether `id` is selected afterwards; picks past `max_selection` are dropped.
    pub fn toggle(&mut self, id: AppId, name: impl Into<String>) -> bool {
        if let Some(index) = self.selected.iter().position(|app| app.id == id) {
            self.selected.remove(index);
            return false;
        }
        if self.is_full() {
            return false;
        }
        self.selected.push(SelectedApp {
            id,
            name: name.into(),
        });
        true
    }

    pub fn clear(&mut self) {
        self.selected.clear();
    }

    pub fn is_selected(&self, id: &AppId) -> bool {
        self.selected.iter().any(|app| &app.id == id)
    }

    pub fn is_full(&self) -> bool {
        self.selected.len() >= self.max_selection
    }

    pub fn selected(&self) -> &[SelectedApp] {
        &self.selected
    }

    pub fn pair(&self) -> Option<(&str, &str)> {
        match self.selected.as_slice() {
            [a, b] => Some((a.name.as_str(), b.name.as_str())),
            _ => None,
        }
    }
}
