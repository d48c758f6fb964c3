use std::collections::HashSet;

/// Application names that never count as usage, like the OS idle or login shell.
#[derive(Debug, Clone, Default)]
pub struct IgnoreList {
    names: HashSet<String>,
}

impl IgnoreList {
    pub fn new(names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_ignored(&self, app_name: &str) -> bool {
        self.names.contains(app_name)
    }
}
