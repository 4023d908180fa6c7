/// One alias definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasEntry {
    pub name: String,
    pub value: String,
}

impl std::fmt::Display for AliasEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}='{}'", self.name, self.value)
    }
}

/// Aliases in definition order.
///
/// Redefining a name replaces its value in place, so listing order is the
/// order of first definition.
#[derive(Debug, Clone, Default)]
pub struct AliasList {
    entries: Vec<AliasEntry>,
}

impl AliasList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an alias by its exact name.
    pub fn get(&self, name: &str) -> Option<&AliasEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|e| e.name == name) {
            Some(entry) => entry.value = value,
            None => self.entries.push(AliasEntry { name, value }),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &AliasEntry> {
        self.entries.iter()
    }
}
