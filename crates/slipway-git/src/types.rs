//! Value types for git results

/// A git branch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branch {
    /// Branch name
    pub name: String,
    /// Whether this is the currently checked-out branch
    pub is_current: bool,
}

impl Branch {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_current: false,
        }
    }

    /// Mark as the currently checked-out branch
    pub fn current(mut self) -> Self {
        self.is_current = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branch_builder() {
        let branch = Branch::new("release/1.2").current();
        assert_eq!(branch.name, "release/1.2");
        assert!(branch.is_current);
        assert!(!Branch::new("develop").is_current);
    }
}
