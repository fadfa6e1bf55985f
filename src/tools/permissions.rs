//! Tool approval state

use std::collections::HashSet;

use super::Tool;

/// Which tools may run without asking the user
#[derive(Debug, Clone, Default)]
pub struct ToolPermissions {
    trust_all: bool,
    trusted: HashSet<String>,
}

impl ToolPermissions {
    pub fn new(trust_all: bool, trusted: impl IntoIterator<Item = String>) -> Self {
        Self {
            trust_all,
            trusted: trusted.into_iter().collect(),
        }
    }

    pub fn trust(&mut self, tool_name: impl Into<String>) {
        self.trusted.insert(tool_name.into());
    }

    /// Remove trust; also turns off trust-all
    pub fn untrust(&mut self, tool_name: &str) {
        self.trust_all = false;
        self.trusted.remove(tool_name);
    }

    pub fn trust_all(&mut self) {
        self.trust_all = true;
    }

    pub fn reset(&mut self) {
        self.trust_all = false;
        self.trusted.clear();
    }

    pub fn is_trusted(&self, tool_name: &str) -> bool {
        self.trust_all || self.trusted.contains(tool_name)
    }

    pub fn is_trust_all(&self) -> bool {
        self.trust_all
    }

    /// Trusted tool names, sorted
    pub fn trusted_tools(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.trusted.iter().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Whether the user must approve this tool before it runs
    pub fn needs_approval(&self, tool: &Tool) -> bool {
        tool.requires_acceptance() && !self.is_trusted(tool.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{ExecuteBash, FsWrite};

    fn write_tool() -> Tool {
        Tool::FsWrite(FsWrite::Append {
            path: "x".into(),
            new_str: "y".into(),
        })
    }

    #[test]
    fn test_trust_and_untrust() {
        let mut perms = ToolPermissions::default();
        assert!(perms.needs_approval(&write_tool()));

        perms.trust("fs_write");
        assert!(!perms.needs_approval(&write_tool()));

        perms.untrust("fs_write");
        assert!(perms.needs_approval(&write_tool()));
    }

    #[test]
    fn test_trust_all_and_reset() {
        let mut perms = ToolPermissions::new(false, vec!["execute_bash".to_string()]);
        perms.trust_all();
        assert!(perms.is_trusted("anything"));

        perms.untrust("other");
        assert!(!perms.is_trust_all());
        assert!(perms.is_trusted("execute_bash"));

        perms.reset();
        assert!(perms.trusted_tools().is_empty());
    }

    #[test]
    fn test_readonly_command_never_needs_approval() {
        let perms = ToolPermissions::default();
        let ls = Tool::ExecuteBash(ExecuteBash { command: "ls".into() });
        assert!(!perms.needs_approval(&ls));
    }
}
