use bitflags::bitflags;

bitflags! {
    /// Kind flags carried by a reference record.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct RefKind: u8 {
        const BRANCH = 1 << 0;
        const REMOTE = 1 << 1;
        const TAG = 1 << 2;
        const CURRENT_BRANCH = 1 << 3;
    }
}

/// Named pointers to a single commit id.
///
/// The cache keys these records by target id, so one record aggregates every
/// branch, remote and tag name that resolves to the same commit. A commit may
/// carry several tag names at once; they are kept in enumeration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitReference {
    pub names: Vec<String>,
    pub tags: Vec<String>,
    pub kind: RefKind,
}

impl GitReference {
    /// Registers a full ref path (`refs/heads/...`, `refs/remotes/...`,
    /// `refs/tags/...`) on this record, updating the kind flags. Paths
    /// outside the known namespaces keep their full spelling.
    pub fn add_name(&mut self, ref_path: &str) {
        if let Some(name) = ref_path.strip_prefix("refs/heads/") {
            self.kind |= RefKind::BRANCH;
            push_unique(&mut self.names, name);
        } else if let Some(name) = ref_path.strip_prefix("refs/remotes/") {
            self.kind |= RefKind::REMOTE;
            push_unique(&mut self.names, name);
        } else if let Some(name) = ref_path.strip_prefix("refs/tags/") {
            self.kind |= RefKind::TAG;
            push_unique(&mut self.tags, name);
        } else {
            push_unique(&mut self.names, ref_path);
        }
    }

    pub fn mark_current_branch(&mut self) {
        self.kind |= RefKind::CURRENT_BRANCH;
    }

    pub fn is_current_branch(&self) -> bool {
        self.kind.contains(RefKind::CURRENT_BRANCH)
    }

    pub fn is_tag(&self) -> bool {
        self.kind.contains(RefKind::TAG)
    }

    /// Branch/remote names followed by tag names, in registration order.
    pub fn display_names(&self) -> impl Iterator<Item = &str> {
        self.names
            .iter()
            .map(String::as_str)
            .chain(self.tags.iter().map(String::as_str))
    }
}

fn push_unique(list: &mut Vec<String>, name: &str) {
    if !list.iter().any(|existing| existing == name) {
        list.push(name.to_string());
    }
}
