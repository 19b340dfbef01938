use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::time::{Duration, Instant};

pub const FILE_SEPARATOR: &str = "/";
pub const FILE_ROOT: &str = "/";

pub const DIRECTORY_DATA: &str = "data";
pub const DIRECTORY_SYSTEM: &str = "system";
pub const DIRECTORY_APP: &str = "app";

lazy_static! {
    static ref ESCAPE_PATTERN: Regex = Regex::new(r#"([\\()*+?"'&#/\s])"#).unwrap();
    static ref APK_PATTERN: Regex = Regex::new(r"(?i)^.*\.apk$").unwrap();
}

/// Kind of a remote filesystem object, as `ls -l` reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    File,
    Directory,
    /// A symlink whose target was probed and found to be a directory.
    DirectoryLink,
    Block,
    Character,
    Link,
    Socket,
    Fifo,
    Other,
}

impl FileType {
    /// Map the leading character of an `ls -l` permission string.
    pub fn from_permissions(permissions: &str) -> Self {
        match permissions.chars().next() {
            Some('-') => FileType::File,
            Some('b') => FileType::Block,
            Some('c') => FileType::Character,
            Some('d') => FileType::Directory,
            Some('l') => FileType::Link,
            Some('s') => FileType::Socket,
            Some('p') => FileType::Fifo,
            _ => FileType::Other,
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, FileType::Directory | FileType::DirectoryLink)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::File => "file",
            FileType::Directory => "directory",
            FileType::DirectoryLink => "directory link",
            FileType::Block => "block",
            FileType::Character => "char",
            FileType::Link => "symlink",
            FileType::Socket => "socket",
            FileType::Fifo => "fifo",
            FileType::Other => "other",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable handle to an entry inside one [`FileTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(usize);

/// Columns of one `ls -l` row, after link post-processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingRow {
    pub name: String,
    pub file_type: FileType,
    pub permissions: String,
    pub owner: String,
    pub group: String,
    pub size: String,
    pub date: String,
    pub time: String,
    /// `-> target` for links.
    pub info: Option<String>,
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<EntryId>,
    name: String,
    file_type: FileType,
    permissions: String,
    owner: String,
    group: String,
    size: String,
    date: String,
    time: String,
    info: Option<String>,
    is_app_package: bool,
    is_root: bool,
    fetched_at: Option<Instant>,
    children: Vec<EntryId>,
}

impl Node {
    fn new(parent: Option<EntryId>, name: String, file_type: FileType, is_root: bool) -> Self {
        Self {
            parent,
            name,
            file_type,
            permissions: String::new(),
            owner: String::new(),
            group: String::new(),
            size: String::new(),
            date: String::new(),
            time: String::new(),
            info: None,
            is_app_package: false,
            is_root,
            fetched_at: None,
            children: Vec::new(),
        }
    }
}

/// Point-in-time copy of an entry, safe to hold while the tree is re-listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    #[serde(skip)]
    pub id: EntryId,
    pub name: String,
    /// Full remote path, `/` for the root.
    pub path: String,
    pub file_type: FileType,
    pub permissions: String,
    pub owner: String,
    pub group: String,
    /// Size column exactly as `ls` printed it.
    pub size: String,
    pub date: String,
    pub time: String,
    /// Link target (`-> target`) or, for app packages, the package name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
    pub is_app_package: bool,
    pub is_root: bool,
}

impl FileEntry {
    pub fn is_directory(&self) -> bool {
        self.file_type.is_directory()
    }

    /// The size column as a number, when it is one.
    pub fn size_value(&self) -> Option<u64> {
        self.size.trim().parse().ok()
    }

    pub fn is_app_file_name(&self) -> bool {
        is_app_file_name(&self.name)
    }
}

/// Backslash-escape characters the device shell would otherwise interpret.
pub fn escape(name: &str) -> String {
    ESCAPE_PATTERN.replace_all(name, r"\${1}").into_owned()
}

pub fn is_app_file_name(name: &str) -> bool {
    APK_PATTERN.is_match(name)
}

/// Arena holding the cached mirror of the remote directory hierarchy.
///
/// Entries are never removed; one dropped from its parent's children simply
/// becomes unreachable from the root.
#[derive(Debug, Default)]
pub struct FileTree {
    nodes: Vec<Node>,
    root: Option<EntryId>,
}

impl FileTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// The synthetic `/` entry, created on first use.
    pub fn root(&mut self) -> EntryId {
        if let Some(root) = self.root {
            return root;
        }
        let id = self.push(Node::new(None, String::new(), FileType::Directory, true));
        self.root = Some(id);
        id
    }

    fn push(&mut self, node: Node) -> EntryId {
        let id = EntryId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    fn node(&self, id: EntryId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn contains(&self, id: EntryId) -> bool {
        id.0 < self.nodes.len()
    }

    pub fn parent(&self, id: EntryId) -> Option<EntryId> {
        self.node(id).and_then(|n| n.parent)
    }

    /// Snapshot of the root, creating it if needed.
    pub fn root_entry(&mut self) -> FileEntry {
        let root = self.root();
        self.entry_of(root, &self.nodes[root.0])
    }

    pub fn snapshot(&self, id: EntryId) -> Option<FileEntry> {
        let node = self.node(id)?;
        Some(self.entry_of(id, node))
    }

    fn entry_of(&self, id: EntryId, node: &Node) -> FileEntry {
        FileEntry {
            id,
            name: node.name.clone(),
            path: self.full_path(id),
            file_type: node.file_type,
            permissions: node.permissions.clone(),
            owner: node.owner.clone(),
            group: node.group.clone(),
            size: node.size.clone(),
            date: node.date.clone(),
            time: node.time.clone(),
            info: node.info.clone(),
            is_app_package: node.is_app_package,
            is_root: node.is_root,
        }
    }

    /// Snapshots of the cached children, in name order.
    pub fn cached_children(&self, id: EntryId) -> Vec<FileEntry> {
        self.node(id)
            .map(|n| {
                n.children
                    .iter()
                    .filter_map(|&child| self.snapshot(child))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn find_child(&self, id: EntryId, name: &str) -> Option<EntryId> {
        self.node(id)?
            .children
            .iter()
            .copied()
            .find(|&child| self.nodes[child.0].name == name)
    }

    /// Names from the root down, root excluded.
    pub fn path_segments(&self, id: EntryId) -> Vec<String> {
        let mut segments = Vec::new();
        let mut current = Some(id);
        while let Some(cur) = current {
            let Some(node) = self.node(cur) else { break };
            if node.is_root {
                break;
            }
            segments.push(node.name.clone());
            current = node.parent;
        }
        segments.reverse();
        segments
    }

    pub fn full_path(&self, id: EntryId) -> String {
        if self.node(id).is_some_and(|n| n.is_root) {
            return FILE_ROOT.to_string();
        }
        self.join_segments(id, |s| s.to_string())
    }

    /// Full path with every segment shell-escaped. The root yields `""`.
    pub fn full_escaped_path(&self, id: EntryId) -> String {
        self.join_segments(id, escape)
    }

    fn join_segments(&self, id: EntryId, map: impl Fn(&str) -> String) -> String {
        self.path_segments(id)
            .iter()
            .fold(String::new(), |mut acc, segment| {
                acc.push_str(FILE_SEPARATOR);
                acc.push_str(&map(segment));
                acc
            })
    }

    pub fn file_type(&self, id: EntryId) -> Option<FileType> {
        self.node(id).map(|n| n.file_type)
    }

    /// True when the children were never fetched or were fetched longer ago
    /// than `threshold`.
    pub fn needs_fetch(&self, id: EntryId, threshold: Duration) -> bool {
        match self.node(id).and_then(|n| n.fetched_at) {
            None => true,
            Some(at) => at.elapsed() > threshold,
        }
    }

    pub fn mark_fetched(&mut self, id: EntryId, at: Instant) {
        if let Some(node) = self.nodes.get_mut(id.0) {
            node.fetched_at = Some(at);
        }
    }

    pub fn set_info(&mut self, id: EntryId, info: impl Into<String>) {
        if let Some(node) = self.nodes.get_mut(id.0) {
            node.info = Some(info.into());
        }
    }

    /// Replace the children of `parent` with `rows`.
    ///
    /// Rows whose name matches an existing child reuse that child's id and
    /// update it in place; the rest become new entries. Children end up
    /// sorted by name.
    pub fn merge_children(&mut self, parent: EntryId, rows: Vec<ListingRow>) {
        let Some(node) = self.node(parent) else {
            return;
        };
        let mut unclaimed: Vec<Option<EntryId>> =
            node.children.iter().copied().map(Some).collect();

        let mut children = Vec::with_capacity(rows.len());
        for row in rows {
            let existing = unclaimed.iter_mut().find_map(|slot| match *slot {
                Some(id) if self.nodes[id.0].name == row.name => slot.take(),
                _ => None,
            });

            let id = match existing {
                Some(id) => id,
                None => self.push(Node::new(
                    Some(parent),
                    row.name.clone(),
                    row.file_type,
                    false,
                )),
            };

            let node = &mut self.nodes[id.0];
            node.file_type = row.file_type;
            node.permissions = row.permissions;
            node.owner = row.owner;
            node.group = row.group;
            node.size = row.size;
            node.date = row.date;
            node.time = row.time;
            let is_app_package = self.check_app_package(id);
            let node = &mut self.nodes[id.0];
            node.is_app_package = is_app_package;
            // An app package keeps the name `pm` gave it across relistings.
            if row.info.is_some() || !is_app_package {
                node.info = row.info;
            }
            children.push(id);
        }

        children.sort_by(|a, b| self.nodes[a.0].name.cmp(&self.nodes[b.0].name));
        self.nodes[parent.0].children = children;
    }

    /// `/system/app/Foo.apk` or `/data/app/Foo.apk`.
    fn check_app_package(&self, id: EntryId) -> bool {
        let Some(node) = self.node(id) else {
            return false;
        };
        if node.file_type != FileType::File || !is_app_file_name(&node.name) {
            return false;
        }
        let segments = self.path_segments(id);
        segments.len() == 3
            && segments[1] == DIRECTORY_APP
            && (segments[0] == DIRECTORY_SYSTEM || segments[0] == DIRECTORY_DATA)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(name: &str, file_type: FileType) -> ListingRow {
        ListingRow {
            name: name.to_string(),
            file_type,
            permissions: "-rw-r--r--".to_string(),
            owner: "root".to_string(),
            group: "root".to_string(),
            size: "10".to_string(),
            date: "2021-01-01".to_string(),
            time: "00:00".to_string(),
            info: None,
        }
    }

    #[test]
    fn test_root_is_lazy_and_stable() {
        let mut tree = FileTree::new();
        assert!(!tree.contains(EntryId(0)));
        let root = tree.root();
        assert_eq!(tree.root(), root);

        let entry = tree.snapshot(root).unwrap();
        assert!(entry.is_root);
        assert_eq!(entry.path, "/");
        assert_eq!(entry.file_type, FileType::Directory);
        assert!(tree.parent(root).is_none());
        assert_eq!(tree.full_escaped_path(root), "");
    }

    #[test]
    fn test_paths_walk_parents() {
        let mut tree = FileTree::new();
        let root = tree.root();
        tree.merge_children(root, vec![row("sdcard", FileType::Directory)]);
        let sdcard = tree.find_child(root, "sdcard").unwrap();
        tree.merge_children(sdcard, vec![row("My Photos", FileType::Directory)]);
        let photos = tree.find_child(sdcard, "My Photos").unwrap();

        assert_eq!(tree.full_path(photos), "/sdcard/My Photos");
        assert_eq!(tree.full_escaped_path(photos), "/sdcard/My\\ Photos");
        assert_eq!(tree.path_segments(photos), vec!["sdcard", "My Photos"]);
        assert_eq!(tree.parent(photos), Some(sdcard));
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape("a b"), "a\\ b");
        assert_eq!(escape("it's(1)"), "it\\'s\\(1\\)");
        assert_eq!(escape("plain.txt"), "plain.txt");
        assert_eq!(escape("a&b#c"), "a\\&b\\#c");
    }

    #[test]
    fn test_merge_reuses_ids_and_sorts() {
        let mut tree = FileTree::new();
        let root = tree.root();
        tree.merge_children(
            root,
            vec![row("b", FileType::File), row("a", FileType::File)],
        );
        let a = tree.find_child(root, "a").unwrap();
        let b = tree.find_child(root, "b").unwrap();

        let mut updated = row("b", FileType::File);
        updated.size = "99".to_string();
        tree.merge_children(root, vec![updated, row("c", FileType::File)]);

        let names: Vec<String> = tree
            .cached_children(root)
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["b", "c"]);
        assert_eq!(tree.find_child(root, "b"), Some(b));
        assert!(tree.find_child(root, "a").is_none());
        assert!(tree.contains(a));
        assert_eq!(tree.snapshot(b).unwrap().size, "99");
    }

    #[test]
    fn test_app_package_detection() {
        let mut tree = FileTree::new();
        let root = tree.root();
        tree.merge_children(
            root,
            vec![row("data", FileType::Directory), row("sdcard", FileType::Directory)],
        );
        let data = tree.find_child(root, "data").unwrap();
        tree.merge_children(data, vec![row("app", FileType::Directory)]);
        let app = tree.find_child(data, "app").unwrap();
        tree.merge_children(
            app,
            vec![row("Foo.APK", FileType::File), row("notes.txt", FileType::File)],
        );

        let children = tree.cached_children(app);
        assert!(children[0].is_app_package);
        assert!(!children[1].is_app_package);

        let sdcard = tree.find_child(root, "sdcard").unwrap();
        tree.merge_children(sdcard, vec![row("Bar.apk", FileType::File)]);
        assert!(!tree.cached_children(sdcard)[0].is_app_package);
    }

    #[test]
    fn test_relisting_replaces_stale_link_target() {
        let mut tree = FileTree::new();
        let root = tree.root();
        let mut link = row("vendor", FileType::Link);
        link.info = Some("-> /system/vendor".to_string());
        tree.merge_children(root, vec![link]);
        let vendor = tree.find_child(root, "vendor").unwrap();

        tree.merge_children(root, vec![row("vendor", FileType::File)]);

        let entry = tree.snapshot(vendor).unwrap();
        assert_eq!(entry.file_type, FileType::File);
        assert!(entry.info.is_none());
    }

    #[test]
    fn test_relisting_keeps_package_name() {
        let mut tree = FileTree::new();
        let root = tree.root();
        tree.merge_children(root, vec![row("data", FileType::Directory)]);
        let data = tree.find_child(root, "data").unwrap();
        tree.merge_children(data, vec![row("app", FileType::Directory)]);
        let app = tree.find_child(data, "app").unwrap();
        tree.merge_children(app, vec![row("Foo.apk", FileType::File)]);
        let foo = tree.find_child(app, "Foo.apk").unwrap();
        tree.set_info(foo, "com.example.foo");

        tree.merge_children(app, vec![row("Foo.apk", FileType::File)]);

        assert_eq!(
            tree.snapshot(foo).unwrap().info.as_deref(),
            Some("com.example.foo")
        );
    }

    #[test]
    fn test_needs_fetch() {
        let mut tree = FileTree::new();
        let root = tree.root();
        assert!(tree.needs_fetch(root, Duration::from_secs(4)));
        tree.mark_fetched(root, Instant::now());
        assert!(!tree.needs_fetch(root, Duration::from_secs(4)));

        std::thread::sleep(Duration::from_millis(10));
        assert!(tree.needs_fetch(root, Duration::from_millis(5)));
    }

    #[test]
    fn test_file_type_from_permissions() {
        assert_eq!(FileType::from_permissions("-rw-r--r--"), FileType::File);
        assert_eq!(FileType::from_permissions("drwxr-xr-x"), FileType::Directory);
        assert_eq!(FileType::from_permissions("lrwxrwxrwx"), FileType::Link);
        assert_eq!(FileType::from_permissions("crw-rw-rw-"), FileType::Character);
        assert_eq!(FileType::from_permissions("brw-------"), FileType::Block);
        assert_eq!(FileType::from_permissions("srwxrwxrwx"), FileType::Socket);
        assert_eq!(FileType::from_permissions("prw-------"), FileType::Fifo);
        assert_eq!(FileType::from_permissions("?"), FileType::Other);
    }

    #[test]
    fn test_size_value() {
        let mut tree = FileTree::new();
        let root = tree.root();
        let mut device = row("null", FileType::Character);
        device.size = "1,   3".to_string();
        tree.merge_children(root, vec![row("f", FileType::File), device]);
        let children = tree.cached_children(root);
        assert_eq!(children[0].size_value(), Some(10));
        assert_eq!(children[1].size_value(), None);
    }
}
