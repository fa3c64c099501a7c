//! In-memory document store fake.
//!
//! Backs every synchronizer test. Behaves like the real library surface:
//! path-addressed folders and files, per-file worksheet cells, deep copy and
//! delete, sharing links. Two test hooks on top:
//! - [`MemoryStore::require_token`] rejects calls whose bearer token does
//!   not match, as [`RemoteError::AuthExpired`]
//! - [`MemoryStore::fail_next`] queues errors that the next calls return
//!   before touching state, for retry and partial-failure scenarios

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

use serde_json::Value;

use crate::auth::Credential;
use crate::client::{CellGrid, DocumentApi, ItemRef, LinkScope};
use crate::error::RemoteError;

#[derive(Debug, Clone)]
enum Node {
    Folder,
    File {
        content: Vec<u8>,
        sheets: HashMap<String, BTreeMap<(u32, u32), Value>>,
    },
}

#[derive(Debug, Default)]
struct Inner {
    /// Normalized path (`/a/b`) to node. BTreeMap keeps descendants of a
    /// path contiguous, which makes recursive copy/delete a range scan.
    nodes: BTreeMap<String, (String, Node)>,
    next_id: u64,
    required_token: Option<String>,
    injected: VecDeque<RemoteError>,
    calls: Vec<String>,
}

/// Path-addressed fake document store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // -- test hooks --------------------------------------------------------

    /// Reject any call whose token differs from `token` with `AuthExpired`.
    pub fn require_token(&self, token: impl Into<String>) {
        self.lock().required_token = Some(token.into());
    }

    /// Queue an error returned (and consumed) by an upcoming call, before
    /// any state is touched.
    pub fn fail_next(&self, err: RemoteError) {
        self.lock().injected.push_back(err);
    }

    /// Ordered log of calls made so far, `"op path"` per entry.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Create a folder chain without going through the API (test seeding).
    pub fn mkdir_all(&self, path: &str) {
        let path = normalize(path);
        let mut inner = self.lock();
        let mut prefix = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            prefix.push('/');
            prefix.push_str(segment);
            if !inner.nodes.contains_key(&prefix) {
                let id = inner.fresh_id();
                inner.nodes.insert(prefix.clone(), (id, Node::Folder));
            }
        }
    }

    /// Create or overwrite a file without going through the API.
    pub fn put_file(&self, path: &str, content: &[u8]) {
        let path = normalize(path);
        if let Some(parent) = parent_of(&path) {
            self.mkdir_all(&parent);
        }
        let mut inner = self.lock();
        let id = inner.fresh_id();
        inner.nodes.insert(
            path,
            (
                id,
                Node::File {
                    content: content.to_vec(),
                    sheets: HashMap::new(),
                },
            ),
        );
    }

    /// Raw file bytes, if the path holds a file (test inspection).
    pub fn file_content(&self, path: &str) -> Option<Vec<u8>> {
        let path = normalize(path);
        match self.lock().nodes.get(&path) {
            Some((_, Node::File { content, .. })) => Some(content.clone()),
            _ => None,
        }
    }

    /// Whether any node exists at `path` (test inspection).
    pub fn exists(&self, path: &str) -> bool {
        self.lock().nodes.contains_key(&normalize(path))
    }

    /// One worksheet cell, if set (test inspection). 1-based row/column.
    pub fn cell(&self, path: &str, worksheet: &str, row: u32, col: u32) -> Option<Value> {
        let path = normalize(path);
        match self.lock().nodes.get(&path) {
            Some((_, Node::File { sheets, .. })) => sheets
                .get(worksheet)
                .and_then(|cells| cells.get(&(row, col)))
                .cloned(),
            _ => None,
        }
    }

    // -- internals ---------------------------------------------------------

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Auth check, fault injection, and call logging for one API call.
    fn gate(&self, cred: &Credential, op: &str, path: &str) -> Result<(), RemoteError> {
        let mut inner = self.lock();
        inner.calls.push(format!("{op} {path}"));
        if let Some(required) = &inner.required_token {
            if &cred.access_token != required {
                return Err(RemoteError::AuthExpired);
            }
        }
        if let Some(err) = inner.injected.pop_front() {
            return Err(err);
        }
        Ok(())
    }
}

impl Inner {
    fn fresh_id(&mut self) -> String {
        self.next_id += 1;
        format!("item-{}", self.next_id)
    }

    /// The library root `/` is an implicit folder.
    fn is_folder(&self, path: &str) -> bool {
        path == "/" || matches!(self.nodes.get(path), Some((_, Node::Folder)))
    }

    fn item_ref(&self, path: &str) -> Option<ItemRef> {
        self.nodes.get(path).map(|(id, _)| ItemRef {
            id: id.clone(),
            name: name_of(path).to_string(),
            web_url: web_url(path),
        })
    }

    /// Paths of `path` and everything under it.
    fn subtree(&self, path: &str) -> Vec<String> {
        let prefix = format!("{path}/");
        self.nodes
            .keys()
            .filter(|k| *k == path || k.starts_with(&prefix))
            .cloned()
            .collect()
    }
}

impl DocumentApi for MemoryStore {
    fn find_by_path(
        &self,
        cred: &Credential,
        path: &str,
    ) -> Result<Option<ItemRef>, RemoteError> {
        let path = normalize(path);
        self.gate(cred, "find_by_path", &path)?;
        Ok(self.lock().item_ref(&path))
    }

    fn create_folder(
        &self,
        cred: &Credential,
        parent: &str,
        name: &str,
    ) -> Result<ItemRef, RemoteError> {
        let parent = normalize(parent);
        let path = join(&parent, name);
        self.gate(cred, "create_folder", &path)?;

        let mut inner = self.lock();
        if !inner.is_folder(&parent) {
            return Err(RemoteError::NotFound { path: parent });
        }
        if inner.nodes.contains_key(&path) {
            return Err(RemoteError::Conflict { path });
        }
        let id = inner.fresh_id();
        inner.nodes.insert(path.clone(), (id, Node::Folder));
        Ok(inner.item_ref(&path).expect("just inserted"))
    }

    fn copy_item(
        &self,
        cred: &Credential,
        source: &str,
        dest_parent: &str,
        new_name: &str,
    ) -> Result<ItemRef, RemoteError> {
        let source = normalize(source);
        let dest_parent = normalize(dest_parent);
        let dest = join(&dest_parent, new_name);
        self.gate(cred, "copy_item", &dest)?;

        let mut inner = self.lock();
        if !inner.nodes.contains_key(&source) {
            return Err(RemoteError::NotFound { path: source });
        }
        if !inner.is_folder(&dest_parent) {
            return Err(RemoteError::NotFound { path: dest_parent });
        }
        if inner.nodes.contains_key(&dest) {
            return Err(RemoteError::Conflict { path: dest });
        }

        for old_path in inner.subtree(&source) {
            let node = inner.nodes.get(&old_path).expect("subtree path").1.clone();
            let new_path = format!("{dest}{}", &old_path[source.len()..]);
            let id = inner.fresh_id();
            inner.nodes.insert(new_path, (id, node));
        }
        Ok(inner.item_ref(&dest).expect("copy root inserted"))
    }

    fn delete_item(&self, cred: &Credential, path: &str) -> Result<(), RemoteError> {
        let path = normalize(path);
        self.gate(cred, "delete_item", &path)?;

        let mut inner = self.lock();
        if !inner.nodes.contains_key(&path) {
            return Err(RemoteError::NotFound { path });
        }
        for doomed in inner.subtree(&path) {
            inner.nodes.remove(&doomed);
        }
        Ok(())
    }

    fn upload_file(
        &self,
        cred: &Credential,
        parent: &str,
        name: &str,
        content: &[u8],
    ) -> Result<ItemRef, RemoteError> {
        let parent = normalize(parent);
        let path = join(&parent, name);
        self.gate(cred, "upload_file", &path)?;

        let mut inner = self.lock();
        if !inner.is_folder(&parent) {
            return Err(RemoteError::NotFound { path: parent });
        }
        // Overwrite keeps the item id, like a real in-place upload.
        let id = match inner.nodes.get(&path) {
            Some((id, _)) => id.clone(),
            None => inner.fresh_id(),
        };
        inner.nodes.insert(
            path.clone(),
            (
                id,
                Node::File {
                    content: content.to_vec(),
                    sheets: HashMap::new(),
                },
            ),
        );
        Ok(inner.item_ref(&path).expect("just inserted"))
    }

    fn read_range(
        &self,
        cred: &Credential,
        file: &str,
        worksheet: &str,
        range: &str,
    ) -> Result<CellGrid, RemoteError> {
        let file = normalize(file);
        self.gate(cred, "read_range", &file)?;
        let ((r1, c1), (r2, c2)) = parse_range(range)?;

        let inner = self.lock();
        let sheets = match inner.nodes.get(&file) {
            Some((_, Node::File { sheets, .. })) => sheets,
            _ => return Err(RemoteError::NotFound { path: file }),
        };
        let cells = sheets.get(worksheet);
        let mut grid = Vec::with_capacity((r2 - r1 + 1) as usize);
        for row in r1..=r2 {
            let mut out_row = Vec::with_capacity((c2 - c1 + 1) as usize);
            for col in c1..=c2 {
                let value = cells
                    .and_then(|cells| cells.get(&(row, col)))
                    .cloned()
                    .unwrap_or(Value::Null);
                out_row.push(value);
            }
            grid.push(out_row);
        }
        Ok(grid)
    }

    fn write_range(
        &self,
        cred: &Credential,
        file: &str,
        worksheet: &str,
        range: &str,
        values: &CellGrid,
    ) -> Result<(), RemoteError> {
        let file = normalize(file);
        self.gate(cred, "write_range", &file)?;
        let ((r1, c1), (r2, c2)) = parse_range(range)?;

        let rows = (r2 - r1 + 1) as usize;
        let cols = (c2 - c1 + 1) as usize;
        if values.len() != rows || values.iter().any(|row| row.len() != cols) {
            return Err(RemoteError::Unknown {
                status: 400,
                message: format!("range {range} expects {rows}x{cols} values"),
            });
        }

        let mut inner = self.lock();
        let sheets = match inner.nodes.get_mut(&file) {
            Some((_, Node::File { sheets, .. })) => sheets,
            _ => return Err(RemoteError::NotFound { path: file }),
        };
        let cells = sheets.entry(worksheet.to_string()).or_default();
        for (dr, row) in values.iter().enumerate() {
            for (dc, value) in row.iter().enumerate() {
                let key = (r1 + dr as u32, c1 + dc as u32);
                if value.is_null() {
                    cells.remove(&key);
                } else {
                    cells.insert(key, value.clone());
                }
            }
        }
        Ok(())
    }

    fn create_view_link(
        &self,
        cred: &Credential,
        path: &str,
        scope: LinkScope,
    ) -> Result<String, RemoteError> {
        let path = normalize(path);
        self.gate(cred, "create_view_link", &path)?;
        let inner = self.lock();
        if !inner.nodes.contains_key(&path) {
            return Err(RemoteError::NotFound { path });
        }
        Ok(format!("{}?link=view&scope={}", web_url(&path), scope.as_str()))
    }
}

// ---------------------------------------------------------------------------
// Path and A1 helpers
// ---------------------------------------------------------------------------

fn normalize(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

fn join(parent: &str, name: &str) -> String {
    format!("{}/{}", parent.trim_end_matches('/'), name)
}

fn parent_of(path: &str) -> Option<String> {
    let idx = path.rfind('/')?;
    if idx == 0 {
        None
    } else {
        Some(path[..idx].to_string())
    }
}

fn name_of(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn web_url(path: &str) -> String {
    format!("https://docs.example{path}")
}

/// `"B12"` to 1-based `(row, column)`.
fn parse_cell(cell: &str) -> Result<(u32, u32), RemoteError> {
    let letters: String = cell.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
    let digits = &cell[letters.len()..];
    if letters.is_empty() || digits.is_empty() {
        return Err(bad_range(cell));
    }
    let mut col: u32 = 0;
    for ch in letters.chars() {
        col = col * 26 + (ch.to_ascii_uppercase() as u32 - 'A' as u32 + 1);
    }
    let row: u32 = digits.parse().map_err(|_| bad_range(cell))?;
    if row == 0 {
        return Err(bad_range(cell));
    }
    Ok((row, col))
}

/// `"A8:B50"` (or a single cell) to inclusive 1-based corners.
fn parse_range(range: &str) -> Result<((u32, u32), (u32, u32)), RemoteError> {
    let (start, end) = match range.split_once(':') {
        Some((start, end)) => (parse_cell(start)?, parse_cell(end)?),
        None => {
            let cell = parse_cell(range)?;
            (cell, cell)
        }
    };
    if end.0 < start.0 || end.1 < start.1 {
        return Err(bad_range(range));
    }
    Ok((start, end))
}

fn bad_range(range: &str) -> RemoteError {
    RemoteError::Unknown {
        status: 400,
        message: format!("invalid A1 range: {range}"),
    }
}
