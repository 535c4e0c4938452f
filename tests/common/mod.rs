//! In-memory remote shared by the integration tests
#![allow(dead_code)]

use anyhow::{anyhow, bail, Result};
use retromirror::classify::EntryKind;
use retromirror::config::Endpoint;
use retromirror::session::{Connect, DirCreation, DownloadSession, Refused, UploadSession};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::io::{Read, Write};
use std::path::Path;
use std::rc::Rc;
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Dir,
    File(Vec<u8>),
}

#[derive(Debug, Default)]
pub struct RemoteState {
    pub nodes: BTreeMap<String, Node>,
    pub cwd: String,
    pub denied: HashSet<String>,
    pub fail_retrieve: HashSet<String>,
    pub fail_store: HashSet<String>,
    pub refuse_connect: bool,
    pub full_path_listing: bool,
    pub authoritative_stat: bool,
    pub connects: usize,
    pub closes: usize,
    pub cwd_probes: usize,
}

/// Cloning shares the tree, so a "session" is just another handle
#[derive(Debug, Clone, Default)]
pub struct MemoryRemote(pub Rc<RefCell<RemoteState>>);

fn parent_of(path: &str) -> &str {
    match path.rsplit_once('/') {
        Some(("", _)) => "/",
        Some((parent, _)) => parent,
        None => "/",
    }
}

fn refused(path: &str) -> anyhow::Error {
    Refused {
        code: 550,
        message: format!("{path}: Permission denied"),
    }
    .into()
}

impl MemoryRemote {
    pub fn new() -> Self {
        let remote = Self::default();
        remote.0.borrow_mut().cwd = "/".into();
        remote
    }

    pub fn dir(&self, path: &str) -> &Self {
        let mut state = self.0.borrow_mut();
        let mut current = String::new();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            current.push('/');
            current.push_str(part);
            state.nodes.entry(current.clone()).or_insert(Node::Dir);
        }
        drop(state);
        self
    }

    pub fn file(&self, path: &str, contents: &[u8]) -> &Self {
        self.dir(parent_of(path));
        self.0
            .borrow_mut()
            .nodes
            .insert(path.to_string(), Node::File(contents.to_vec()));
        self
    }

    pub fn deny(&self, path: &str) -> &Self {
        self.0.borrow_mut().denied.insert(path.to_string());
        self
    }

    pub fn fail_retrieve(&self, path: &str) -> &Self {
        self.0.borrow_mut().fail_retrieve.insert(path.to_string());
        self
    }

    pub fn fail_store(&self, path: &str) -> &Self {
        self.0.borrow_mut().fail_store.insert(path.to_string());
        self
    }

    pub fn node(&self, path: &str) -> Option<Node> {
        self.0.borrow().nodes.get(path).cloned()
    }

    pub fn read(&self, path: &str) -> Option<Vec<u8>> {
        match self.node(path) {
            Some(Node::File(data)) => Some(data),
            _ => None,
        }
    }

    pub fn is_dir(&self, path: &str) -> bool {
        path == "/" || self.node(path) == Some(Node::Dir)
    }

    /// Paths strictly below `prefix`, relative to it
    pub fn tree_under(&self, prefix: &str) -> BTreeMap<String, Option<Vec<u8>>> {
        let lead = format!("{}/", prefix.trim_end_matches('/'));
        self.0
            .borrow()
            .nodes
            .iter()
            .filter_map(|(path, node)| {
                let rel = path.strip_prefix(&lead)?;
                let data = match node {
                    Node::Dir => None,
                    Node::File(d) => Some(d.clone()),
                };
                Some((rel.to_string(), data))
            })
            .collect()
    }

    pub fn top_level(&self, prefix: &str) -> Vec<String> {
        let parent = prefix.trim_end_matches('/');
        let parent = if parent.is_empty() { "/" } else { parent };
        self.0
            .borrow()
            .nodes
            .keys()
            .filter(|p| parent_of(p) == parent)
            .cloned()
            .collect()
    }

    pub fn connects(&self) -> usize {
        self.0.borrow().connects
    }

    pub fn closes(&self) -> usize {
        self.0.borrow().closes
    }
}

impl Connect for MemoryRemote {
    type Session = MemoryRemote;

    fn connect(&self, endpoint: &Endpoint) -> Result<MemoryRemote> {
        let mut state = self.0.borrow_mut();
        if state.refuse_connect {
            bail!("530 Login incorrect for {}", endpoint.user);
        }
        state.connects += 1;
        state.cwd = "/".into();
        drop(state);
        Ok(self.clone())
    }
}

impl DownloadSession for MemoryRemote {
    fn pwd(&mut self) -> Result<String> {
        Ok(self.0.borrow().cwd.clone())
    }

    fn cwd(&mut self, path: &str) -> Result<()> {
        let is_dir = self.is_dir(path);
        let mut state = self.0.borrow_mut();
        state.cwd_probes += 1;
        if state.denied.contains(path) || !is_dir {
            return Err(refused(path));
        }
        state.cwd = path.to_string();
        Ok(())
    }

    fn list(&mut self, path: &str) -> Result<Vec<String>> {
        let state = self.0.borrow();
        if state.denied.contains(path) {
            return Err(refused(path));
        }
        let parent = path.trim_end_matches('/');
        let parent = if parent.is_empty() { "/" } else { parent };
        let names: Vec<String> = state
            .nodes
            .keys()
            .filter(|p| parent_of(p) == parent)
            .map(|p| {
                if state.full_path_listing {
                    p.clone()
                } else {
                    p.rsplit('/').next().unwrap_or(p).to_string()
                }
            })
            .collect();
        Ok(names)
    }

    fn retrieve(&mut self, path: &str, sink: &mut dyn Write) -> Result<u64> {
        let state = self.0.borrow();
        if state.denied.contains(path) || state.fail_retrieve.contains(path) {
            return Err(refused(path));
        }
        match state.nodes.get(path) {
            Some(Node::File(data)) => {
                sink.write_all(data)?;
                Ok(data.len() as u64)
            }
            Some(Node::Dir) => Err(refused(path)),
            None => Err(anyhow!("550 {path}: No such file")),
        }
    }

    fn stat_kind(&mut self, path: &str) -> Result<Option<EntryKind>> {
        let state = self.0.borrow();
        if !state.authoritative_stat {
            return Ok(None);
        }
        Ok(match state.nodes.get(path) {
            Some(Node::Dir) => Some(EntryKind::Directory),
            Some(Node::File(_)) => Some(EntryKind::File),
            None => None,
        })
    }

    fn close(&mut self) -> Result<()> {
        self.0.borrow_mut().closes += 1;
        Ok(())
    }
}

impl UploadSession for MemoryRemote {
    fn make_dir(&mut self, path: &str) -> Result<DirCreation> {
        if !self.is_dir(parent_of(path)) {
            bail!("mkdir {path}: parent missing");
        }
        let mut state = self.0.borrow_mut();
        match state.nodes.get(path) {
            Some(Node::Dir) => Ok(DirCreation::AlreadyExists),
            Some(Node::File(_)) => bail!("mkdir {path}: is a file"),
            None => {
                state.nodes.insert(path.to_string(), Node::Dir);
                Ok(DirCreation::Created)
            }
        }
    }

    fn store(&mut self, source: &mut dyn Read, path: &str) -> Result<u64> {
        if self.0.borrow().fail_store.contains(path) {
            bail!("write {path}: Failure");
        }
        if !self.is_dir(parent_of(path)) {
            bail!("put {path}: parent missing");
        }
        let mut data = Vec::new();
        source.read_to_end(&mut data)?;
        let len = data.len() as u64;
        self.0
            .borrow_mut()
            .nodes
            .insert(path.to_string(), Node::File(data));
        Ok(len)
    }

    fn close(&mut self) -> Result<()> {
        self.0.borrow_mut().closes += 1;
        Ok(())
    }
}

/// Local tree as relative path -> contents (`None` for directories)
pub fn snapshot(root: &Path) -> BTreeMap<String, Option<Vec<u8>>> {
    WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| {
            let rel = e
                .path()
                .strip_prefix(root)
                .unwrap()
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            let data = if e.file_type().is_file() {
                Some(std::fs::read(e.path()).unwrap())
            } else {
                None
            };
            (rel, data)
        })
        .collect()
}
