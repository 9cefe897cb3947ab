//! Shared fixtures and fakes for the integration tests.
#![allow(dead_code)]

use anyhow::{anyhow, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;
use tempfile::TempDir;
use walkdir::WalkDir;

use claude_code_archive::backend::RepoProvisioner;
use claude_code_archive::config::ArchiveConfig;
use claude_code_archive::layout::{ignored_entries, ArchiveLayout};
use claude_code_archive::scm::Scm;

pub const DEVICE_NAME: &str = "Test Laptop";
pub const DEVICE_SLUG: &str = "test-laptop";

/// A source tree, an archive root and a state directory under one tempdir
pub struct Fixture {
    pub temp: TempDir,
    pub config: ArchiveConfig,
}

impl Fixture {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("claude");
        let archive = temp.path().join("archive");
        fs::create_dir_all(source.join("projects")).unwrap();
        fs::create_dir_all(&archive).unwrap();

        let mut config = ArchiveConfig::new(&archive, &source).with_state_dir(temp.path().join("state"));
        config.device_name = Some(DEVICE_NAME.to_string());
        Fixture { temp, config }
    }

    pub fn layout(&self) -> ArchiveLayout {
        ArchiveLayout::new(&self.config.archive_root)
    }

    pub fn source(&self) -> &Path {
        &self.config.source_root
    }

    pub fn project_dir(&self, project: &str) -> PathBuf {
        self.config.projects_dir().join(project)
    }

    /// Write `<source>/projects/<project>/<uuid>.jsonl`
    pub fn write_session(&self, project: &str, uuid: &str, content: &str) -> PathBuf {
        let path = self.project_dir(project).join(format!("{uuid}.jsonl"));
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    /// Write a file relative to the source root
    pub fn write_source(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.config.source_root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    pub fn artifact(&self, project: &str, uuid: &str) -> PathBuf {
        self.layout().session_artifact(DEVICE_SLUG, project, uuid)
    }
}

/// Sample session log content
pub fn session_lines(n: usize) -> String {
    (0..n)
        .map(|i| format!(r#"{{"type":"user","uuid":"m{i}","message":"line {i}"}}"#))
        .collect::<Vec<_>>()
        .join("\n")
        + "\n"
}

/// Every regular file under `root`, relative, excluding `.git`
pub fn tree(root: &Path) -> BTreeSet<String> {
    WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git")
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            e.path()
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/")
        })
        .collect()
}

pub fn git_available() -> bool {
    claude_code_archive::scm::git_available()
}

#[derive(Default)]
struct FakeState {
    committed: BTreeMap<String, (u64, Option<SystemTime>)>,
    commits: Vec<String>,
    remotes: BTreeMap<String, String>,
    reachable: BTreeSet<String>,
    pushes: Vec<(String, String)>,
    pulls: usize,
    gc_runs: usize,
    fail_push: bool,
    fail_pull: bool,
}

/// In-memory stand-in for git.
///
/// "Changes" are detected by comparing the working tree (size and mtime per
/// file, ignored entries skipped) with the tree recorded at the last commit.
pub struct FakeScm {
    workdir: PathBuf,
    state: Mutex<FakeState>,
}

impl FakeScm {
    pub fn new(workdir: &Path) -> Self {
        FakeScm {
            workdir: workdir.to_path_buf(),
            state: Mutex::new(FakeState::default()),
        }
    }

    fn snapshot(&self) -> BTreeMap<String, (u64, Option<SystemTime>)> {
        let ignored = ignored_entries();
        WalkDir::new(&self.workdir)
            .into_iter()
            .filter_entry(|e| e.file_name() != ".git")
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| !ignored.iter().any(|i| e.file_name() == *i))
            .map(|e| {
                let meta = e.metadata().unwrap();
                let rel = e.path().strip_prefix(&self.workdir).unwrap().to_string_lossy().to_string();
                (rel, (meta.len(), meta.modified().ok()))
            })
            .collect()
    }

    pub fn commits(&self) -> Vec<String> {
        self.state.lock().unwrap().commits.clone()
    }

    pub fn pushes(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().pushes.clone()
    }

    pub fn pulls(&self) -> usize {
        self.state.lock().unwrap().pulls
    }

    pub fn gc_runs(&self) -> usize {
        self.state.lock().unwrap().gc_runs
    }

    pub fn remote(&self, name: &str) -> Option<String> {
        self.state.lock().unwrap().remotes.get(name).cloned()
    }

    pub fn make_reachable(&self, url: &str) {
        self.state.lock().unwrap().reachable.insert(url.to_string());
    }

    pub fn set_fail_push(&self, fail: bool) {
        self.state.lock().unwrap().fail_push = fail;
    }

    pub fn set_fail_pull(&self, fail: bool) {
        self.state.lock().unwrap().fail_pull = fail;
    }
}

impl Scm for FakeScm {
    fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn current_branch(&self) -> Result<String> {
        Ok("main".to_string())
    }

    fn current_commit_hash(&self) -> Result<String> {
        let state = self.state.lock().unwrap();
        if state.commits.is_empty() {
            return Err(anyhow!("no commits yet"));
        }
        Ok(format!("{:040x}", state.commits.len()))
    }

    fn stage_all(&self) -> Result<()> {
        Ok(())
    }

    fn commit(&self, message: &str) -> Result<()> {
        let snapshot = self.snapshot();
        let mut state = self.state.lock().unwrap();
        if snapshot == state.committed {
            return Err(anyhow!("nothing to commit"));
        }
        state.committed = snapshot;
        state.commits.push(message.to_string());
        Ok(())
    }

    fn has_changes(&self) -> Result<bool> {
        let snapshot = self.snapshot();
        Ok(snapshot != self.state.lock().unwrap().committed)
    }

    fn add_remote(&self, name: &str, url: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.remotes.contains_key(name) {
            return Err(anyhow!("remote {name} already exists"));
        }
        state.remotes.insert(name.to_string(), url.to_string());
        Ok(())
    }

    fn has_remote(&self, name: &str) -> bool {
        self.state.lock().unwrap().remotes.contains_key(name)
    }

    fn get_remote_url(&self, name: &str) -> Result<String> {
        self.remote(name).ok_or_else(|| anyhow!("no such remote '{name}'"))
    }

    fn set_remote_url(&self, name: &str, url: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        match state.remotes.get_mut(name) {
            Some(existing) => {
                *existing = url.to_string();
                Ok(())
            }
            None => Err(anyhow!("no such remote '{name}'")),
        }
    }

    fn remove_remote(&self, name: &str) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .remotes
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| anyhow!("no such remote '{name}'"))
    }

    fn push(&self, remote: &str, branch: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_push {
            return Err(anyhow!("connection refused"));
        }
        if !state.remotes.contains_key(remote) {
            return Err(anyhow!("no such remote '{remote}'"));
        }
        state.pushes.push((remote.to_string(), branch.to_string()));
        Ok(())
    }

    fn pull_rebase(&self, _remote: &str, _branch: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_pull {
            return Err(anyhow!("could not resolve host"));
        }
        state.pulls += 1;
        Ok(())
    }

    fn probe_remote(&self, url: &str) -> Result<()> {
        if self.state.lock().unwrap().reachable.contains(url) {
            Ok(())
        } else {
            Err(anyhow!("repository '{url}' not found"))
        }
    }

    fn gc(&self) -> Result<()> {
        self.state.lock().unwrap().gc_runs += 1;
        Ok(())
    }

    fn discard_changes(&self) -> Result<()> {
        Err(anyhow!("the fake cannot restore file contents"))
    }

    fn revert_head(&self) -> Result<()> {
        Err(anyhow!("the fake cannot revert commits"))
    }
}

/// Provisioner with scripted readiness
pub struct FakeProvisioner {
    pub ready: bool,
    pub url: String,
    pub created: Mutex<Vec<String>>,
}

impl FakeProvisioner {
    pub fn ready(url: &str) -> Self {
        FakeProvisioner {
            ready: true,
            url: url.to_string(),
            created: Mutex::new(Vec::new()),
        }
    }

    pub fn unauthenticated() -> Self {
        FakeProvisioner {
            ready: false,
            url: String::new(),
            created: Mutex::new(Vec::new()),
        }
    }
}

impl RepoProvisioner for FakeProvisioner {
    fn check_ready(&self) -> Result<()> {
        if self.ready {
            Ok(())
        } else {
            Err(anyhow!("not logged in to github.com"))
        }
    }

    fn ensure_private_repo(&self, name: &str) -> Result<String> {
        self.created.lock().unwrap().push(name.to_string());
        Ok(self.url.clone())
    }
}
