use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::{create_dir_all, File};
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// Summary written after each derivation pass.
#[derive(Debug, Serialize, Deserialize)]
pub struct MetaFile {
    pub num_pages: usize,
    pub num_words: usize,
    pub created_at: String,
    pub version: u32,
}

pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    pub fn db(&self) -> PathBuf { self.root.join("db") }
    pub fn meta(&self) -> PathBuf { self.root.join("meta.json") }
    pub fn frontier(&self) -> PathBuf { self.root.join("frontier.txt") }
}

pub fn save_meta(paths: &IndexPaths, meta: &MetaFile) -> Result<()> {
    create_dir_all(&paths.root)?;
    let mut f = File::create(paths.meta())?;
    let json = serde_json::to_string_pretty(meta)?;
    f.write_all(json.as_bytes())?;
    Ok(())
}

pub fn load_meta(paths: &IndexPaths) -> Result<MetaFile> {
    let mut f = File::open(paths.meta())?;
    let mut buf = String::new();
    f.read_to_string(&mut buf)?;
    let meta: MetaFile = serde_json::from_str(&buf)?;
    Ok(meta)
}

/// Overwrite `path` with one URL per line.
pub fn save_frontier<'a, I>(path: &Path, urls: I) -> Result<usize>
where
    I: IntoIterator<Item = &'a String>,
{
    if let Some(dir) = path.parent() {
        create_dir_all(dir)?;
    }
    let mut out = BufWriter::new(File::create(path).with_context(|| format!("create {}", path.display()))?);
    let mut n = 0;
    for url in urls {
        writeln!(out, "{url}")?;
        n += 1;
    }
    out.flush()?;
    Ok(n)
}

/// Read a frontier written by [`save_frontier`]. Blank lines and `#` comments
/// are skipped.
pub fn load_frontier(path: &Path) -> Result<VecDeque<String>> {
    let f = File::open(path).with_context(|| format!("open frontier {}", path.display()))?;
    let mut frontier = VecDeque::new();
    for line in BufReader::new(f).lines() {
        let s = line?.trim().to_string();
        if s.is_empty() || s.starts_with('#') { continue; }
        frontier.push_back(s);
    }
    Ok(frontier)
}
