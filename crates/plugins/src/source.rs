//! Plugin source references: local paths and GitHub repositories.

use std::path::{Path, PathBuf};

use crate::{
    error::{Error, Result},
    manifest::MANIFEST_FILE,
};

/// Where a plugin's manifest comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginSource {
    Local(PathBuf),
    GitHub {
        owner: String,
        repo: String,
        git_ref: Option<String>,
    },
}

impl PluginSource {
    /// Parse a source string.
    ///
    /// Accepted forms: a local path, `github:owner/repo[#ref]`,
    /// `https://github.com/owner/repo[#ref]`, or bare `owner/repo[#ref]`
    /// when no such local path exists.
    pub fn parse(input: &str) -> Result<Self> {
        let s = input.trim();
        if s.is_empty() {
            return Err(Error::invalid_source(input, "empty source"));
        }

        if let Some(rest) = s.strip_prefix("github:") {
            return parse_github(input, rest);
        }
        if let Some(rest) = s
            .strip_prefix("https://github.com/")
            .or_else(|| s.strip_prefix("http://github.com/"))
            .or_else(|| s.strip_prefix("github.com/"))
        {
            return parse_github(input, rest);
        }

        let path = Path::new(s);
        let looks_local = s.starts_with('.')
            || s.starts_with('/')
            || s.starts_with('~')
            || path.exists()
            || s.split('/').count() != 2;
        if looks_local {
            return Ok(Self::Local(path.to_path_buf()));
        }
        parse_github(input, s)
    }

    /// Where the manifest lives for a local source: the path itself if it is
    /// `plugin.json`, `<dir>/plugin.json` for directories, otherwise the
    /// sibling `plugin.json` of the given file.
    pub fn local_manifest_path(path: &Path) -> PathBuf {
        if path.is_dir() {
            return path.join(MANIFEST_FILE);
        }
        if path.file_name().is_some_and(|n| n == MANIFEST_FILE) {
            return path.to_path_buf();
        }
        path.parent()
            .map(|p| p.join(MANIFEST_FILE))
            .unwrap_or_else(|| PathBuf::from(MANIFEST_FILE))
    }

    /// Raw-file URL of the manifest for a remote source.
    pub fn raw_manifest_url(&self, raw_base: &str) -> Option<String> {
        match self {
            Self::Local(_) => None,
            Self::GitHub {
                owner,
                repo,
                git_ref,
            } => Some(format!(
                "{}/{owner}/{repo}/{}/{MANIFEST_FILE}",
                raw_base.trim_end_matches('/'),
                git_ref.as_deref().unwrap_or("main"),
            )),
        }
    }
}

fn parse_github(input: &str, rest: &str) -> Result<PluginSource> {
    let (path, git_ref) = match rest.split_once('#') {
        Some((path, r)) if !r.is_empty() => (path, Some(r.to_string())),
        Some(_) => return Err(Error::invalid_source(input, "empty ref after '#'")),
        None => (rest, None),
    };
    let path = path.trim_end_matches('/').trim_end_matches(".git");
    let parts: Vec<&str> = path.split('/').collect();
    if parts.len() != 2 || parts.iter().any(|p| p.is_empty()) {
        return Err(Error::invalid_source(
            input,
            "expected 'owner/repo' or a GitHub URL",
        ));
    }
    Ok(PluginSource::GitHub {
        owner: parts[0].to_string(),
        repo: parts[1].to_string(),
        git_ref,
    })
}
