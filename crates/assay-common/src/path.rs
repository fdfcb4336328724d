use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{CommonError, CommonResult};

/// URI schemes accepted for table locations and mount sources.
pub const RECOGNIZED_SCHEMES: &[&str] = &[
    "s3", "s3a", "s3n", "gs", "abfss", "abfs", "wasbs", "wasb", "adl", "dbfs", "file",
];

/// The scheme assumed for bare absolute paths such as `/mnt/raw`.
pub const DEFAULT_SCHEME: &str = "dbfs";

/// A parsed storage URI, split into path segments.
///
/// Prefix comparisons work on whole segments, so `/data/abc` is never
/// considered to be under `/data/ab`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoragePath {
    scheme: String,
    authority: String,
    segments: Vec<String>,
}

impl StoragePath {
    pub fn parse(location: &str) -> CommonResult<Self> {
        let location = location.trim();
        if location.is_empty() {
            return Err(CommonError::invalid("empty storage location"));
        }
        let url = if location.starts_with('/') {
            Url::parse(&format!("{DEFAULT_SCHEME}:{location}"))
        } else {
            Url::parse(location)
        }
        .map_err(|e| CommonError::invalid(format!("malformed location {location}: {e}")))?;

        let scheme = url.scheme().to_lowercase();
        if !RECOGNIZED_SCHEMES.contains(&scheme.as_str()) {
            return Err(CommonError::unsupported(format!(
                "unrecognized scheme in location: {location}"
            )));
        }

        let mut authority = String::new();
        if !url.username().is_empty() {
            authority.push_str(url.username());
            authority.push('@');
        }
        authority.push_str(url.host_str().unwrap_or_default());
        if let Some(port) = url.port() {
            authority.push_str(&format!(":{port}"));
        }

        let segments = if url.path().is_empty() {
            vec![]
        } else {
            url.path_segments()
                .ok_or_else(|| CommonError::invalid(format!("location has no path: {location}")))?
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
                .collect()
        };

        Ok(Self {
            scheme,
            authority,
            segments,
        })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The number of path segments below the authority.
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// The `scheme://authority` part, used to group paths per bucket or container.
    pub fn root(&self) -> Self {
        Self {
            scheme: self.scheme.clone(),
            authority: self.authority.clone(),
            segments: vec![],
        }
    }

    pub fn parent(&self) -> Option<Self> {
        let (_, init) = self.segments.split_last()?;
        Some(Self {
            scheme: self.scheme.clone(),
            authority: self.authority.clone(),
            segments: init.to_vec(),
        })
    }

    /// Returns a prefix of this path with at most `depth` segments.
    pub fn truncate(&self, depth: usize) -> Self {
        Self {
            scheme: self.scheme.clone(),
            authority: self.authority.clone(),
            segments: self.segments.iter().take(depth).cloned().collect(),
        }
    }

    pub fn join(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self {
            scheme: self.scheme.clone(),
            authority: self.authority.clone(),
            segments,
        }
    }

    /// Returns whether `self` equals `other` or lies beneath it.
    pub fn starts_with(&self, other: &Self) -> bool {
        self.scheme == other.scheme
            && self.authority == other.authority
            && self.segments.len() >= other.segments.len()
            && self
                .segments
                .iter()
                .zip(other.segments.iter())
                .all(|(a, b)| a == b)
    }

    pub fn is_ancestor_of(&self, other: &Self) -> bool {
        other.starts_with(self) && other.segments.len() > self.segments.len()
    }

    /// The cloud (or file system) that hosts this path.
    pub fn provider(&self) -> StorageProvider {
        match self.scheme.as_str() {
            "s3" | "s3a" | "s3n" => StorageProvider::Aws,
            "abfss" | "abfs" | "wasbs" | "wasb" | "adl" => StorageProvider::Azure,
            "gs" => StorageProvider::Gcp,
            "dbfs" => StorageProvider::Dbfs,
            "file" => StorageProvider::Local,
            _ => StorageProvider::Unknown,
        }
    }

    /// Returns whether this path is a DBFS mount path, i.e. `dbfs:/mnt/...`.
    pub fn is_mount_path(&self) -> bool {
        self.scheme == DEFAULT_SCHEME
            && self.authority.is_empty()
            && self.segments.first().is_some_and(|s| s == "mnt")
    }
}

impl FromStr for StoragePath {
    type Err = CommonError;

    fn from_str(s: &str) -> CommonResult<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for StoragePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = self.segments.join("/");
        if self.authority.is_empty() && self.scheme != "file" {
            write!(f, "{}:/{}", self.scheme, path)
        } else if self.segments.is_empty() {
            write!(f, "{}://{}", self.scheme, self.authority)
        } else {
            write!(f, "{}://{}/{}", self.scheme, self.authority, path)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    Aws,
    Azure,
    Gcp,
    Dbfs,
    Local,
    Unknown,
}

impl StorageProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageProvider::Aws => "aws",
            StorageProvider::Azure => "azure",
            StorageProvider::Gcp => "gcp",
            StorageProvider::Dbfs => "dbfs",
            StorageProvider::Local => "local",
            StorageProvider::Unknown => "unknown",
        }
    }
}

impl fmt::Display for StorageProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
