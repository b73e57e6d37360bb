use serde::{Deserialize, Serialize};
use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

/// The solidity compiler can only reference files that exist locally on your computer.
/// So importing directly from GitHub (as an example) is not possible.
///
/// Let's imagine you want to use OpenZeppelin's library of smart contracts,
/// `@openzeppelin/contracts`:
///
/// ```ignore
/// pragma solidity ^0.8.0;
///
/// import "@openzeppelin/contracts/token/ERC20/ERC20.sol";
/// ```
///
/// A remapping rewrites the `prefix` of an import path to a `target` on disk:
///
/// ```text
/// @openzeppelin/contracts/=lib/openzeppelin-contracts/contracts/
/// ```
///
/// You can also specify a `context` which limits the scope of the remapping to a subset of your
/// project. This allows you to apply the remapping only to imports located in a specific library or
/// a specific file. Without a context a remapping is applied to every matching import in all files.
///
/// The format is: `context:prefix=target`
#[derive(Clone, Debug, PartialEq, PartialOrd, Eq, Ord, Hash)]
pub struct Remapping {
    pub context: Option<String>,
    pub name: String,
    pub path: String,
}

impl Remapping {
    /// Removes the `base` path from the remapping's target
    pub fn strip_prefix(&mut self, base: impl AsRef<Path>) -> &mut Self {
        if let Ok(stripped) = Path::new(&self.path).strip_prefix(base.as_ref()) {
            let trailing = self.path.ends_with('/');
            self.path = crate::utils::slash_path(stripped);
            if trailing && !self.path.ends_with('/') {
                self.path.push('/');
            }
        }
        self
    }

    /// Returns the remapping with its target relative to `root`, the form the compiler expects
    /// when invoked with `--base-path <root>`
    pub fn to_source_name(&self, root: impl AsRef<Path>) -> Remapping {
        let mut remapping = self.clone();
        remapping.strip_prefix(root);
        remapping.slash_path();
        remapping
    }

    /// Whether this remapping may be applied to an import located in the given file
    ///
    /// `importer` is the source name of the importing file.
    pub fn applies_to(&self, importer: &str) -> bool {
        self.context.as_ref().map(|ctx| importer.starts_with(ctx.as_str())).unwrap_or(true)
    }

    /// Rewrites the import path if it starts with this remapping's prefix
    pub fn apply(&self, import: &str) -> Option<String> {
        import.strip_prefix(self.name.as_str()).map(|rest| format!("{}{}", self.path, rest))
    }

    /// Returns the remapping that the compiler would apply to `import` in `importer`
    ///
    /// The longest context wins, then the longest prefix. Among equals, the remapping listed last
    /// wins.
    pub fn find_best<'a>(
        remappings: &'a [Remapping],
        importer: &str,
        import: &str,
    ) -> Option<&'a Remapping> {
        remappings
            .iter()
            .filter(|r| r.applies_to(importer) && import.starts_with(r.name.as_str()))
            .max_by_key(|r| (r.context.as_ref().map(String::len).unwrap_or_default(), r.name.len()))
    }

    /// Resolves the target directory of this remapping against the `root` if it's relative
    pub fn target(&self, root: impl AsRef<Path>) -> PathBuf {
        let path = Path::new(&self.path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            root.as_ref().join(path)
        }
    }

    /// Converts any `\\` separators in the `path` to `/`
    pub fn slash_path(&mut self) {
        #[cfg(windows)]
        {
            use path_slash::PathExt;
            self.path = Path::new(&self.path).to_slash_lossy().to_string();
            if let Some(context) = self.context.as_mut() {
                *context = Path::new(&context).to_slash_lossy().to_string();
            }
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, PartialOrd)]
pub enum RemappingError {
    #[error("invalid remapping format, found `{0}`, expected `<key>=<value>`")]
    InvalidRemapping(String),
    #[error("remapping key can't be empty, found `{0}`, expected `<key>=<value>`")]
    EmptyRemappingKey(String),
    #[error("remapping value must be a path, found `{0}`, expected `<key>=<value>`")]
    EmptyRemappingValue(String),
}

impl FromStr for Remapping {
    type Err = RemappingError;

    fn from_str(remapping: &str) -> Result<Self, Self::Err> {
        let (name, path) = remapping
            .split_once('=')
            .ok_or_else(|| RemappingError::InvalidRemapping(remapping.to_string()))?;
        let (context, name) = name
            .split_once(':')
            .map_or((None, name), |(context, name)| (Some(context.to_string()), name));
        if name.trim().is_empty() {
            return Err(RemappingError::EmptyRemappingKey(remapping.to_string()))
        }
        if path.trim().is_empty() {
            return Err(RemappingError::EmptyRemappingValue(remapping.to_string()))
        }
        // if the remapping just starts with : (no context name), treat it as global
        let context =
            context.and_then(|c| if c.trim().is_empty() { None } else { Some(c.to_string()) });
        Ok(Remapping { context, name: name.to_string(), path: path.to_string() })
    }
}

impl Serialize for Remapping {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Remapping {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::de::Deserializer<'de>,
    {
        let remapping = String::deserialize(deserializer)?;
        Remapping::from_str(&remapping).map_err(serde::de::Error::custom)
    }
}

// Remappings are printed as `context:prefix=target`
impl fmt::Display for Remapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(context) = self.context.as_ref() {
            write!(f, "{context}:")?;
        }
        write!(f, "{}={}", self.name, self.path)
    }
}
