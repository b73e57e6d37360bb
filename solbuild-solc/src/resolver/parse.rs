use crate::{error::SolcError, utils, version::VersionConstraint};
use regex::Match;
use std::path::{Path, PathBuf};

/// Represents various information about a solidity file extracted via regex
#[derive(Debug, Clone, Default)]
pub struct SolData {
    pub license: Option<SolDataUnit<String>>,
    /// the first version pragma
    pub version: Option<SolDataUnit<String>>,
    /// every `pragma solidity` directive of the file
    pub pragmas: Vec<SolDataUnit<String>>,
    pub imports: Vec<SolDataUnit<SolImport>>,
    /// the intersection of all `pragmas`, `None` if the file has none or one is invalid
    pub version_req: Option<VersionConstraint>,
}

impl SolData {
    /// Extracts the useful data from a solidity source
    ///
    /// Comments are blanked out first so that commented out imports and pragmas are ignored,
    /// locations still refer to the original content.
    pub fn parse(content: &str, file: &Path) -> Self {
        let stripped = strip_comments(content);

        let pragmas = capture_outer_and_inner(&stripped, &utils::RE_SOL_PRAGMA_VERSION, &["version"])
            .into_iter()
            .map(|(cap, name)| SolDataUnit::new(name.as_str().trim().to_owned(), cap.into()))
            .collect::<Vec<_>>();
        let version = pragmas.first().cloned();
        let imports = capture_imports(&stripped);
        let license =
            capture_outer_and_inner(content, &utils::RE_SOL_SDPX_LICENSE_IDENTIFIER, &["license"])
                .first()
                .map(|(cap, l)| SolDataUnit::new(l.as_str().trim().to_owned(), (*cap).into()));

        // a file with several pragmas must satisfy all of them
        let mut version_req: Option<VersionConstraint> = None;
        for pragma in &pragmas {
            match VersionConstraint::parse(pragma.data()) {
                Ok(req) => {
                    version_req = Some(match version_req {
                        Some(prev) => prev.intersect(&req),
                        None => req,
                    });
                }
                Err(err) => {
                    tracing::trace!(
                        "invalid version pragma \"{}\" in \"{}\": {}",
                        pragma.data(),
                        file.display(),
                        err
                    );
                    version_req = None;
                    break
                }
            }
        }

        Self { license, version, pragmas, imports, version_req }
    }

    /// Returns the parsed version pragma of the file, failing if a pragma can not be parsed
    pub fn version_constraint(&self, file: &Path) -> crate::Result<Option<&VersionConstraint>> {
        if self.version_req.is_none() {
            for pragma in &self.pragmas {
                if let Err(error) = VersionConstraint::parse(pragma.data()) {
                    return Err(SolcError::InvalidVersionPragma {
                        file: file.to_path_buf(),
                        pragma: pragma.data().clone(),
                        error,
                    })
                }
            }
        }
        Ok(self.version_req.as_ref())
    }
}

/// An import directive of a solidity file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolImport {
    /// the import path as written in the source
    pub path: PathBuf,
    pub kind: ImportKind,
}

/// The form of an import directive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportKind {
    /// `import "x";`
    Plain,
    /// `import "x" as Y;` or `import * as Y from "x";`
    Aliased(String),
    /// `import {A, B as C} from "x";`
    Symbols(Vec<(String, Option<String>)>),
}

impl ImportKind {
    fn from_symbols(symbols: &str) -> Self {
        let symbols = symbols.trim();
        if let Some(rest) = symbols.strip_prefix('*') {
            if let Some(alias) = rest.trim().strip_prefix("as") {
                return ImportKind::Aliased(alias.trim().to_string())
            }
        }
        if let Some(list) = symbols.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            let symbols = list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| match s.split_once(" as ") {
                    Some((name, alias)) => (name.trim().to_string(), Some(alias.trim().to_string())),
                    None => (s.to_string(), None),
                })
                .collect();
            return ImportKind::Symbols(symbols)
        }
        ImportKind::Plain
    }
}

/// Represents an item in a solidity file with its location in the file
#[derive(Debug, Clone)]
pub struct SolDataUnit<T> {
    loc: Location,
    data: T,
}

/// Location in a text file buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub start: usize,
    pub end: usize,
}

/// Solidity Data Unit decorated with its location within the file
impl<T> SolDataUnit<T> {
    pub fn new(data: T, loc: Location) -> Self {
        Self { data, loc }
    }

    /// Returns the underlying data for the unit
    pub fn data(&self) -> &T {
        &self.data
    }

    /// Returns the location of the given data unit
    pub fn loc(&self) -> (usize, usize) {
        (self.loc.start, self.loc.end)
    }
}

impl From<Match<'_>> for Location {
    fn from(src: Match) -> Self {
        Location { start: src.start(), end: src.end() }
    }
}

/// Given the regex and the target string, find all occurrences
/// of named groups within the string. This method returns
/// the tuple of matches `(a, b)` where `a` is the match for the
/// entire regex and `b` is the match for the first named group.
///
/// NOTE: This method will return the match for the first named
/// group, so the order of passed named groups matters.
fn capture_outer_and_inner<'a>(
    content: &'a str,
    regex: &regex::Regex,
    names: &[&str],
) -> Vec<(regex::Match<'a>, regex::Match<'a>)> {
    regex
        .captures_iter(content)
        .filter_map(|cap| {
            let cap_match = names.iter().find_map(|name| cap.name(name));
            cap_match.and_then(|m| cap.get(0).map(|outer| (outer, m)))
        })
        .collect()
}

/// Returns all import directives of the (comment free) content
pub fn capture_imports(content: &str) -> Vec<SolDataUnit<SolImport>> {
    utils::RE_SOL_IMPORT
        .captures_iter(content)
        .filter_map(|cap| {
            let outer = cap.get(0)?;
            let path = ["p1", "p2", "p3", "p4"].iter().find_map(|name| cap.name(name))?;
            let kind = if let Some(alias) = cap.name("alias") {
                ImportKind::Aliased(alias.as_str().to_string())
            } else if let Some(symbols) = cap.name("symbols") {
                ImportKind::from_symbols(symbols.as_str())
            } else {
                ImportKind::Plain
            };
            let import = SolImport { path: PathBuf::from(path.as_str()), kind };
            Some(SolDataUnit::new(import, outer.into()))
        })
        .collect()
}

/// Replaces `//` and `/* */` comments with whitespace
///
/// String literals are left untouched, and every byte keeps its offset, newlines included.
pub fn strip_comments(content: &str) -> String {
    #[derive(Clone, Copy, PartialEq)]
    enum State {
        Code,
        LineComment,
        BlockComment,
        Str(char),
    }

    let mut out = String::with_capacity(content.len());
    let mut state = State::Code;
    let mut chars = content.chars().peekable();
    let blank = |out: &mut String, c: char| {
        if c == '\n' {
            out.push('\n');
        } else {
            out.extend(std::iter::repeat(' ').take(c.len_utf8()));
        }
    };

    while let Some(c) = chars.next() {
        match state {
            State::Code => match c {
                '/' if chars.peek() == Some(&'/') => {
                    chars.next();
                    out.push_str("  ");
                    state = State::LineComment;
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    out.push_str("  ");
                    state = State::BlockComment;
                }
                '"' | '\'' => {
                    out.push(c);
                    state = State::Str(c);
                }
                _ => out.push(c),
            },
            State::LineComment => {
                if c == '\n' {
                    state = State::Code;
                }
                blank(&mut out, c);
            }
            State::BlockComment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    out.push_str("  ");
                    state = State::Code;
                } else {
                    blank(&mut out, c);
                }
            }
            State::Str(quote) => {
                out.push(c);
                if c == '\\' {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                } else if c == quote || c == '\n' {
                    state = State::Code;
                }
            }
        }
    }
    out
}
