//! Placeholder parsing and substitution for build step strings.
//!
//! Step commands, environment values and working directories may reference
//! values that are only known once a build context exists (the keg prefix,
//! the unpacked source directory, a dependency's keg).
//!
//! # Placeholder Formats
//!
//! - `$${prefix}` - the keg directory this formula installs into
//! - `$${bin}`, `$${lib}`, `$${include}`, `$${share}` - subdirectories of the prefix
//! - `$${name}`, `$${version}`, `$${version_major}` - formula identity
//! - `$${src}` - the directory steps run in (unpacked source)
//! - `$${root}` - the install root
//! - `$${dep:NAME}` - the keg directory of dependency `NAME`
//!
//! # Shell Variables
//!
//! Single `$` characters pass through unchanged, so shell variables like
//! `$HOME` and `${CC}` work naturally without any escaping.
//!
//! # Escaping
//!
//! Use `$$$` before `{` to produce a literal `$${` sequence.
//!
//! # Example
//!
//! ```
//! use keg_lib::placeholder::{parse, Segment, Placeholder};
//!
//! let segments = parse("$${prefix}/bin:$PATH").unwrap();
//! assert_eq!(segments, vec![
//!     Segment::Placeholder(Placeholder::Prefix),
//!     Segment::Literal("/bin:$PATH".to_string()),
//! ]);
//! ```

use thiserror::Error;

/// A parsed placeholder reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placeholder {
  Prefix,
  Bin,
  Lib,
  Include,
  Share,
  Name,
  Version,
  VersionMajor,
  Src,
  Root,
  /// `$${dep:NAME}` - keg directory of a dependency
  Dep(String),
}

/// A segment of parsed text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
  /// Literal text (no placeholders)
  Literal(String),

  /// A placeholder to be resolved
  Placeholder(Placeholder),
}

/// Errors that can occur during placeholder parsing or resolution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaceholderError {
  #[error("unclosed placeholder at position {0}")]
  Unclosed(usize),

  #[error("unknown placeholder: {0}")]
  Unknown(String),

  #[error("malformed placeholder: {0}")]
  Malformed(String),

  #[error("dependency '{0}' is not available to this build")]
  UnresolvedDependency(String),
}

/// Trait for resolving placeholder values during execution.
pub trait Resolver {
  fn resolve(&self, placeholder: &Placeholder) -> Result<String, PlaceholderError>;
}

/// Parse a string containing placeholders into segments.
///
/// # Errors
///
/// Returns an error if a placeholder is malformed (unclosed, unknown name, etc.)
pub fn parse(input: &str) -> Result<Vec<Segment>, PlaceholderError> {
  let mut segments = Vec::new();
  let mut literal = String::new();
  let mut chars = input.char_indices().peekable();

  while let Some((pos, ch)) = chars.next() {
    if ch != '$' {
      literal.push(ch);
      continue;
    }

    match chars.peek() {
      Some((_, '$')) => {
        chars.next();

        match chars.peek() {
          Some((_, '$')) => {
            chars.next();

            match chars.peek() {
              Some((_, '{')) => {
                // Escaped: $$${ -> $${ (literal)
                literal.push_str("$${");
                chars.next();
              }
              _ => literal.push_str("$$$"),
            }
          }
          Some((_, '{')) => {
            chars.next();

            if !literal.is_empty() {
              segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }

            let mut content = String::new();
            let mut found_close = false;

            for (_, c) in chars.by_ref() {
              if c == '}' {
                found_close = true;
                break;
              }
              content.push(c);
            }

            if !found_close {
              return Err(PlaceholderError::Unclosed(pos));
            }

            segments.push(Segment::Placeholder(parse_placeholder_content(&content)?));
          }
          _ => literal.push_str("$$"),
        }
      }
      // A lone $ is a shell variable
      _ => literal.push('$'),
    }
  }

  if !literal.is_empty() {
    segments.push(Segment::Literal(literal));
  }

  Ok(segments)
}

/// Parse the content inside a placeholder (everything between `$${` and `}`).
fn parse_placeholder_content(content: &str) -> Result<Placeholder, PlaceholderError> {
  let placeholder = match content {
    "prefix" => Placeholder::Prefix,
    "bin" => Placeholder::Bin,
    "lib" => Placeholder::Lib,
    "include" => Placeholder::Include,
    "share" => Placeholder::Share,
    "name" => Placeholder::Name,
    "version" => Placeholder::Version,
    "version_major" => Placeholder::VersionMajor,
    "src" => Placeholder::Src,
    "root" => Placeholder::Root,
    other => match other.split_once(':') {
      Some(("dep", name)) if !name.is_empty() => Placeholder::Dep(name.to_string()),
      Some(("dep", _)) => return Err(PlaceholderError::Malformed(format!("missing dependency name in '{content}'"))),
      _ => return Err(PlaceholderError::Unknown(other.to_string())),
    },
  };

  Ok(placeholder)
}

/// Names referenced through `$${dep:NAME}` in `input`.
pub fn dependency_refs(input: &str) -> Result<Vec<String>, PlaceholderError> {
  Ok(
    parse(input)?
      .into_iter()
      .filter_map(|segment| match segment {
        Segment::Placeholder(Placeholder::Dep(name)) => Some(name),
        _ => None,
      })
      .collect(),
  )
}

/// Substitute all placeholders in a string using the provided resolver.
pub fn substitute(input: &str, resolver: &impl Resolver) -> Result<String, PlaceholderError> {
  let segments = parse(input)?;

  let mut result = String::with_capacity(input.len());
  for segment in &segments {
    match segment {
      Segment::Literal(s) => result.push_str(s),
      Segment::Placeholder(p) => result.push_str(&resolver.resolve(p)?),
    }
  }

  Ok(result)
}
