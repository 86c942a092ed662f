//! Artifact and part naming rules shared by client and server.
//!
//! An artifact is named `{fingerprint}{ext}`; its parts are named
//! `{artifact}-{index}`. The index is recovered from the trailing `-N`
//! suffix and compared numerically.

/// Errors produced when a name does not follow the naming rules.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NamingError {
    #[error("empty name")]
    Empty,

    #[error("name is not a single path component: {0}")]
    NotAComponent(String),

    #[error("part name {part} does not belong to {artifact}")]
    ForeignPart { artifact: String, part: String },

    #[error("part name has no numeric index: {0}")]
    NoIndex(String),
}

/// Returns the artifact name for a fingerprint and an extension.
///
/// `extension` is taken verbatim and may be empty or start with a dot.
pub fn artifact_name(fingerprint: &str, extension: &str) -> String {
    format!("{fingerprint}{extension}")
}

/// Returns the staging file name of part `index` of `artifact`.
pub fn part_name(artifact: &str, index: usize) -> String {
    format!("{artifact}-{index}")
}

/// Extracts the numeric index from a `...-N` part name.
pub fn parse_part_index(name: &str) -> Option<usize> {
    let (_, suffix) = name.rsplit_once('-')?;
    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    suffix.parse().ok()
}

/// Validates that `name` can be used as one file name inside a directory.
pub fn validate_component(name: &str) -> Result<(), NamingError> {
    if name.is_empty() {
        return Err(NamingError::Empty);
    }
    if name == "." || name == ".." || name.contains(['/', '\\', '\0']) {
        return Err(NamingError::NotAComponent(name.to_string()));
    }
    Ok(())
}

/// Validates a part name against its artifact and returns the part index.
pub fn validate_part_name(artifact: &str, part: &str) -> Result<usize, NamingError> {
    validate_component(part)?;
    let Some(rest) = part.strip_prefix(artifact).and_then(|r| r.strip_prefix('-')) else {
        return Err(NamingError::ForeignPart {
            artifact: artifact.to_string(),
            part: part.to_string(),
        });
    };
    if rest.is_empty() || !rest.bytes().all(|b| b.is_ascii_digit()) {
        return Err(NamingError::NoIndex(part.to_string()));
    }
    rest.parse()
        .map_err(|_| NamingError::NoIndex(part.to_string()))
}
